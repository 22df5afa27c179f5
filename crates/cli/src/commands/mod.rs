//! Command implementations for the tincture CLI
//!
//! Each command is a separate module that implements its own CLI args and execution logic.

mod bundle_assets;
mod config;
mod preflight;

pub use bundle_assets::BundleAssets;
pub use config::ShowConfig;
pub use preflight::Preflight;
