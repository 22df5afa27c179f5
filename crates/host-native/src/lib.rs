//! Native adapters for the boot host seams.
//!
//! - [`http`] resolves page-relative URLs and talks HTTP through `reqwest`
//! - [`disk_fs`] exposes a host directory as a guest filesystem
//! - [`document`] collects injected assets for static rendering
//! - [`logging`] wires `tracing` output and the diagnostics relay
pub mod disk_fs;
pub mod document;
pub mod http;
pub mod logging;

pub use disk_fs::DiskFs;
pub use document::{Injected, StaticDocument};
pub use http::ReqwestHttpClient;
pub use logging::{LoggingError, LoggingOptions, init_logging};
