//! Widget asset injection.
//!
//! Installed packages ship scripts for the page and stylesheets with bundled
//! fonts. [`AssetInjector`] evaluates the former and injects the latter with
//! fonts inlined. Asset failures are isolated per file.

pub mod fonts;
mod injector;

use thiserror::Error;

use crate::host::{GuestError, HostError};

pub use injector::{AssetFailure, AssetInjector, AssetKind, AssetRecord, AssetReport};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to enumerate installed packages under {root}")]
    Enumerate {
        root: String,
        #[source]
        source: GuestError,
    },

    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: GuestError,
    },

    #[error("fonts directory {0} not found")]
    MissingFontDir(String),

    #[error("failed to evaluate script {path}")]
    Evaluate {
        path: String,
        #[source]
        source: HostError,
    },

    #[error("failed to inject stylesheet {path}")]
    Inject {
        path: String,
        #[source]
        source: HostError,
    },

    #[error("failed to link stylesheet {href}")]
    Link {
        href: String,
        #[source]
        source: HostError,
    },
}
