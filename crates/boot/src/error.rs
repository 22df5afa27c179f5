//! Boot-level error type.
//!
//! Each fatal failure is tagged with the [`BootStage`] it happened in.
//! Recovered failures (single assets, a malformed manifest, a packaged
//! attempt that auto mode falls back from) never surface here.
use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::assets::AssetError;
use crate::install::InstallError;
use crate::launch::LaunchError;
use crate::loader::RuntimeLoadError;

pub type Result<T> = std::result::Result<T, BootError>;

/// Stage of the boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootStage {
    Config,
    RuntimeLoad,
    DependencyInstall,
    AssetInjection,
    Launch,
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BootStage::Config => "config",
            BootStage::RuntimeLoad => "runtime-load",
            BootStage::DependencyInstall => "dependency-install",
            BootStage::AssetInjection => "asset-injection",
            BootStage::Launch => "launch",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error("boot already started; only one application may run per page")]
    AlreadyStarted,

    #[error(transparent)]
    RuntimeLoad(#[from] RuntimeLoadError),

    #[error(transparent)]
    DependencyInstall(#[from] InstallError),

    #[error(transparent)]
    AssetInjection(#[from] AssetError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl BootError {
    pub fn stage(&self) -> BootStage {
        match self {
            BootError::AlreadyStarted => BootStage::Config,
            BootError::RuntimeLoad(_) => BootStage::RuntimeLoad,
            BootError::DependencyInstall(_) => BootStage::DependencyInstall,
            BootError::AssetInjection(_) => BootStage::AssetInjection,
            BootError::Launch(_) => BootStage::Launch,
        }
    }
}

/// `outer: inner: root` rendering of an error and its sources.
pub fn display_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
