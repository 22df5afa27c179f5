//! Execution mode selection and application launch.
//!
//! Each way of locating the application is a [`LaunchStrategy`]. A
//! [`LaunchPlan`] orders the strategies for the configured mode and tries them
//! in turn:
//! - `package`: packaged only
//! - `inline`: inline only
//! - `auto`: packaged then inline with an application configured, else inline
//!
//! A strategy failure falls through to the next strategy; only the last
//! strategy's failure is fatal. When every strategy ran without finding a
//! source the plan fails with [`LaunchError::NoApplication`].

mod discovery;
mod inline;
mod packaged;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BootConfig, ExecutionMode};
use crate::error::display_chain;
use crate::host::{BootHost, GuestError, HttpError};
use crate::session::Session;

pub use discovery::{
    ClassDescription, DiscoveredEntry, EntryDiscovery, MainWindowSubclass, ModuleDescription,
    RegisteredEntry, default_discoveries,
};
pub use inline::{INLINE_PACKAGE, InlineLaunch, inline_filename};
pub use packaged::{ARCHIVE_FORMAT, PackagedLaunch, archive_url};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid {kind} identifier {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("packaged mode requires an application identifier")]
    MissingApplication,

    #[error("failed to fetch application archive {url}")]
    Fetch {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("failed to unpack application archive {url}")]
    Unpack {
        url: String,
        #[source]
        source: GuestError,
    },

    #[error("invalid inline filename {0:?}")]
    InvalidFilename(String),

    #[error("failed to write inline source {path}")]
    WriteSource {
        path: String,
        #[source]
        source: GuestError,
    },

    #[error("entry point `{entrypoint}` not found in {modules}")]
    EntryNotFound { entrypoint: String, modules: String },

    #[error("no entry point could be discovered in the inline sources")]
    NoEntryPoint,

    #[error("failed to inspect inline modules")]
    Inspect(#[source] GuestError),

    #[error("unexpected guest output {output:?}")]
    GuestOutput {
        output: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to run entry point `{entrypoint}`")]
    Invoke {
        entrypoint: String,
        #[source]
        source: GuestError,
    },

    #[error("no application could be started")]
    NoApplication {
        #[source]
        source: Option<Box<LaunchError>>,
    },
}

/// Everything a strategy may read while launching.
pub struct LaunchContext<'a> {
    pub host: &'a BootHost,
    pub session: &'a Session,
}

impl<'a> LaunchContext<'a> {
    pub fn new(host: &'a BootHost, session: &'a Session) -> Self {
        Self { host, session }
    }

    pub fn config(&self) -> &BootConfig {
        self.session.config()
    }
}

/// How the application was started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchReport {
    /// Name of the strategy that launched the application.
    pub strategy: String,
    pub entrypoint: String,
    pub module: String,
    /// Discovery strategy that located the entry point, when it was not named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<String>,
}

/// Result of one strategy that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchAttempt {
    Launched(LaunchReport),
    /// The strategy's source is absent from this page.
    NoSource,
}

/// One way of locating and starting the application.
#[async_trait]
pub trait LaunchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn launch(&self, ctx: &LaunchContext<'_>) -> Result<LaunchAttempt, LaunchError>;
}

/// Ordered launch strategies for one execution mode.
pub struct LaunchPlan {
    strategies: Vec<Box<dyn LaunchStrategy>>,
}

impl LaunchPlan {
    pub fn new(strategies: Vec<Box<dyn LaunchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategies for the configured mode.
    pub fn for_config(config: &BootConfig) -> Self {
        let strategies: Vec<Box<dyn LaunchStrategy>> = match config.mode {
            ExecutionMode::Package => vec![Box::new(PackagedLaunch)],
            ExecutionMode::Inline => vec![Box::new(InlineLaunch::new())],
            ExecutionMode::Auto if config.application.is_some() => {
                vec![Box::new(PackagedLaunch), Box::new(InlineLaunch::new())]
            }
            ExecutionMode::Auto => vec![Box::new(InlineLaunch::new())],
        };
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, ctx: &LaunchContext<'_>) -> Result<LaunchReport, LaunchError> {
        let mut masked: Option<LaunchError> = None;
        let last = self.strategies.len().saturating_sub(1);

        for (index, strategy) in self.strategies.iter().enumerate() {
            debug!("Trying {} launch", strategy.name());
            match strategy.launch(ctx).await {
                Ok(LaunchAttempt::Launched(report)) => {
                    info!(
                        "Launched `{}` from {} via {} strategy",
                        report.entrypoint,
                        report.module,
                        strategy.name()
                    );
                    return Ok(report);
                }
                Ok(LaunchAttempt::NoSource) => {
                    debug!("No {} source on this page", strategy.name());
                }
                Err(e) if index < last => {
                    warn!(
                        "{} launch failed, falling back: {}",
                        strategy.name(),
                        display_chain(&e)
                    );
                    masked = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(LaunchError::NoApplication {
            source: masked.map(Box::new),
        })
    }
}
