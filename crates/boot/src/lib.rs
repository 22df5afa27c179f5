//! Page-load boot orchestration for a guest-language application.
//!
//! A boot resolves its configuration, loads the guest engine, installs the
//! widget package and declared dependencies, injects the packages' scripts and
//! stylesheets into the page, and finally starts the application from a
//! packaged archive or from source embedded in the page.
//!
//! Modules are organized by stage:
//! - [`config`] normalizes boot requests into a [`BootConfig`]
//! - [`relay`] mirrors diagnostics to a remote sink
//! - [`loader`] makes the guest engine available and creates the [`Session`]
//! - [`install`] drives the guest package manager
//! - [`assets`] injects package scripts and stylesheets
//! - [`launch`] selects the execution mode and calls the entry point
//! - [`boot`] runs the stages in order
//!
//! Every external collaborator is reached through the traits in [`host`].
pub mod assets;
pub mod boot;
pub mod config;
pub mod error;
pub mod guest;
pub mod host;
pub mod install;
pub mod launch;
pub mod loader;
pub mod relay;
pub mod session;

pub use assets::{AssetError, AssetInjector, AssetKind, AssetRecord, AssetReport};
pub use boot::{BootReport, Bootstrapper, ERROR_CONTAINER_ID};
pub use config::{BootConfig, BootRequest, ConfigOverrides, ExecutionMode};
pub use error::{BootError, BootStage, Result, display_chain};
pub use host::{
    BootHost, EngineFactory, GuestError, GuestFs, GuestRuntime, HostDocument, HostElement,
    HostError, HttpClient, HttpError, MemoryFs,
};
pub use install::{DependencyInstaller, InstallError, InstallReport};
pub use launch::{EntryDiscovery, LaunchError, LaunchPlan, LaunchReport, LaunchStrategy};
pub use loader::{RuntimeLoadError, RuntimeLoader};
pub use relay::{DiagnosticsRelay, LogRecord, RelayLayer};
pub use session::{Session, WidgetSource};
