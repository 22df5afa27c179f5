//! Host abstraction traits.
//!
//! The orchestrator never talks to a browser, an HTTP stack, or a guest
//! interpreter directly. Every collaborator is reached through one of these
//! seams:
//! - Transport: [`HttpClient`]
//! - Page: [`HostDocument`]
//! - Guest engine: [`EngineFactory`] → [`GuestRuntime`] → [`GuestFs`]

use std::collections::BTreeMap;

use async_trait::async_trait;

// ============================================================================
// Error Types
// ============================================================================

/// Transport layer errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Errors raised by the hosting document.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("failed to load script {url}: {message}")]
    ScriptLoad { url: String, message: String },

    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    #[error("DOM operation failed: {0}")]
    Dom(String),
}

/// Errors raised by the guest runtime or its filesystem.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GuestError {
    #[error("engine initialization failed: {0}")]
    Initialization(String),

    #[error("failed to load package {name}: {message}")]
    PackageLoad { name: String, message: String },

    #[error("guest execution failed: {0}")]
    Execution(String),

    #[error("failed to unpack {format} archive: {message}")]
    Unpack { format: String, message: String },

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("filesystem error at {path}: {message}")]
    Fs { path: String, message: String },
}

// ============================================================================
// Transport
// ============================================================================

/// Minimal HTTP surface used during boot.
///
/// Relative URLs are resolved by the implementation against the page location.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a HEAD request and report whether the response status was a success.
    async fn head(&self, url: &str) -> Result<bool, HttpError>;

    /// GET a resource body. Non-success statuses are errors.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError>;

    /// POST a JSON body. Non-success statuses are errors.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), HttpError>;
}

// ============================================================================
// Page
// ============================================================================

/// A snapshot of an element matched by a selector query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostElement {
    pub text: String,
    pub attributes: BTreeMap<String, String>,
}

impl HostElement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// The document hosting the application.
#[async_trait]
pub trait HostDocument: Send + Sync {
    /// The page origin (`scheme://host[:port]`), if it has a usable one.
    fn origin(&self) -> Option<String>;

    /// All elements matching `selector`, in document order.
    fn query_all(&self, selector: &str) -> Vec<HostElement>;

    /// Whether `name` is defined in the page's global scope.
    fn has_global(&self, name: &str) -> bool;

    /// Load an external script and wait until it has been evaluated.
    async fn load_script(&self, url: &str) -> Result<(), HostError>;

    /// Evaluate script source in the page's scripting context.
    fn eval_script(&self, source: &str) -> Result<(), HostError>;

    /// Append a `<style>` element with the given text.
    fn append_style(&self, css: &str) -> Result<(), HostError>;

    /// Append a `<link rel="stylesheet">` element.
    fn append_stylesheet_link(&self, href: &str) -> Result<(), HostError>;

    /// Write a visible error message into the element with id `container_id`.
    fn render_error(&self, container_id: &str, message: &str);
}

// ============================================================================
// Guest engine
// ============================================================================

/// Creates guest runtime instances once the engine script is available.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Name of the global the engine bootstrap script defines.
    fn global_entry(&self) -> &str {
        "loadPyodide"
    }

    /// File name of the engine bootstrap script, relative to the base location.
    fn bootstrap_script(&self) -> &str {
        "pyodide.js"
    }

    async fn instantiate(&self, index_url: &str) -> Result<Box<dyn GuestRuntime>, GuestError>;
}

/// A live guest runtime instance.
#[async_trait]
pub trait GuestRuntime: Send + Sync {
    /// Load a package bundled with the engine distribution (e.g. the package manager).
    async fn load_package(&self, name: &str) -> Result<(), GuestError>;

    /// Run guest source with top-level await support.
    ///
    /// Returns the textual form of the final expression's value (empty when none).
    async fn run_async(&self, code: &str) -> Result<String, GuestError>;

    /// Unpack an archive into the guest filesystem's working directory.
    fn unpack_archive(&self, bytes: &[u8], format: &str) -> Result<(), GuestError>;

    /// Root directory of installed packages.
    fn site_packages(&self) -> Result<String, GuestError>;

    /// Directory that is importable by default (the guest's working directory).
    fn home_dir(&self) -> String {
        "/home/pyodide".to_string()
    }

    fn fs(&self) -> &dyn GuestFs;
}

/// Guest virtual filesystem. Paths are absolute and `/`-separated.
pub trait GuestFs: Send + Sync {
    /// All regular files below `root`, recursively.
    fn walk_files(&self, root: &str) -> Result<Vec<String>, GuestError>;

    /// Names of the entries directly inside `dir`.
    fn list_dir(&self, dir: &str) -> Result<Vec<String>, GuestError>;

    fn is_file(&self, path: &str) -> bool;

    fn read(&self, path: &str) -> Result<Vec<u8>, GuestError>;

    fn read_to_string(&self, path: &str) -> Result<String, GuestError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| GuestError::Fs {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), GuestError>;

    fn create_dir_all(&self, path: &str) -> Result<(), GuestError>;
}
