//! In-memory host implementations for tests and offline tooling.
//!
//! Simulates the page, the network, and the guest engine without a browser.
//! Every mock is cheaply cloneable; clones share state so a test can keep a
//! handle for assertions after handing one to the orchestrator.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::memfs::MemoryFs;
use super::traits::{
    EngineFactory, GuestError, GuestFs, GuestRuntime, HostDocument, HostElement, HostError,
    HttpClient, HttpError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Network
// ============================================================================

/// Mock network with per-URL resources.
#[derive(Clone, Default)]
pub struct MockHttpClient {
    resources: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    head_only: Arc<Mutex<BTreeSet<String>>>,
    posts: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    requests: Arc<Mutex<Vec<String>>>,
    offline: Arc<AtomicBool>,
    reject_posts: Arc<AtomicBool>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for GET and HEAD requests to `url`.
    pub fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> &Self {
        lock(&self.resources).insert(url.into(), body.into());
        self
    }

    /// Answer HEAD requests to `url` with success without serving a body.
    pub fn reachable(&self, url: impl Into<String>) -> &Self {
        lock(&self.head_only).insert(url.into());
        self
    }

    /// Make every request fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make POST requests fail with a server error.
    pub fn set_reject_posts(&self, reject: bool) {
        self.reject_posts.store(reject, Ordering::SeqCst);
    }

    pub fn posts(&self) -> Vec<(String, serde_json::Value)> {
        lock(&self.posts).clone()
    }

    /// Every URL requested, in order, as `METHOD url`.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }

    fn check_online(&self, url: &str) -> Result<(), HttpError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(HttpError::Network {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn head(&self, url: &str) -> Result<bool, HttpError> {
        lock(&self.requests).push(format!("HEAD {url}"));
        self.check_online(url)?;
        Ok(lock(&self.resources).contains_key(url) || lock(&self.head_only).contains(url))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        lock(&self.requests).push(format!("GET {url}"));
        self.check_online(url)?;
        lock(&self.resources)
            .get(url)
            .cloned()
            .ok_or_else(|| HttpError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), HttpError> {
        lock(&self.requests).push(format!("POST {url}"));
        self.check_online(url)?;
        lock(&self.posts).push((url.to_string(), body.clone()));
        if self.reject_posts.load(Ordering::SeqCst) {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Page
// ============================================================================

#[derive(Default)]
struct DocumentState {
    origin: Option<String>,
    elements: HashMap<String, Vec<HostElement>>,
    globals: BTreeSet<String>,
    scripts: HashMap<String, Option<String>>,
    loaded_scripts: Vec<String>,
    evaluated: Vec<String>,
    styles: Vec<String>,
    links: Vec<String>,
    rendered_errors: Vec<(String, String)>,
    failing_eval_marker: Option<String>,
}

/// Mock hosting document.
#[derive(Clone, Default)]
pub struct MockDocument {
    state: Arc<Mutex<DocumentState>>,
}

impl MockDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(self, origin: impl Into<String>) -> Self {
        lock(&self.state).origin = Some(origin.into());
        self
    }

    /// Register an element returned for `selector` queries (appended in document order).
    pub fn with_element(self, selector: impl Into<String>, element: HostElement) -> Self {
        lock(&self.state)
            .elements
            .entry(selector.into())
            .or_default()
            .push(element);
        self
    }

    pub fn with_global(self, name: impl Into<String>) -> Self {
        lock(&self.state).globals.insert(name.into());
        self
    }

    /// Serve a loadable script at `url`; loading it defines `defines` globally.
    pub fn with_script(self, url: impl Into<String>, defines: Option<&str>) -> Self {
        lock(&self.state)
            .scripts
            .insert(url.into(), defines.map(str::to_string));
        self
    }

    /// Make [`HostDocument::eval_script`] fail for sources containing `marker`.
    pub fn with_failing_eval(self, marker: impl Into<String>) -> Self {
        lock(&self.state).failing_eval_marker = Some(marker.into());
        self
    }

    pub fn loaded_scripts(&self) -> Vec<String> {
        lock(&self.state).loaded_scripts.clone()
    }

    pub fn evaluated_scripts(&self) -> Vec<String> {
        lock(&self.state).evaluated.clone()
    }

    pub fn styles(&self) -> Vec<String> {
        lock(&self.state).styles.clone()
    }

    pub fn stylesheet_links(&self) -> Vec<String> {
        lock(&self.state).links.clone()
    }

    pub fn rendered_errors(&self) -> Vec<(String, String)> {
        lock(&self.state).rendered_errors.clone()
    }
}

#[async_trait]
impl HostDocument for MockDocument {
    fn origin(&self) -> Option<String> {
        lock(&self.state).origin.clone()
    }

    fn query_all(&self, selector: &str) -> Vec<HostElement> {
        lock(&self.state)
            .elements
            .get(selector)
            .cloned()
            .unwrap_or_default()
    }

    fn has_global(&self, name: &str) -> bool {
        lock(&self.state).globals.contains(name)
    }

    async fn load_script(&self, url: &str) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        state.loaded_scripts.push(url.to_string());
        match state.scripts.get(url).cloned() {
            Some(defines) => {
                if let Some(global) = defines {
                    state.globals.insert(global);
                }
                Ok(())
            }
            None => Err(HostError::ScriptLoad {
                url: url.to_string(),
                message: "404 Not Found".to_string(),
            }),
        }
    }

    fn eval_script(&self, source: &str) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        if let Some(marker) = &state.failing_eval_marker
            && source.contains(marker.as_str())
        {
            return Err(HostError::Evaluation(format!(
                "SyntaxError near {marker:?}"
            )));
        }
        state.evaluated.push(source.to_string());
        Ok(())
    }

    fn append_style(&self, css: &str) -> Result<(), HostError> {
        lock(&self.state).styles.push(css.to_string());
        Ok(())
    }

    fn append_stylesheet_link(&self, href: &str) -> Result<(), HostError> {
        lock(&self.state).links.push(href.to_string());
        Ok(())
    }

    fn render_error(&self, container_id: &str, message: &str) {
        lock(&self.state)
            .rendered_errors
            .push((container_id.to_string(), message.to_string()));
    }
}

// ============================================================================
// Guest engine
// ============================================================================

type Responder = Result<String, GuestError>;

struct GuestState {
    loaded_packages: Vec<String>,
    failing_packages: BTreeSet<String>,
    installed: Vec<String>,
    failing_installs: BTreeSet<String>,
    executed: Vec<String>,
    responses: Vec<(String, Responder)>,
    archives: Vec<(usize, String)>,
    fail_unpack: bool,
    site_packages: String,
}

/// Mock guest runtime.
///
/// Guest code is not interpreted. Package-manager installs are recognized and
/// recorded; any other snippet is answered by the first response registered
/// with [`MockGuestRuntime::respond_to`] whose needle it contains, or with an
/// empty result.
#[derive(Clone)]
pub struct MockGuestRuntime {
    state: Arc<Mutex<GuestState>>,
    fs: Arc<MemoryFs>,
}

pub const MOCK_SITE_PACKAGES: &str = "/lib/python3.12/site-packages";

impl MockGuestRuntime {
    pub fn new() -> Self {
        let fs = MemoryFs::new();
        let _ = fs.create_dir_all(MOCK_SITE_PACKAGES);
        let _ = fs.create_dir_all("/home/pyodide");
        Self {
            state: Arc::new(Mutex::new(GuestState {
                loaded_packages: Vec::new(),
                failing_packages: BTreeSet::new(),
                installed: Vec::new(),
                failing_installs: BTreeSet::new(),
                executed: Vec::new(),
                responses: Vec::new(),
                archives: Vec::new(),
                fail_unpack: false,
                site_packages: MOCK_SITE_PACKAGES.to_string(),
            })),
            fs: Arc::new(fs),
        }
    }

    pub fn memory_fs(&self) -> &MemoryFs {
        &self.fs
    }

    /// Answer snippets containing `needle` with `response`.
    pub fn respond_to(&self, needle: impl Into<String>, response: Responder) -> &Self {
        lock(&self.state).responses.push((needle.into(), response));
        self
    }

    pub fn fail_package(&self, name: impl Into<String>) -> &Self {
        lock(&self.state).failing_packages.insert(name.into());
        self
    }

    pub fn fail_install(&self, specifier: impl Into<String>) -> &Self {
        lock(&self.state).failing_installs.insert(specifier.into());
        self
    }

    pub fn set_fail_unpack(&self, fail: bool) {
        lock(&self.state).fail_unpack = fail;
    }

    pub fn set_site_packages(&self, path: impl Into<String>) {
        lock(&self.state).site_packages = path.into();
    }

    pub fn loaded_packages(&self) -> Vec<String> {
        lock(&self.state).loaded_packages.clone()
    }

    /// Specifiers passed to the package manager, in install order.
    pub fn installed(&self) -> Vec<String> {
        lock(&self.state).installed.clone()
    }

    /// Every non-install snippet run, in order.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.state).executed.clone()
    }

    /// `(byte length, format)` of each archive unpacked.
    pub fn archives(&self) -> Vec<(usize, String)> {
        lock(&self.state).archives.clone()
    }
}

impl Default for MockGuestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the string literal passed to `micropip.install(...)`.
fn install_argument(code: &str) -> Option<String> {
    let start = code.find("micropip.install(")? + "micropip.install(".len();
    serde_json::Deserializer::from_str(&code[start..])
        .into_iter::<String>()
        .next()?
        .ok()
}

#[async_trait]
impl GuestRuntime for MockGuestRuntime {
    async fn load_package(&self, name: &str) -> Result<(), GuestError> {
        let mut state = lock(&self.state);
        if state.failing_packages.contains(name) {
            return Err(GuestError::PackageLoad {
                name: name.to_string(),
                message: "package not found in lock file".to_string(),
            });
        }
        state.loaded_packages.push(name.to_string());
        Ok(())
    }

    async fn run_async(&self, code: &str) -> Result<String, GuestError> {
        let mut state = lock(&self.state);
        if let Some(specifier) = install_argument(code) {
            if state.failing_installs.contains(&specifier) {
                return Err(GuestError::Execution(format!(
                    "ValueError: Can't find a pure Python 3 wheel for '{specifier}'"
                )));
            }
            state.installed.push(specifier);
            return Ok(String::new());
        }
        state.executed.push(code.to_string());
        state
            .responses
            .iter()
            .find(|(needle, _)| code.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Ok(String::new()))
    }

    fn unpack_archive(&self, bytes: &[u8], format: &str) -> Result<(), GuestError> {
        let mut state = lock(&self.state);
        if state.fail_unpack || bytes.is_empty() {
            return Err(GuestError::Unpack {
                format: format.to_string(),
                message: "not a valid archive".to_string(),
            });
        }
        state.archives.push((bytes.len(), format.to_string()));
        Ok(())
    }

    fn site_packages(&self) -> Result<String, GuestError> {
        Ok(lock(&self.state).site_packages.clone())
    }

    fn fs(&self) -> &dyn GuestFs {
        self.fs.as_ref()
    }
}

/// Mock engine that hands out clones of one [`MockGuestRuntime`].
#[derive(Clone)]
pub struct MockEngine {
    runtime: MockGuestRuntime,
    instantiations: Arc<AtomicUsize>,
    index_urls: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl MockEngine {
    pub fn new(runtime: MockGuestRuntime) -> Self {
        Self {
            runtime,
            instantiations: Arc::new(AtomicUsize::new(0)),
            index_urls: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn runtime(&self) -> &MockGuestRuntime {
        &self.runtime
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn instantiations(&self) -> usize {
        self.instantiations.load(Ordering::SeqCst)
    }

    pub fn index_urls(&self) -> Vec<String> {
        lock(&self.index_urls).clone()
    }
}

#[async_trait]
impl EngineFactory for MockEngine {
    async fn instantiate(&self, index_url: &str) -> Result<Box<dyn GuestRuntime>, GuestError> {
        lock(&self.index_urls).push(index_url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GuestError::Initialization(
                "WebAssembly.instantiate(): out of memory".to_string(),
            ));
        }
        self.instantiations.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.runtime.clone()))
    }
}
