//! Host seams the boot sequence runs against.
//!
//! [`BootHost`] bundles the three services a boot needs; the in-memory
//! [`mock`] implementations back tests and offline tooling.

pub mod memfs;
pub mod mock;
pub mod paths;
pub mod traits;

use std::sync::Arc;

pub use memfs::MemoryFs;
pub use traits::{
    EngineFactory, GuestError, GuestFs, GuestRuntime, HostDocument, HostElement, HostError,
    HttpClient, HttpError,
};

/// Services shared by every boot stage.
#[derive(Clone)]
pub struct BootHost {
    pub document: Arc<dyn HostDocument>,
    pub http: Arc<dyn HttpClient>,
    pub engine: Arc<dyn EngineFactory>,
}

impl BootHost {
    pub fn new(
        document: impl HostDocument + 'static,
        http: impl HttpClient + 'static,
        engine: impl EngineFactory + 'static,
    ) -> Self {
        Self {
            document: Arc::new(document),
            http: Arc::new(http),
            engine: Arc::new(engine),
        }
    }
}

/// HEAD-probe `url`; network failures count as "does not exist".
pub async fn url_exists(http: &dyn HttpClient, url: &str) -> bool {
    match http.head(url).await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!("Failed to check URL {}: {}", url, e);
            false
        }
    }
}
