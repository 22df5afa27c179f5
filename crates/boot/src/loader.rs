//! Guest engine loading.
use thiserror::Error;
use tracing::{debug, info};

use crate::config::BootConfig;
use crate::host::{BootHost, GuestError, HostError};
use crate::session::Session;

#[derive(Debug, Error)]
pub enum RuntimeLoadError {
    #[error("failed to load engine script {url}")]
    Script {
        url: String,
        #[source]
        source: HostError,
    },

    #[error("engine script {url} loaded but did not define `{global}`")]
    EntryMissing { url: String, global: String },

    #[error("failed to initialize guest runtime from {index_url}")]
    Instantiate {
        index_url: String,
        #[source]
        source: GuestError,
    },
}

/// Makes the engine available and creates the session's runtime.
pub struct RuntimeLoader<'a> {
    host: &'a BootHost,
}

impl<'a> RuntimeLoader<'a> {
    pub fn new(host: &'a BootHost) -> Self {
        Self { host }
    }

    /// Load the engine bootstrap script unless its global entry point already exists.
    pub async fn ensure_engine(&self, base_url: &str) -> Result<(), RuntimeLoadError> {
        let global = self.host.engine.global_entry();
        if self.host.document.has_global(global) {
            debug!("Engine entry `{}` already present", global);
            return Ok(());
        }

        let url = format!("{}{}", base_url, self.host.engine.bootstrap_script());
        debug!("Loading engine script {}", url);
        self.host
            .document
            .load_script(&url)
            .await
            .map_err(|source| RuntimeLoadError::Script {
                url: url.clone(),
                source,
            })?;

        if !self.host.document.has_global(global) {
            return Err(RuntimeLoadError::EntryMissing {
                url,
                global: global.to_string(),
            });
        }
        Ok(())
    }

    /// Ensure the engine and instantiate it, producing the boot session.
    pub async fn load(&self, config: BootConfig) -> Result<Session, RuntimeLoadError> {
        let index_url = config.pyodide_base_url.clone();
        self.ensure_engine(&index_url).await?;

        let runtime = self
            .host
            .engine
            .instantiate(&index_url)
            .await
            .map_err(|source| RuntimeLoadError::Instantiate {
                index_url: index_url.clone(),
                source,
            })?;

        info!("Guest runtime ready ({})", index_url);
        Ok(Session::new(runtime, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BootRequest, DEFAULT_PYODIDE_BASE_URL};
    use crate::host::mock::{MockDocument, MockEngine, MockGuestRuntime, MockHttpClient};

    fn config() -> BootConfig {
        BootConfig::resolve(&BootRequest::Structured(Default::default()), None)
    }

    #[tokio::test]
    async fn test_loads_script_when_engine_missing() {
        let url = format!("{}pyodide.js", DEFAULT_PYODIDE_BASE_URL);
        let document = MockDocument::new().with_script(url.clone(), Some("loadPyodide"));
        let engine = MockEngine::new(MockGuestRuntime::new());
        let host = BootHost::new(document.clone(), MockHttpClient::new(), engine.clone());

        RuntimeLoader::new(&host).load(config()).await.unwrap();

        assert_eq!(document.loaded_scripts(), vec![url]);
        assert_eq!(engine.index_urls(), vec![DEFAULT_PYODIDE_BASE_URL.to_string()]);
    }

    #[tokio::test]
    async fn test_skips_script_when_engine_present() {
        let document = MockDocument::new().with_global("loadPyodide");
        let engine = MockEngine::new(MockGuestRuntime::new());
        let host = BootHost::new(document.clone(), MockHttpClient::new(), engine.clone());

        let loader = RuntimeLoader::new(&host);
        loader.load(config()).await.unwrap();

        assert!(document.loaded_scripts().is_empty());
        assert_eq!(engine.instantiations(), 1);
    }

    #[tokio::test]
    async fn test_script_failure_is_reported() {
        let host = BootHost::new(
            MockDocument::new(),
            MockHttpClient::new(),
            MockEngine::new(MockGuestRuntime::new()),
        );

        let err = RuntimeLoader::new(&host).load(config()).await.err().unwrap();
        assert!(matches!(err, RuntimeLoadError::Script { .. }));
    }

    #[tokio::test]
    async fn test_script_without_entry_is_reported() {
        let url = format!("{}pyodide.js", DEFAULT_PYODIDE_BASE_URL);
        let host = BootHost::new(
            MockDocument::new().with_script(url, None),
            MockHttpClient::new(),
            MockEngine::new(MockGuestRuntime::new()),
        );

        let err = RuntimeLoader::new(&host).load(config()).await.err().unwrap();
        assert!(matches!(err, RuntimeLoadError::EntryMissing { .. }));
    }

    #[tokio::test]
    async fn test_instantiation_failure_is_reported() {
        let engine = MockEngine::new(MockGuestRuntime::new());
        engine.set_fail(true);
        let host = BootHost::new(
            MockDocument::new().with_global("loadPyodide"),
            MockHttpClient::new(),
            engine,
        );

        let err = RuntimeLoader::new(&host).load(config()).await.err().unwrap();
        assert!(matches!(err, RuntimeLoadError::Instantiate { .. }));
    }
}
