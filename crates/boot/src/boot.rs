//! Boot orchestrator.
//!
//! [`Bootstrapper`] runs the stages in strict order against one [`BootHost`]:
//! config → relay → runtime → dependencies → assets → launch. The session
//! created by the runtime loader is threaded forward; no stage reaches back.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::assets::{AssetInjector, AssetReport};
use crate::config::{BootConfig, BootRequest};
use crate::error::{BootError, Result, display_chain};
use crate::host::BootHost;
use crate::install::DependencyInstaller;
use crate::launch::{LaunchContext, LaunchPlan, LaunchReport};
use crate::loader::RuntimeLoader;
use crate::relay::DiagnosticsRelay;
use crate::session::WidgetSource;

/// Element that receives the failure message on auto-start.
pub const ERROR_CONTAINER_ID: &str = "maindiv";

/// Summary of a successful boot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootReport {
    pub config: BootConfig,
    pub widget_source: WidgetSource,
    pub aux_packages: Vec<String>,
    pub extra_packages: Vec<String>,
    pub assets: AssetReport,
    pub launch: LaunchReport,
}

/// Boots one application per page.
pub struct Bootstrapper {
    host: BootHost,
    relay: Option<DiagnosticsRelay>,
    started: AtomicBool,
}

impl Bootstrapper {
    pub fn new(host: BootHost) -> Self {
        Self {
            host,
            relay: None,
            started: AtomicBool::new(false),
        }
    }

    /// Relay to install when the resolved config enables backend logging.
    pub fn with_relay(mut self, relay: DiagnosticsRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Resolve `request` and run every stage. Only the first call boots.
    pub async fn boot(&self, request: BootRequest) -> Result<BootReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Boot requested again; ignoring");
            return Err(BootError::AlreadyStarted);
        }

        let result = self.run(request).await;
        if let Err(e) = &result {
            error!(stage = %e.stage(), "Boot failed: {}", display_chain(e));
        }
        result
    }

    /// [`Bootstrapper::boot`], rendering any failure into the page.
    pub async fn auto_start(&self, request: BootRequest) -> Result<BootReport> {
        let result = self.boot(request).await;
        if let Err(e) = &result {
            self.host.document.render_error(
                ERROR_CONTAINER_ID,
                &format!("Failed to start application: {}", display_chain(e)),
            );
        }
        result
    }

    async fn run(&self, request: BootRequest) -> Result<BootReport> {
        let origin = self.host.document.origin();
        let config = BootConfig::resolve(&request, origin.as_deref());
        info!(
            application = config.application.as_deref().unwrap_or("<inline>"),
            mode = %config.mode,
            "Booting"
        );

        if config.enable_backend_logging {
            match &self.relay {
                // The delivery task outlives the boot.
                Some(relay) => {
                    let _ = relay.install(self.host.http.clone(), config.log_endpoint.clone());
                }
                None => debug!("Backend logging enabled but no relay attached; not relaying"),
            }
        }

        let injector = AssetInjector::new(self.host.document.as_ref());
        if config.load_material_icons
            && let Err(e) = injector.link_stylesheet(&config.material_icons_url)
        {
            warn!("Icon font not linked: {}", display_chain(&e));
        }

        let mut session = RuntimeLoader::new(&self.host).load(config).await?;
        info!("Runtime loaded");

        let installed = DependencyInstaller::new(&self.host)
            .install_all(&mut session)
            .await?;
        info!("Dependencies installed");

        let assets = injector.inject_session(&session)?;

        let plan = LaunchPlan::for_config(session.config());
        info!("Launching ({})", plan.strategy_names().join(", "));
        let launch = plan
            .run(&LaunchContext::new(&self.host, &session))
            .await?;

        Ok(BootReport {
            config: session.config().clone(),
            widget_source: installed.widget_source,
            aux_packages: installed.aux_packages,
            extra_packages: installed.extra_packages,
            assets,
            launch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::error::BootStage;
    use crate::host::mock::{MockDocument, MockEngine, MockGuestRuntime, MockHttpClient};
    use std::sync::{Arc, Mutex};

    fn host(document: MockDocument, runtime: &MockGuestRuntime) -> BootHost {
        BootHost::new(
            document.with_global("loadPyodide"),
            MockHttpClient::new(),
            MockEngine::new(runtime.clone()),
        )
    }

    #[tokio::test]
    async fn test_second_boot_is_rejected() {
        let runtime = MockGuestRuntime::new();
        let boot = Bootstrapper::new(host(MockDocument::new(), &runtime));

        let first = boot.boot(BootRequest::from(ConfigOverrides::default())).await;
        assert!(first.is_err());
        let second = boot
            .boot(BootRequest::from(ConfigOverrides::default()))
            .await
            .unwrap_err();
        assert!(matches!(second, BootError::AlreadyStarted));
        assert_eq!(second.stage(), BootStage::Config);
    }

    #[tokio::test]
    async fn test_backend_logging_without_relay_is_logged() {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let logs = logs.clone();
            move || CapturedLogs(logs.clone())
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let runtime = MockGuestRuntime::new();
        let http = MockHttpClient::new();
        let boot = Bootstrapper::new(BootHost::new(
            MockDocument::new().with_global("loadPyodide"),
            http.clone(),
            MockEngine::new(runtime.clone()),
        ));
        let request = BootRequest::from(ConfigOverrides {
            application: Some("foo".into()),
            ..Default::default()
        });
        let _ = boot.boot(request).await;

        let logs = String::from_utf8(logs.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Backend logging enabled but no relay attached"));
        assert!(http.posts().is_empty());
    }

    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_auto_start_renders_failure() {
        let runtime = MockGuestRuntime::new();
        let document = MockDocument::new();
        let boot = Bootstrapper::new(host(document.clone(), &runtime));

        let err = boot
            .auto_start(BootRequest::from(ConfigOverrides::default()))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), BootStage::Launch);
        assert_eq!(
            document.rendered_errors(),
            vec![(
                "maindiv".to_string(),
                "Failed to start application: no application could be started".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_icon_font_is_linked_first() {
        let runtime = MockGuestRuntime::new();
        let document = MockDocument::new();
        let boot = Bootstrapper::new(host(document.clone(), &runtime));

        let _ = boot.boot(BootRequest::from(ConfigOverrides::default())).await;
        assert_eq!(
            document.stylesheet_links(),
            vec![crate::config::DEFAULT_MATERIAL_ICONS_URL.to_string()]
        );
    }

    #[tokio::test]
    async fn test_icon_font_can_be_disabled() {
        let runtime = MockGuestRuntime::new();
        let document = MockDocument::new();
        let boot = Bootstrapper::new(host(document.clone(), &runtime));

        let overrides = ConfigOverrides {
            load_material_icons: Some(false),
            ..Default::default()
        };
        let _ = boot.boot(BootRequest::from(overrides)).await;
        assert!(document.stylesheet_links().is_empty());
    }
}
