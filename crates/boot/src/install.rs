//! Package installation through the guest package manager.
//!
//! Order is fixed: package manager, widget source resolution, auxiliary
//! packages, the widget package, then the document's extra-dependency
//! manifest in declaration order. Every install failure aborts the boot.
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::BootConfig;
use crate::guest;
use crate::host::{BootHost, GuestError, GuestRuntime, HttpClient, url_exists};
use crate::session::{Session, WidgetSource};

/// Package providing `micropip.install`, bundled with the engine.
pub const PACKAGE_MANAGER: &str = "micropip";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to load package manager `{name}`")]
    PackageManager {
        name: String,
        #[source]
        source: GuestError,
    },

    #[error("failed to install {specifier}")]
    Install {
        specifier: String,
        #[source]
        source: GuestError,
    },
}

#[derive(Debug, Error)]
pub enum ManifestParseError {
    #[error("dependency manifest is not a JSON list of package specifiers")]
    Json(#[from] serde_json::Error),
}

/// Packages installed during the dependency stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub widget_source: WidgetSource,
    pub aux_packages: Vec<String>,
    pub extra_packages: Vec<String>,
}

/// Development wheel URL probed before falling back to the configured widget package.
///
/// `None` without an application identifier.
pub fn dev_wheel_url(config: &BootConfig) -> Option<String> {
    let application = config.application.as_deref()?;
    Some(format!(
        "{}/{}/appcode/{}-{}-py3-none-any.whl",
        config.dev_widget_host,
        application,
        config.widget_package_name(),
        config.dev_wheel_version
    ))
}

/// Where the widget package should come from.
///
/// An explicit override wins. With an application configured, a reachable
/// development wheel is preferred over the configured specifier.
pub async fn resolve_widget_source(http: &dyn HttpClient, config: &BootConfig) -> WidgetSource {
    if let Some(explicit) = &config.widget_source {
        return WidgetSource::Override(explicit.clone());
    }
    let Some(url) = dev_wheel_url(config) else {
        return WidgetSource::Configured(config.widgetlib.clone());
    };
    if url_exists(http, &url).await {
        debug!("Development widget wheel reachable at {}", url);
        WidgetSource::DevHost(url)
    } else {
        debug!("No development widget wheel at {}", url);
        WidgetSource::Configured(config.widgetlib.clone())
    }
}

/// Parse the manifest text: a JSON array of specifier strings.
pub fn parse_manifest(text: &str) -> Result<Vec<String>, ManifestParseError> {
    let specifiers: Vec<String> = serde_json::from_str(text)?;
    Ok(specifiers
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Drives the guest package manager for one session.
pub struct DependencyInstaller<'a> {
    host: &'a BootHost,
}

impl<'a> DependencyInstaller<'a> {
    pub fn new(host: &'a BootHost) -> Self {
        Self { host }
    }

    pub async fn install_all(&self, session: &mut Session) -> Result<InstallReport, InstallError> {
        let runtime = session.runtime();
        if let Err(source) = runtime.load_package(PACKAGE_MANAGER).await {
            error!("Failed to load {}: {}", PACKAGE_MANAGER, source);
            return Err(InstallError::PackageManager {
                name: PACKAGE_MANAGER.to_string(),
                source,
            });
        }

        let widget_source = self.resolve_widget_source(session).await;
        let runtime = session.runtime();
        let config = session.config();

        for specifier in &config.aux_packages {
            install(runtime, specifier).await?;
        }
        install(runtime, widget_source.specifier()).await?;
        info!("Widget package installed from {}", widget_source);

        let extra_packages = self.read_manifest(&config.libs_selector);
        for specifier in &extra_packages {
            install(runtime, specifier).await?;
        }
        if !extra_packages.is_empty() {
            info!("Installed {} extra package(s)", extra_packages.len());
        }

        Ok(InstallReport {
            widget_source,
            aux_packages: config.aux_packages.clone(),
            extra_packages,
        })
    }

    /// Resolve where the widget package comes from, once per session.
    pub async fn resolve_widget_source(&self, session: &mut Session) -> WidgetSource {
        if let Some(cached) = session.widget_source() {
            return cached.clone();
        }
        let source = resolve_widget_source(self.host.http.as_ref(), session.config()).await;
        session.cache_widget_source(source).clone()
    }

    /// Specifiers listed in the manifest element, if any.
    ///
    /// A malformed manifest is logged and treated as empty.
    pub fn read_manifest(&self, selector: &str) -> Vec<String> {
        let Some(element) = self.host.document.query_all(selector).into_iter().next() else {
            return Vec::new();
        };
        match parse_manifest(&element.text) {
            Ok(specifiers) => specifiers,
            Err(e) => {
                warn!("Ignoring manifest {}: {}", selector, e);
                Vec::new()
            }
        }
    }
}

async fn install(runtime: &dyn GuestRuntime, specifier: &str) -> Result<(), InstallError> {
    debug!("Installing {}", specifier);
    runtime
        .run_async(&guest::install(specifier))
        .await
        .map(|_| ())
        .map_err(|source| {
            error!("Error installing {}: {}", specifier, source);
            InstallError::Install {
                specifier: specifier.to_string(),
                source,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootRequest;
    use crate::host::HostElement;
    use crate::host::mock::{MockDocument, MockEngine, MockGuestRuntime, MockHttpClient};
    use serde_json::json;

    const DEV_URL: &str = "http://0.0.0.0:8070/foo/appcode/dhxpyt-99.99.99-py3-none-any.whl";

    fn session_for(request: serde_json::Value, runtime: &MockGuestRuntime) -> Session {
        let config = BootConfig::resolve(&BootRequest::from_json(&request), None);
        Session::new(Box::new(runtime.clone()), config)
    }

    fn host(document: MockDocument, http: &MockHttpClient) -> BootHost {
        BootHost::new(document, http.clone(), MockEngine::new(MockGuestRuntime::new()))
    }

    #[test]
    fn test_dev_wheel_url() {
        let config = BootConfig::resolve(&BootRequest::legacy("foo", "dhxpyt", ""), None);
        assert_eq!(dev_wheel_url(&config).as_deref(), Some(DEV_URL));

        let config = BootConfig::resolve(&BootRequest::Structured(Default::default()), None);
        assert_eq!(dev_wheel_url(&config), None);
    }

    #[tokio::test]
    async fn test_widget_source_prefers_reachable_dev_wheel() {
        let runtime = MockGuestRuntime::new();
        let http = MockHttpClient::new();
        http.reachable(DEV_URL);
        let host = host(MockDocument::new(), &http);

        let mut session = session_for(json!({ "application": "foo" }), &runtime);
        let source = DependencyInstaller::new(&host)
            .resolve_widget_source(&mut session)
            .await;
        assert_eq!(source, WidgetSource::DevHost(DEV_URL.to_string()));
    }

    #[tokio::test]
    async fn test_widget_source_falls_back_when_unreachable() {
        let runtime = MockGuestRuntime::new();
        let http = MockHttpClient::new();
        let host = host(MockDocument::new(), &http);

        let mut session = session_for(json!({ "application": "foo" }), &runtime);
        let source = DependencyInstaller::new(&host)
            .resolve_widget_source(&mut session)
            .await;
        assert_eq!(source, WidgetSource::Configured("dhxpyt".to_string()));

        // Network errors count as unreachable too.
        http.set_offline(true);
        let mut session = session_for(json!({ "application": "foo" }), &runtime);
        let source = DependencyInstaller::new(&host)
            .resolve_widget_source(&mut session)
            .await;
        assert_eq!(source, WidgetSource::Configured("dhxpyt".to_string()));
    }

    #[tokio::test]
    async fn test_widget_source_is_cached() {
        let runtime = MockGuestRuntime::new();
        let http = MockHttpClient::new();
        let host = host(MockDocument::new(), &http);
        let installer = DependencyInstaller::new(&host);

        let mut session = session_for(json!({ "application": "foo" }), &runtime);
        installer.resolve_widget_source(&mut session).await;
        http.reachable(DEV_URL);
        let second = installer.resolve_widget_source(&mut session).await;

        assert_eq!(second, WidgetSource::Configured("dhxpyt".to_string()));
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_override_skips_probe() {
        let runtime = MockGuestRuntime::new();
        let http = MockHttpClient::new();
        let host = host(MockDocument::new(), &http);

        let mut session = session_for(
            json!({ "application": "foo", "widgetSource": "/wheels/w.whl" }),
            &runtime,
        );
        let source = DependencyInstaller::new(&host)
            .resolve_widget_source(&mut session)
            .await;
        assert_eq!(source, WidgetSource::Override("/wheels/w.whl".to_string()));
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn test_install_order() {
        let runtime = MockGuestRuntime::new();
        let http = MockHttpClient::new();
        let document = MockDocument::new().with_element(
            "#micropip-libs",
            HostElement::new(r#"["numpy", "pandas==2.2"]"#),
        );
        let host = host(document, &http);

        let mut session = session_for(json!({}), &runtime);
        let report = DependencyInstaller::new(&host)
            .install_all(&mut session)
            .await
            .unwrap();

        assert_eq!(runtime.loaded_packages(), vec!["micropip"]);
        assert_eq!(
            runtime.installed(),
            vec!["python-dotenv", "dhxpyt", "numpy", "pandas==2.2"]
        );
        assert_eq!(report.extra_packages, vec!["numpy", "pandas==2.2"]);
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_ignored() {
        let runtime = MockGuestRuntime::new();
        let http = MockHttpClient::new();
        let document =
            MockDocument::new().with_element("#micropip-libs", HostElement::new("[numpy,"));
        let host = host(document, &http);

        let mut session = session_for(json!({}), &runtime);
        let report = DependencyInstaller::new(&host)
            .install_all(&mut session)
            .await
            .unwrap();

        assert!(report.extra_packages.is_empty());
        assert_eq!(runtime.installed(), vec!["python-dotenv", "dhxpyt"]);
    }

    #[tokio::test]
    async fn test_failed_install_aborts() {
        let runtime = MockGuestRuntime::new();
        runtime.fail_install("dhxpyt");
        let http = MockHttpClient::new();
        let document =
            MockDocument::new().with_element("#micropip-libs", HostElement::new(r#"["numpy"]"#));
        let host = host(document, &http);

        let mut session = session_for(json!({}), &runtime);
        let err = DependencyInstaller::new(&host)
            .install_all(&mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::Install { ref specifier, .. } if specifier == "dhxpyt"));
        assert_eq!(runtime.installed(), vec!["python-dotenv"]);
    }

    #[tokio::test]
    async fn test_missing_package_manager_aborts() {
        let runtime = MockGuestRuntime::new();
        runtime.fail_package("micropip");
        let http = MockHttpClient::new();
        let host = host(MockDocument::new(), &http);

        let mut session = session_for(json!({}), &runtime);
        let err = DependencyInstaller::new(&host)
            .install_all(&mut session)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::PackageManager { .. }));
        assert!(runtime.installed().is_empty());
    }

    #[test]
    fn test_parse_manifest() {
        assert_eq!(parse_manifest(r#"["a", " ", "b"]"#).unwrap(), vec!["a", "b"]);
        assert!(parse_manifest(r#"{"a": 1}"#).is_err());
    }
}
