use std::sync::Arc;

use serde_json::json;
use tincture_boot::guest::{CALL_MARKER, INSPECT_MARKER};
use tincture_boot::host::mock::{
    MOCK_SITE_PACKAGES, MockDocument, MockEngine, MockGuestRuntime, MockHttpClient,
};
use tincture_boot::{
    BootConfig, BootError, BootHost, BootRequest, BootStage, Bootstrapper, DiagnosticsRelay,
    HostElement, LaunchError, WidgetSource,
};
use tracing_subscriber::layer::SubscriberExt;

const INLINE: &str = r#"script[type="text/python"]"#;
const DEV_WHEEL: &str = "http://localhost:8000/foo/appcode/dhxpyt-99.99.99-py3-none-any.whl";

/// A page served from `http://localhost:8000` with the engine already loaded.
struct Page {
    document: MockDocument,
    http: MockHttpClient,
    runtime: MockGuestRuntime,
}

impl Page {
    fn new() -> Self {
        Self {
            document: MockDocument::new()
                .with_origin("http://localhost:8000")
                .with_global("loadPyodide"),
            http: MockHttpClient::new(),
            runtime: MockGuestRuntime::new(),
        }
    }

    fn with_inline(mut self, source: &str) -> Self {
        self.document = self.document.with_element(INLINE, HostElement::new(source));
        self
    }

    fn bootstrapper(&self) -> Bootstrapper {
        Bootstrapper::new(BootHost::new(
            self.document.clone(),
            self.http.clone(),
            MockEngine::new(self.runtime.clone()),
        ))
    }
}

fn structured(value: serde_json::Value) -> BootRequest {
    BootRequest::from_json(&value)
}

// ================================================================
// Configuration
// ================================================================

#[test]
fn test_resolution_is_deterministic() {
    let legacy = BootRequest::legacy("foo", "dhxpyt==1.0", "");
    assert_eq!(
        BootConfig::resolve(&legacy, Some("http://localhost:8000")),
        BootConfig::resolve(&legacy, Some("http://localhost:8000"))
    );

    let request = structured(json!({ "application": "foo", "mode": "inline" }));
    let first = serde_json::to_string(&BootConfig::resolve(&request, None)).unwrap();
    let second = serde_json::to_string(&BootConfig::resolve(&request, None)).unwrap();
    assert_eq!(first, second);
}

// ================================================================
// Packaged launch
// ================================================================

#[tokio::test]
async fn test_packaged_boot_end_to_end() {
    let page = Page::new();
    page.http.serve("foo/appcode/appcode.pyt", vec![b'P', b'K', 3, 4]);
    page.http.reachable(DEV_WHEEL);
    page.runtime.memory_fs().insert_file(
        &format!("{MOCK_SITE_PACKAGES}/dhxpyt/suite.js"),
        "window.dhx = {};",
    );

    let report = page
        .bootstrapper()
        .boot(structured(json!({ "application": "foo", "entrypoint": "App" })))
        .await
        .unwrap();

    assert_eq!(report.widget_source, WidgetSource::DevHost(DEV_WHEEL.to_string()));
    assert_eq!(page.runtime.installed(), vec!["python-dotenv", DEV_WHEEL]);
    assert_eq!(report.assets.scripts, 1);
    assert_eq!(report.launch.strategy, "packaged");
    assert_eq!(
        page.runtime.executed().last().map(String::as_str),
        Some("from foo import App as _tincture_entry\n_tincture_entry()\n")
    );
}

#[tokio::test]
async fn test_unreachable_dev_wheel_uses_configured_package() {
    let page = Page::new();
    page.http.serve("foo/appcode/appcode.pyt", vec![1u8]);

    let report = page
        .bootstrapper()
        .boot(BootRequest::legacy("foo", "dhxpyt==1.2", "App"))
        .await
        .unwrap();

    assert_eq!(
        report.widget_source,
        WidgetSource::Configured("dhxpyt==1.2".to_string())
    );
    assert!(page.http.requests().contains(
        &"HEAD http://localhost:8000/foo/appcode/dhxpyt-99.99.99-py3-none-any.whl".to_string()
    ));
}

#[tokio::test]
async fn test_explicit_package_mode_failure_is_fatal() {
    let page = Page::new().with_inline("class Window(MainWindow): pass");

    let err = page
        .bootstrapper()
        .boot(structured(json!({ "application": "foo", "mode": "package" })))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), BootStage::Launch);
    assert!(matches!(err, BootError::Launch(LaunchError::Fetch { .. })));
    assert!(page.runtime.memory_fs().file_paths().iter().all(|p| !p.contains("inline_app")));
}

// ================================================================
// Inline launch
// ================================================================

#[tokio::test]
async fn test_auto_falls_back_to_inline_main_window() {
    let page = Page::new()
        .with_inline("from .module_1 import Window")
        .with_inline("class Window(MainWindow):\n    pass\n");
    page.runtime.respond_to(CALL_MARKER, Ok(r#"{"module": null}"#.into()));
    page.runtime.respond_to(
        INSPECT_MARKER,
        Ok(json!({
            "modules": [
                {
                    "module": "inline_app",
                    "registered": null,
                    "classes": []
                },
                {
                    "module": "inline_app.module_1",
                    "registered": null,
                    "classes": [{ "name": "Window", "bases": ["MainWindow"] }]
                }
            ]
        })
        .to_string()),
    );

    let report = page
        .bootstrapper()
        .boot(structured(json!({ "application": "foo" })))
        .await
        .unwrap();

    assert!(page.http.requests().contains(&"GET foo/appcode/appcode.pyt".to_string()));
    assert_eq!(report.launch.strategy, "inline");
    assert_eq!(report.launch.entrypoint, "Window");
    assert_eq!(report.launch.discovery.as_deref(), Some("main-window"));
    assert_eq!(
        page.runtime.executed().last().map(String::as_str),
        Some("from inline_app.module_1 import Window as _tincture_entry\n_tincture_entry()\n")
    );
}

#[tokio::test]
async fn test_hyphenated_application_discovers_inline_entry() {
    let page = Page::new().with_inline("class W(MainWindow):\n    pass\n");
    page.runtime.respond_to(
        INSPECT_MARKER,
        Ok(json!({
            "modules": [
                { "module": "inline_app", "classes": [{ "name": "W", "bases": ["MainWindow"] }] }
            ]
        })
        .to_string()),
    );

    let report = page
        .bootstrapper()
        .boot(structured(json!({ "application": "my-app" })))
        .await
        .unwrap();

    assert_eq!(report.launch.strategy, "inline");
    assert_eq!(report.launch.entrypoint, "W");
    assert!(
        page.runtime
            .executed()
            .iter()
            .all(|code| !code.contains(CALL_MARKER))
    );
}

#[tokio::test]
async fn test_registered_entrypoint_preferred() {
    let page = Page::new().with_inline("__entrypoint__ = 'Start'\nclass Start: ...\n");
    page.runtime.respond_to(
        INSPECT_MARKER,
        Ok(json!({
            "modules": [{
                "module": "inline_app",
                "registered": "Start",
                "classes": [
                    { "name": "Legacy", "bases": ["MainWindow"] },
                    { "name": "Start", "bases": ["object"] }
                ]
            }]
        })
        .to_string()),
    );

    let report = page
        .bootstrapper()
        .boot(structured(json!({ "mode": "inline" })))
        .await
        .unwrap();

    assert_eq!(report.launch.entrypoint, "Start");
    assert_eq!(report.launch.discovery.as_deref(), Some("registered"));
}

#[tokio::test]
async fn test_inline_named_entrypoint_without_discovery() {
    let page = Page::new().with_inline("class App:\n    def __init__(self): ...\n");
    page.runtime
        .respond_to(CALL_MARKER, Ok(r#"{"module": "inline_app"}"#.into()));

    let report = page
        .bootstrapper()
        .boot(structured(json!({ "mode": "inline", "entrypoint": "App" })))
        .await
        .unwrap();

    assert_eq!(report.launch.entrypoint, "App");
    assert_eq!(report.launch.discovery, None);
    assert!(
        page.runtime
            .executed()
            .iter()
            .all(|code| !code.contains(INSPECT_MARKER))
    );
}

#[tokio::test]
async fn test_nothing_to_start() {
    let page = Page::new();

    let err = page
        .bootstrapper()
        .auto_start(structured(json!({})))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), BootStage::Launch);
    assert_eq!(err.to_string(), "no application could be started");
    assert_eq!(
        page.document.rendered_errors(),
        vec![(
            "maindiv".to_string(),
            "Failed to start application: no application could be started".to_string()
        )]
    );
}

#[tokio::test]
async fn test_auto_without_inline_reports_packaged_cause() {
    let page = Page::new();

    let err = page
        .bootstrapper()
        .auto_start(structured(json!({ "application": "foo" })))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "no application could be started");
    let (_, message) = &page.document.rendered_errors()[0];
    assert!(message.contains("failed to fetch application archive foo/appcode/appcode.pyt"));
}

// ================================================================
// Assets
// ================================================================

#[tokio::test]
async fn test_fonts_inlined_and_broken_assets_tolerated() {
    let page = Page::new();
    page.http.serve("foo/appcode/appcode.pyt", vec![1u8]);
    let fs = page.runtime.memory_fs();
    fs.insert_file(
        &format!("{MOCK_SITE_PACKAGES}/dhxpyt/css/suite.css"),
        "@font-face{src:url('./fonts/a.woff')} @font-face{src:url(./fonts/b.woff2)}",
    );
    fs.insert_file(
        &format!("{MOCK_SITE_PACKAGES}/dhxpyt/css/fonts/a.woff"),
        b"wOFF".to_vec(),
    );
    fs.insert_file(&format!("{MOCK_SITE_PACKAGES}/other/plain.css"), "p{}");
    fs.insert_file(&format!("{MOCK_SITE_PACKAGES}/other/broken.js"), "oops(");
    let page = Page {
        document: page.document.with_failing_eval("oops("),
        ..page
    };

    let report = page
        .bootstrapper()
        .boot(BootRequest::legacy("foo", "dhxpyt", ""))
        .await
        .unwrap();

    assert_eq!(report.assets.stylesheets, 2);
    assert_eq!(report.assets.failures.len(), 1);
    let styles = page.document.styles();
    let suite = styles.iter().find(|s| s.contains("font-face")).unwrap();
    assert!(suite.contains("url(data:font/woff;charset=utf-8;base64,d09GRg==)"));
    assert!(suite.contains("url(./fonts/b.woff2)"));
    assert!(styles.contains(&"p{}".to_string()));
}

// ================================================================
// Fatal stages
// ================================================================

#[tokio::test]
async fn test_runtime_load_failure() {
    let page = Page {
        document: MockDocument::new(),
        ..Page::new()
    };
    let err = page
        .bootstrapper()
        .boot(structured(json!({ "application": "foo" })))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), BootStage::RuntimeLoad);
    assert!(page.runtime.loaded_packages().is_empty());
}

#[tokio::test]
async fn test_install_failure_stops_boot() {
    let page = Page::new();
    page.runtime.fail_install("dhxpyt");
    let err = page
        .bootstrapper()
        .boot(structured(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), BootStage::DependencyInstall);
    assert!(page.document.evaluated_scripts().is_empty());
}

#[tokio::test]
async fn test_missing_packages_root_is_fatal() {
    let page = Page::new();
    page.runtime.set_site_packages("/nowhere");
    let err = page
        .bootstrapper()
        .boot(structured(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), BootStage::AssetInjection);
}

// ================================================================
// Diagnostics relay
// ================================================================

#[tokio::test]
async fn test_relay_installed_once_across_boots() {
    let page = Page::new();
    page.http.serve("foo/appcode/appcode.pyt", vec![1u8]);
    let relay = DiagnosticsRelay::new();
    let subscriber = tracing_subscriber::registry().with(relay.layer());
    let _guard = tracing::subscriber::set_default(subscriber);

    let handle = relay
        .install(Arc::new(page.http.clone()), "/logs")
        .expect("first install");
    page.bootstrapper()
        .with_relay(relay.clone())
        .boot(structured(json!({ "application": "foo" })))
        .await
        .unwrap();

    tracing::info!("relay marker");
    relay.detach();
    handle.await.unwrap();

    let posts = page.http.posts();
    let marker: Vec<_> = posts
        .iter()
        .filter(|(_, body)| body["message"] == "relay marker")
        .collect();
    assert_eq!(marker.len(), 1);
    assert!(posts.iter().all(|(url, _)| url == "/logs"));
}
