//! Boot configuration: call conventions, overrides, and the canonical record.
//!
//! Callers hand the orchestrator a [`BootRequest`], either a structured set of
//! [`ConfigOverrides`] or the legacy positional triple. [`BootConfig::resolve`]
//! merges it over the documented defaults. Resolution is pure: the same request
//! and page origin always yield the same config.
use std::env;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const DEFAULT_WIDGETLIB: &str = "dhxpyt";
pub const DEFAULT_PYODIDE_BASE_URL: &str = "https://cdn.jsdelivr.net/pyodide/v0.27.0/full/";
pub const DEFAULT_MATERIAL_ICONS_URL: &str =
    "https://fonts.googleapis.com/icon?family=Material+Icons";
pub const DEFAULT_LOG_ENDPOINT: &str = "/logs";
pub const DEFAULT_INLINE_SELECTOR: &str = r#"script[type="text/python"]"#;
pub const DEFAULT_LIBS_SELECTOR: &str = "#micropip-libs";
pub const FALLBACK_DEV_WIDGET_HOST: &str = "http://0.0.0.0:8070";
pub const DEFAULT_DEV_WHEEL_VERSION: &str = "99.99.99";
pub const DEFAULT_AUX_PACKAGES: &[&str] = &["python-dotenv"];

/// How the application source is located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Prebuilt archive fetched from the server.
    Package,
    /// Source fragments embedded in the document.
    Inline,
    /// Packaged when an application is configured, falling back to inline.
    #[default]
    Auto,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "package" | "packaged" => Ok(Self::Package),
            "inline" => Ok(Self::Inline),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown execution mode {other:?}")),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionMode::Package => "package",
            ExecutionMode::Inline => "inline",
            ExecutionMode::Auto => "auto",
        };
        write!(f, "{}", label)
    }
}

/// Caller-supplied configuration fields. Unset fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverrides {
    pub application: Option<String>,
    pub entrypoint: Option<String>,
    pub widgetlib: Option<String>,
    pub widget_source: Option<String>,
    pub mode: Option<ExecutionMode>,
    pub pyodide_base_url: Option<String>,
    pub load_material_icons: Option<bool>,
    pub material_icons_url: Option<String>,
    pub enable_backend_logging: Option<bool>,
    pub log_endpoint: Option<String>,
    pub inline_selector: Option<String>,
    pub libs_selector: Option<String>,
    pub dev_widget_host: Option<String>,
    pub dev_wheel_version: Option<String>,
    pub aux_packages: Option<Vec<String>>,
}

const KNOWN_FIELDS: &[&str] = &[
    "application",
    "entrypoint",
    "widgetlib",
    "widgetSource",
    "mode",
    "pyodideBaseUrl",
    "loadMaterialIcons",
    "materialIconsUrl",
    "enableBackendLogging",
    "logEndpoint",
    "inlineSelector",
    "libsSelector",
    "devWidgetHost",
    "devWheelVersion",
    "auxPackages",
];

impl ConfigOverrides {
    /// Parse a structured config object leniently.
    ///
    /// Malformed input never fails: a non-object yields all defaults and a
    /// field of the wrong type is logged and left unset.
    pub fn from_json(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            if !value.is_null() {
                warn!("Ignoring boot config: expected an object, got {}", value);
            }
            return Self::default();
        };

        for key in obj.keys() {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                debug!("Ignoring unknown boot config field {:?}", key);
            }
        }

        let mode = field::<String>(obj, "mode").and_then(|raw| match raw.parse() {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("{}; using auto", e);
                None
            }
        });

        Self {
            application: field(obj, "application"),
            entrypoint: field(obj, "entrypoint"),
            widgetlib: field(obj, "widgetlib"),
            widget_source: field(obj, "widgetSource"),
            mode,
            pyodide_base_url: field(obj, "pyodideBaseUrl"),
            load_material_icons: field(obj, "loadMaterialIcons"),
            material_icons_url: field(obj, "materialIconsUrl"),
            enable_backend_logging: field(obj, "enableBackendLogging"),
            log_endpoint: field(obj, "logEndpoint"),
            inline_selector: field(obj, "inlineSelector"),
            libs_selector: field(obj, "libsSelector"),
            dev_widget_host: field(obj, "devWidgetHost"),
            dev_wheel_version: field(obj, "devWheelVersion"),
            aux_packages: field(obj, "auxPackages"),
        }
    }

    /// Construct overrides from process environment variables.
    ///
    /// Environment variables:
    /// - `TINCTURE_APPLICATION`, `TINCTURE_ENTRYPOINT`, `TINCTURE_WIDGETLIB`
    /// - `TINCTURE_WIDGET_SOURCE`, `TINCTURE_MODE` (`package`/`inline`/`auto`)
    /// - `TINCTURE_PYODIDE_BASE_URL`, `TINCTURE_LOAD_MATERIAL_ICONS`, `TINCTURE_MATERIAL_ICONS_URL`
    /// - `TINCTURE_ENABLE_BACKEND_LOGGING`, `TINCTURE_LOG_ENDPOINT`
    /// - `TINCTURE_INLINE_SELECTOR`, `TINCTURE_LIBS_SELECTOR`
    /// - `TINCTURE_DEV_WIDGET_HOST`, `TINCTURE_DEV_WHEEL_VERSION`
    /// - `TINCTURE_AUX_PACKAGES` (comma-separated)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ConfigOverrides::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse = |key: &str| -> Option<bool> {
            let raw = read(key)?;
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => {
                    warn!("Ignoring {}={:?}: expected a boolean", key, raw);
                    None
                }
            }
        };

        Self {
            application: read("TINCTURE_APPLICATION"),
            entrypoint: read("TINCTURE_ENTRYPOINT"),
            widgetlib: read("TINCTURE_WIDGETLIB"),
            widget_source: read("TINCTURE_WIDGET_SOURCE"),
            mode: read("TINCTURE_MODE").and_then(|raw| match raw.parse() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    warn!("Ignoring TINCTURE_MODE={:?}: {}", raw, e);
                    None
                }
            }),
            pyodide_base_url: read("TINCTURE_PYODIDE_BASE_URL"),
            load_material_icons: parse("TINCTURE_LOAD_MATERIAL_ICONS"),
            material_icons_url: read("TINCTURE_MATERIAL_ICONS_URL"),
            enable_backend_logging: parse("TINCTURE_ENABLE_BACKEND_LOGGING"),
            log_endpoint: read("TINCTURE_LOG_ENDPOINT"),
            inline_selector: read("TINCTURE_INLINE_SELECTOR"),
            libs_selector: read("TINCTURE_LIBS_SELECTOR"),
            dev_widget_host: read("TINCTURE_DEV_WIDGET_HOST"),
            dev_wheel_version: read("TINCTURE_DEV_WHEEL_VERSION"),
            aux_packages: read("TINCTURE_AUX_PACKAGES").map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        }
    }

    /// Layer `top` over `self`; fields set in `top` win.
    pub fn overlay(self, top: ConfigOverrides) -> Self {
        Self {
            application: top.application.or(self.application),
            entrypoint: top.entrypoint.or(self.entrypoint),
            widgetlib: top.widgetlib.or(self.widgetlib),
            widget_source: top.widget_source.or(self.widget_source),
            mode: top.mode.or(self.mode),
            pyodide_base_url: top.pyodide_base_url.or(self.pyodide_base_url),
            load_material_icons: top.load_material_icons.or(self.load_material_icons),
            material_icons_url: top.material_icons_url.or(self.material_icons_url),
            enable_backend_logging: top.enable_backend_logging.or(self.enable_backend_logging),
            log_endpoint: top.log_endpoint.or(self.log_endpoint),
            inline_selector: top.inline_selector.or(self.inline_selector),
            libs_selector: top.libs_selector.or(self.libs_selector),
            dev_widget_host: top.dev_widget_host.or(self.dev_widget_host),
            dev_wheel_version: top.dev_wheel_version.or(self.dev_wheel_version),
            aux_packages: top.aux_packages.or(self.aux_packages),
        }
    }
}

fn field<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> Option<T> {
    let value = obj.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Ignoring boot config field {:?}: {}", key, e);
            None
        }
    }
}

/// The two accepted boot call conventions.
#[derive(Debug, Clone, PartialEq)]
pub enum BootRequest {
    Structured(ConfigOverrides),
    /// `(application, widgetlib, entrypoint)`.
    Legacy {
        application: String,
        widgetlib: String,
        entrypoint: String,
    },
}

impl BootRequest {
    pub fn legacy(
        application: impl Into<String>,
        widgetlib: impl Into<String>,
        entrypoint: impl Into<String>,
    ) -> Self {
        Self::Legacy {
            application: application.into(),
            widgetlib: widgetlib.into(),
            entrypoint: entrypoint.into(),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        Self::Structured(ConfigOverrides::from_json(value))
    }

    /// The request as plain overrides; the legacy triple sets its three fields.
    pub fn into_overrides(self) -> ConfigOverrides {
        match self {
            BootRequest::Structured(overrides) => overrides,
            BootRequest::Legacy {
                application,
                widgetlib,
                entrypoint,
            } => ConfigOverrides {
                application: Some(application),
                widgetlib: Some(widgetlib),
                entrypoint: Some(entrypoint),
                ..ConfigOverrides::default()
            },
        }
    }
}

impl From<ConfigOverrides> for BootRequest {
    fn from(overrides: ConfigOverrides) -> Self {
        BootRequest::Structured(overrides)
    }
}

/// Canonical boot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootConfig {
    pub application: Option<String>,
    /// Never `Some("")`; defaults to the application identifier.
    pub entrypoint: Option<String>,
    /// Whether `entrypoint` was supplied rather than defaulted.
    #[serde(skip)]
    pub entrypoint_explicit: bool,
    pub widgetlib: String,
    pub widget_source: Option<String>,
    pub mode: ExecutionMode,
    /// Always ends with `/`.
    pub pyodide_base_url: String,
    pub load_material_icons: bool,
    pub material_icons_url: String,
    pub enable_backend_logging: bool,
    pub log_endpoint: String,
    pub inline_selector: String,
    pub libs_selector: String,
    /// No trailing `/`.
    pub dev_widget_host: String,
    pub dev_wheel_version: String,
    pub aux_packages: Vec<String>,
}

impl BootConfig {
    /// Merge a request over the defaults.
    ///
    /// `page_origin` is the hosting page's origin, used as the development
    /// widget host when none is configured.
    pub fn resolve(request: &BootRequest, page_origin: Option<&str>) -> Self {
        let o = request.clone().into_overrides();

        let application = non_empty(o.application);
        let explicit_entrypoint = non_empty(o.entrypoint);
        let entrypoint_explicit = explicit_entrypoint.is_some();
        let entrypoint = explicit_entrypoint.or_else(|| application.clone());

        let mut pyodide_base_url =
            non_empty(o.pyodide_base_url).unwrap_or_else(|| DEFAULT_PYODIDE_BASE_URL.to_string());
        if !pyodide_base_url.ends_with('/') {
            pyodide_base_url.push('/');
        }

        let dev_widget_host = non_empty(o.dev_widget_host)
            .or_else(|| {
                page_origin
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty() && *origin != "null")
                    .map(str::to_string)
            })
            .unwrap_or_else(|| FALLBACK_DEV_WIDGET_HOST.to_string())
            .trim_end_matches('/')
            .to_string();

        let enable_backend_logging = o.enable_backend_logging.unwrap_or(application.is_some());

        Self {
            entrypoint,
            entrypoint_explicit,
            widgetlib: non_empty(o.widgetlib).unwrap_or_else(|| DEFAULT_WIDGETLIB.to_string()),
            widget_source: non_empty(o.widget_source),
            mode: o.mode.unwrap_or_default(),
            pyodide_base_url,
            load_material_icons: o.load_material_icons.unwrap_or(true),
            material_icons_url: non_empty(o.material_icons_url)
                .unwrap_or_else(|| DEFAULT_MATERIAL_ICONS_URL.to_string()),
            enable_backend_logging,
            log_endpoint: non_empty(o.log_endpoint)
                .unwrap_or_else(|| DEFAULT_LOG_ENDPOINT.to_string()),
            inline_selector: non_empty(o.inline_selector)
                .unwrap_or_else(|| DEFAULT_INLINE_SELECTOR.to_string()),
            libs_selector: non_empty(o.libs_selector)
                .unwrap_or_else(|| DEFAULT_LIBS_SELECTOR.to_string()),
            dev_widget_host,
            dev_wheel_version: non_empty(o.dev_wheel_version)
                .unwrap_or_else(|| DEFAULT_DEV_WHEEL_VERSION.to_string()),
            aux_packages: o.aux_packages.unwrap_or_else(|| {
                DEFAULT_AUX_PACKAGES.iter().map(|s| s.to_string()).collect()
            }),
            application,
        }
    }

    /// Distribution name of the widget package, normalized for wheel file names.
    ///
    /// `"dhx-pyt[extra]>=1.0"` → `"dhx_pyt"`.
    pub fn widget_package_name(&self) -> String {
        let specifier = self.widgetlib.trim();
        let name = if specifier.ends_with(".whl") {
            let file = specifier.rsplit('/').next().unwrap_or(specifier);
            file.split('-').next().unwrap_or(file)
        } else {
            let end = specifier
                .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';' | '@' | ' '))
                .unwrap_or(specifier.len());
            &specifier[..end]
        };
        name.trim().replace(['-', '.'], "_")
    }
}

impl From<&BootConfig> for ConfigOverrides {
    fn from(config: &BootConfig) -> Self {
        Self {
            application: config.application.clone(),
            entrypoint: config
                .entrypoint
                .clone()
                .filter(|_| config.entrypoint_explicit),
            widgetlib: Some(config.widgetlib.clone()),
            widget_source: config.widget_source.clone(),
            mode: Some(config.mode),
            pyodide_base_url: Some(config.pyodide_base_url.clone()),
            load_material_icons: Some(config.load_material_icons),
            material_icons_url: Some(config.material_icons_url.clone()),
            enable_backend_logging: Some(config.enable_backend_logging),
            log_endpoint: Some(config.log_endpoint.clone()),
            inline_selector: Some(config.inline_selector.clone()),
            libs_selector: Some(config.libs_selector.clone()),
            dev_widget_host: Some(config.dev_widget_host.clone()),
            dev_wheel_version: Some(config.dev_wheel_version.clone()),
            aux_packages: Some(config.aux_packages.clone()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
