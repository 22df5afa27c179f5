//! Per-boot session state.

use std::fmt;

use serde::Serialize;

use crate::config::BootConfig;
use crate::host::GuestRuntime;

/// Where the widget package is installed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "specifier", rename_all = "kebab-case")]
pub enum WidgetSource {
    /// `widgetSource` was configured explicitly.
    Override(String),
    /// A development wheel was reachable on the dev host.
    DevHost(String),
    /// The configured `widgetlib` specifier.
    Configured(String),
}

impl WidgetSource {
    pub fn specifier(&self) -> &str {
        match self {
            WidgetSource::Override(s) | WidgetSource::DevHost(s) | WidgetSource::Configured(s) => s,
        }
    }
}

impl fmt::Display for WidgetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WidgetSource::Override(_) => "override",
            WidgetSource::DevHost(_) => "dev-host",
            WidgetSource::Configured(_) => "configured",
        };
        write!(f, "{} ({})", self.specifier(), label)
    }
}

/// One boot attempt's context: the guest runtime and the resolved config.
///
/// Created by the runtime loader and threaded forward through every stage.
pub struct Session {
    runtime: Box<dyn GuestRuntime>,
    config: BootConfig,
    widget_source: Option<WidgetSource>,
}

impl Session {
    pub fn new(runtime: Box<dyn GuestRuntime>, config: BootConfig) -> Self {
        Self {
            runtime,
            config,
            widget_source: None,
        }
    }

    pub fn runtime(&self) -> &dyn GuestRuntime {
        self.runtime.as_ref()
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    /// The widget source, once resolved.
    pub fn widget_source(&self) -> Option<&WidgetSource> {
        self.widget_source.as_ref()
    }

    pub(crate) fn cache_widget_source(&mut self, source: WidgetSource) -> &WidgetSource {
        self.widget_source.insert(source)
    }
}
