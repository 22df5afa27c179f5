//! A document without a scripting engine.
//!
//! Scripts and styles handed to it are collected in injection order and can be
//! rendered as an HTML fragment for a static page.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tincture_boot::host::{HostDocument, HostElement, HostError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injected {
    Script(String),
    Style(String),
    StylesheetLink(String),
}

#[derive(Default)]
struct State {
    injected: Vec<Injected>,
    errors: Vec<(String, String)>,
}

#[derive(Default)]
pub struct StaticDocument {
    origin: Option<String>,
    elements: HashMap<String, Vec<HostElement>>,
    state: Mutex<State>,
}

impl StaticDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_element(mut self, selector: impl Into<String>, element: HostElement) -> Self {
        self.elements
            .entry(selector.into())
            .or_default()
            .push(element);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn injected(&self) -> Vec<Injected> {
        self.lock().injected.clone()
    }

    pub fn rendered_errors(&self) -> Vec<(String, String)> {
        self.lock().errors.clone()
    }

    /// Everything injected so far as `<link>`, `<script>`, and `<style>` elements.
    pub fn render_html(&self) -> String {
        let mut html = String::new();
        for item in self.lock().injected.iter() {
            match item {
                Injected::StylesheetLink(href) => {
                    html.push_str(&format!(
                        "<link rel=\"stylesheet\" href=\"{}\">\n",
                        escape_attribute(href)
                    ));
                }
                Injected::Script(source) => {
                    html.push_str("<script>\n");
                    html.push_str(&escape_raw_text(source, "script"));
                    html.push_str("\n</script>\n");
                }
                Injected::Style(css) => {
                    html.push_str("<style>\n");
                    html.push_str(&escape_raw_text(css, "style"));
                    html.push_str("\n</style>\n");
                }
            }
        }
        html
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// Keep raw text from closing its element early.
fn escape_raw_text(text: &str, tag: &str) -> String {
    text.replace(&format!("</{tag}"), &format!("<\\/{tag}"))
}

#[async_trait]
impl HostDocument for StaticDocument {
    fn origin(&self) -> Option<String> {
        self.origin.clone()
    }

    fn query_all(&self, selector: &str) -> Vec<HostElement> {
        self.elements.get(selector).cloned().unwrap_or_default()
    }

    fn has_global(&self, _name: &str) -> bool {
        false
    }

    async fn load_script(&self, url: &str) -> Result<(), HostError> {
        Err(HostError::ScriptLoad {
            url: url.to_string(),
            message: "static documents cannot run scripts".to_string(),
        })
    }

    fn eval_script(&self, source: &str) -> Result<(), HostError> {
        self.lock().injected.push(Injected::Script(source.to_string()));
        Ok(())
    }

    fn append_style(&self, css: &str) -> Result<(), HostError> {
        self.lock().injected.push(Injected::Style(css.to_string()));
        Ok(())
    }

    fn append_stylesheet_link(&self, href: &str) -> Result<(), HostError> {
        self.lock()
            .injected
            .push(Injected::StylesheetLink(href.to_string()));
        Ok(())
    }

    fn render_error(&self, container_id: &str, message: &str) {
        tracing::error!("#{}: {}", container_id, message);
        self.lock()
            .errors
            .push((container_id.to_string(), message.to_string()));
    }
}
