//! Entry point discovery for inline sources without a named entry point.
use serde::Deserialize;
use tracing::warn;

use crate::guest;

/// A class defined in an inline module, with the names of its direct bases.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassDescription {
    pub name: String,
    #[serde(default)]
    pub bases: Vec<String>,
}

/// What the guest reported about one inline module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleDescription {
    pub module: String,
    /// Value of the module's `__entrypoint__` registration.
    #[serde(default)]
    pub registered: Option<String>,
    #[serde(default)]
    pub classes: Vec<ClassDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEntry {
    pub module: String,
    pub entrypoint: String,
}

/// Picks an entry point from module descriptions.
pub trait EntryDiscovery: Send + Sync {
    fn name(&self) -> &'static str;

    /// First matching entry point across `modules`, searched in order.
    fn discover(&self, modules: &[ModuleDescription]) -> Option<DiscoveredEntry>;
}

/// A module registered its entry point through `__entrypoint__`.
pub struct RegisteredEntry;

impl EntryDiscovery for RegisteredEntry {
    fn name(&self) -> &'static str {
        "registered"
    }

    fn discover(&self, modules: &[ModuleDescription]) -> Option<DiscoveredEntry> {
        modules.iter().find_map(|m| {
            let name = m.registered.as_deref()?;
            if !guest::is_identifier(name) {
                warn!("Ignoring __entrypoint__ {:?} in {}", name, m.module);
                return None;
            }
            Some(DiscoveredEntry {
                module: m.module.clone(),
                entrypoint: name.to_string(),
            })
        })
    }
}

/// Legacy search: the first class deriving directly from `MainWindow`.
pub struct MainWindowSubclass;

pub const MAIN_WINDOW_BASE: &str = "MainWindow";

impl EntryDiscovery for MainWindowSubclass {
    fn name(&self) -> &'static str {
        "main-window"
    }

    fn discover(&self, modules: &[ModuleDescription]) -> Option<DiscoveredEntry> {
        let found = modules.iter().find_map(|m| {
            m.classes
                .iter()
                .find(|c| c.bases.iter().any(|b| b == MAIN_WINDOW_BASE))
                .map(|c| DiscoveredEntry {
                    module: m.module.clone(),
                    entrypoint: c.name.clone(),
                })
        })?;
        warn!(
            "Found {}.{} by its {} base; set __entrypoint__ in the module instead",
            found.module, found.entrypoint, MAIN_WINDOW_BASE
        );
        Some(found)
    }
}

pub fn default_discoveries() -> Vec<Box<dyn EntryDiscovery>> {
    vec![Box::new(RegisteredEntry), Box::new(MainWindowSubclass)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modules() -> Vec<ModuleDescription> {
        serde_json::from_value(serde_json::json!([
            { "module": "inline_app", "registered": null, "classes": [] },
            {
                "module": "inline_app.module_1",
                "classes": [
                    { "name": "Helper", "bases": ["object"] },
                    { "name": "Window", "bases": ["MainWindow"] }
                ]
            },
            {
                "module": "inline_app.module_2",
                "registered": "Start",
                "classes": [{ "name": "Other", "bases": ["MainWindow"] }]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_registered_wins_in_default_order() {
        let modules = modules();
        let found = default_discoveries()
            .iter()
            .find_map(|d| d.discover(&modules));
        assert_eq!(
            found,
            Some(DiscoveredEntry {
                module: "inline_app.module_2".into(),
                entrypoint: "Start".into(),
            })
        );
    }

    #[test]
    fn test_main_window_takes_first_subclass() {
        let found = MainWindowSubclass.discover(&modules()).unwrap();
        assert_eq!(found.module, "inline_app.module_1");
        assert_eq!(found.entrypoint, "Window");
    }

    #[test]
    fn test_invalid_registration_is_ignored() {
        let mut modules = modules();
        modules[2].registered = Some("Start()".into());
        assert_eq!(RegisteredEntry.discover(&modules), None);
    }

    #[test]
    fn test_nothing_to_discover() {
        let modules = vec![ModuleDescription {
            module: "inline_app".into(),
            registered: None,
            classes: vec![ClassDescription {
                name: "MainWindow".into(),
                bases: vec!["object".into()],
            }],
        }];
        assert!(default_discoveries().iter().all(|d| d.discover(&modules).is_none()));
    }
}
