use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::discovery::{EntryDiscovery, ModuleDescription, default_discoveries};
use super::{LaunchAttempt, LaunchContext, LaunchError, LaunchReport, LaunchStrategy};
use crate::guest;
use crate::host::{GuestFs, GuestRuntime, paths};

/// Package the inline sources are written into, below the guest home directory.
pub const INLINE_PACKAGE: &str = "inline_app";

const PACKAGE_INIT: &str = "__init__.py";

/// File name for the inline element at `index`.
///
/// `data-filename` wins; otherwise the first element is the package body and
/// later ones become `module_<index>.py`. A name without an extension gets
/// `.py`; names that would escape the package or cannot be imported are
/// rejected.
pub fn inline_filename(index: usize, declared: Option<&str>) -> Result<String, LaunchError> {
    let Some(declared) = declared.map(str::trim) else {
        return Ok(if index == 0 {
            PACKAGE_INIT.to_string()
        } else {
            format!("module_{index}.py")
        });
    };

    let invalid = || LaunchError::InvalidFilename(declared.to_string());
    if declared.is_empty()
        || declared.contains('/')
        || declared.contains('\\')
        || declared.contains("..")
    {
        return Err(invalid());
    }

    let file = if declared.ends_with(".py") {
        declared.to_string()
    } else {
        format!("{declared}.py")
    };
    let stem = file.trim_end_matches(".py");
    if guest::is_identifier(stem) {
        Ok(file)
    } else {
        Err(invalid())
    }
}

/// Importable module name for an inline file.
fn module_name(file: &str) -> String {
    if file == PACKAGE_INIT {
        INLINE_PACKAGE.to_string()
    } else {
        format!("{}.{}", INLINE_PACKAGE, file.trim_end_matches(".py"))
    }
}

#[derive(Deserialize)]
struct CallOutcome {
    module: Option<String>,
}

#[derive(Deserialize)]
struct Inspection {
    modules: Vec<ModuleDescription>,
}

/// Runs the source fragments embedded in the document.
pub struct InlineLaunch {
    discoveries: Vec<Box<dyn EntryDiscovery>>,
}

impl InlineLaunch {
    pub fn new() -> Self {
        Self::with_discoveries(default_discoveries())
    }

    pub fn with_discoveries(discoveries: Vec<Box<dyn EntryDiscovery>>) -> Self {
        Self { discoveries }
    }

    /// Write every inline element into the package; returns module names in search order.
    fn write_sources(
        &self,
        ctx: &LaunchContext<'_>,
        runtime: &dyn GuestRuntime,
    ) -> Result<Option<Vec<String>>, LaunchError> {
        let elements = ctx.host.document.query_all(&ctx.config().inline_selector);
        if elements.is_empty() {
            return Ok(None);
        }

        let fs = runtime.fs();
        let package_dir = paths::join(&runtime.home_dir(), INLINE_PACKAGE);
        fs.create_dir_all(&package_dir)
            .map_err(|source| LaunchError::WriteSource {
                path: package_dir.clone(),
                source,
            })?;

        let mut files: Vec<String> = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let file = inline_filename(index, element.attribute("data-filename"))?;
            if files.contains(&file) {
                warn!("Inline source {} declared twice; the later one wins", file);
            } else {
                files.push(file.clone());
            }
            write(fs, &paths::join(&package_dir, &file), &element.text)?;
        }

        if !files.iter().any(|f| f == PACKAGE_INIT) {
            write(fs, &paths::join(&package_dir, PACKAGE_INIT), "")?;
        }
        debug!("Wrote {} inline source(s) to {}", files.len(), package_dir);

        let mut modules = vec![INLINE_PACKAGE.to_string()];
        modules.extend(
            files
                .iter()
                .filter(|f| f.as_str() != PACKAGE_INIT)
                .map(|f| module_name(f)),
        );
        Ok(Some(modules))
    }

    /// Call `entrypoint` by name. `Ok(None)` when no module defines it.
    async fn call_named(
        &self,
        runtime: &dyn GuestRuntime,
        modules: &[String],
        entrypoint: &str,
    ) -> Result<Option<String>, LaunchError> {
        let output = runtime
            .run_async(&guest::call_by_name(modules, entrypoint))
            .await
            .map_err(|source| {
                error!("Entry point {} raised: {}", entrypoint, source);
                LaunchError::Invoke {
                    entrypoint: entrypoint.to_string(),
                    source,
                }
            })?;
        Ok(parse_output::<CallOutcome>(&output)?.module)
    }

    async fn discover_and_call(
        &self,
        runtime: &dyn GuestRuntime,
        modules: &[String],
    ) -> Result<LaunchReport, LaunchError> {
        let output = runtime
            .run_async(&guest::inspect(modules))
            .await
            .map_err(LaunchError::Inspect)?;
        let inspection: Inspection = parse_output(&output)?;

        for discovery in &self.discoveries {
            let Some(found) = discovery.discover(&inspection.modules) else {
                debug!("{} discovery found nothing", discovery.name());
                continue;
            };
            info!(
                "Entry point {}.{} found by {} discovery",
                found.module,
                found.entrypoint,
                discovery.name()
            );
            if !guest::is_module_path(&found.module) {
                return Err(LaunchError::InvalidIdentifier {
                    kind: "module",
                    value: found.module,
                });
            }
            if !guest::is_identifier(&found.entrypoint) {
                return Err(LaunchError::InvalidIdentifier {
                    kind: "entry point",
                    value: found.entrypoint,
                });
            }
            runtime
                .run_async(&guest::import_and_call(&found.module, &found.entrypoint))
                .await
                .map_err(|source| {
                    error!("Entry point {} raised: {}", found.entrypoint, source);
                    LaunchError::Invoke {
                        entrypoint: found.entrypoint.clone(),
                        source,
                    }
                })?;
            return Ok(LaunchReport {
                strategy: self.name().to_string(),
                entrypoint: found.entrypoint,
                module: found.module,
                discovery: Some(discovery.name().to_string()),
            });
        }

        Err(LaunchError::NoEntryPoint)
    }
}

impl Default for InlineLaunch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LaunchStrategy for InlineLaunch {
    fn name(&self) -> &'static str {
        "inline"
    }

    async fn launch(&self, ctx: &LaunchContext<'_>) -> Result<LaunchAttempt, LaunchError> {
        let runtime = ctx.session.runtime();
        let Some(modules) = self.write_sources(ctx, runtime)? else {
            return Ok(LaunchAttempt::NoSource);
        };

        let config = ctx.config();
        let named = match config.entrypoint.as_deref() {
            Some(entrypoint) if guest::is_identifier(entrypoint) => Some(entrypoint),
            Some(entrypoint) if config.entrypoint_explicit => {
                return Err(LaunchError::InvalidIdentifier {
                    kind: "entry point",
                    value: entrypoint.to_string(),
                });
            }
            Some(entrypoint) => {
                debug!(
                    "Default entry point {} is not an identifier; discovering",
                    entrypoint
                );
                None
            }
            None => None,
        };

        if let Some(entrypoint) = named {
            match self.call_named(runtime, &modules, entrypoint).await? {
                Some(module) => {
                    return Ok(LaunchAttempt::Launched(LaunchReport {
                        strategy: self.name().to_string(),
                        entrypoint: entrypoint.to_string(),
                        module,
                        discovery: None,
                    }));
                }
                None if config.entrypoint_explicit => {
                    return Err(LaunchError::EntryNotFound {
                        entrypoint: entrypoint.to_string(),
                        modules: modules.join(", "),
                    });
                }
                None => debug!(
                    "Default entry point {} not defined inline; discovering",
                    entrypoint
                ),
            }
        }

        let report = self.discover_and_call(runtime, &modules).await?;
        Ok(LaunchAttempt::Launched(report))
    }
}

fn write(fs: &dyn GuestFs, path: &str, text: &str) -> Result<(), LaunchError> {
    fs.write(path, text.as_bytes())
        .map_err(|source| LaunchError::WriteSource {
            path: path.to_string(),
            source,
        })
}

fn parse_output<T: DeserializeOwned>(output: &str) -> Result<T, LaunchError> {
    serde_json::from_str(output.trim()).map_err(|source| LaunchError::GuestOutput {
        output: output.to_string(),
        source,
    })
}
