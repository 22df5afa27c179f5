//! Boot request input shared by commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tincture_boot::{BootRequest, ConfigOverrides};

#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// Structured boot config (JSON object)
    #[arg(long, value_name = "FILE", conflicts_with = "legacy")]
    pub json: Option<PathBuf>,

    /// Legacy positional call: application, widget package, entry point
    #[arg(long, num_args = 3, value_names = ["APP", "WIDGETLIB", "ENTRY"])]
    pub legacy: Option<Vec<String>>,
}

impl RequestArgs {
    /// Command-line input layered over `TINCTURE_*` environment overrides.
    pub fn load(&self) -> Result<BootRequest> {
        let input = self.input_overrides()?;
        Ok(BootRequest::Structured(
            ConfigOverrides::from_env().overlay(input),
        ))
    }

    fn input_overrides(&self) -> Result<ConfigOverrides> {
        if let Some(path) = &self.json {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;
            return Ok(ConfigOverrides::from_json(&value));
        }

        if let Some(values) = &self.legacy {
            let [application, widgetlib, entrypoint] = values.as_slice() else {
                anyhow::bail!("--legacy takes exactly three values");
            };
            return Ok(
                BootRequest::legacy(application.as_str(), widgetlib.as_str(), entrypoint.as_str())
                    .into_overrides(),
            );
        }

        Ok(ConfigOverrides::default())
    }
}
