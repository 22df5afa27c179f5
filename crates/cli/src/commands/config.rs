//! Print the canonical boot configuration.

use anyhow::{Context, Result};
use clap::Parser;
use tincture_boot::BootConfig;

use crate::input::RequestArgs;

/// Resolve a boot request and print the result as JSON
#[derive(Parser)]
pub struct ShowConfig {
    #[command(flatten)]
    request: RequestArgs,

    /// Page origin used for the development widget host
    #[arg(long, value_name = "ORIGIN")]
    origin: Option<String>,
}

impl ShowConfig {
    pub fn execute(self) -> Result<()> {
        let request = self.request.load()?;
        let config = BootConfig::resolve(&request, self.origin.as_deref());
        let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
        println!("{}", json);
        Ok(())
    }
}
