//! Developer tooling for tincture boot configurations.
//!
//! Run with: `tincture <command>`

mod commands;
mod input;

use anyhow::Result;
use clap::Parser;
use commands::{BundleAssets, Preflight, ShowConfig};
use tincture_boot::DiagnosticsRelay;
use tincture_host_native::{LoggingOptions, init_logging};

/// Inspect and prepare tincture application boots
#[derive(Parser)]
#[command(name = "tincture")]
#[command(about = "Developer tools for tincture boot configurations", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write logs into this directory
    #[arg(long, global = true, value_name = "DIR", env = "TINCTURE_LOG_DIR")]
    log_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Print the resolved boot configuration
    Config(ShowConfig),

    /// Check a server for everything a boot will fetch
    Preflight(Preflight),

    /// Render installed-package assets as an HTML fragment
    BundleAssets(BundleAssets),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (for TINCTURE_* overrides)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let relay = DiagnosticsRelay::new();
    let options = LoggingOptions {
        default_directive: "warn".to_string(),
        log_dir: cli.log_dir.clone(),
        ..LoggingOptions::default()
    };
    let _guard = init_logging(&options, &relay)?;

    match cli.command {
        Command::Config(cmd) => cmd.execute(),
        Command::Preflight(cmd) => cmd.execute(&relay).await,
        Command::BundleAssets(cmd) => cmd.execute(),
    }
}
