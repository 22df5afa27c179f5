//! Check a server for the resources a boot will request.
//!
//! Nothing is installed or executed; every probe is a HEAD request except the
//! optional log-sink check, which POSTs one record.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tincture_boot::install::{dev_wheel_url, resolve_widget_source};
use tincture_boot::launch::archive_url;
use tincture_boot::{BootConfig, DiagnosticsRelay, HttpClient, LogRecord, WidgetSource};
use tincture_host_native::ReqwestHttpClient;

use crate::input::RequestArgs;

/// Probe the server hosting the page
#[derive(Parser)]
pub struct Preflight {
    /// Page URL the boot would run on (relative URLs resolve against it)
    #[arg(long, value_name = "URL")]
    base: String,

    #[command(flatten)]
    request: RequestArgs,

    /// POST a test record to the configured log sink
    #[arg(long)]
    check_log_sink: bool,

    /// Mirror this command's own logs to the log sink while it runs
    #[arg(long)]
    relay_logs: bool,
}

struct Probe {
    label: &'static str,
    target: String,
    ok: bool,
    required: bool,
}

impl Preflight {
    pub async fn execute(self, relay: &DiagnosticsRelay) -> Result<()> {
        let client = ReqwestHttpClient::with_base(&self.base)
            .with_context(|| format!("Invalid page URL {}", self.base))?;
        let request = self.request.load()?;
        let config = BootConfig::resolve(&request, client.origin().as_deref());
        let http: Arc<dyn HttpClient> = Arc::new(client);

        let delivery = if self.relay_logs {
            relay.install(http.clone(), config.log_endpoint.clone())
        } else {
            None
        };

        let mut probes = Vec::new();

        let engine = format!("{}pyodide.js", config.pyodide_base_url);
        probes.push(Probe {
            label: "engine script",
            ok: probe(http.as_ref(), &engine).await,
            target: engine,
            required: true,
        });

        if let Some(url) = dev_wheel_url(&config) {
            probes.push(Probe {
                label: "dev widget wheel",
                ok: probe(http.as_ref(), &url).await,
                target: url,
                required: false,
            });
        }

        if let Some(application) = &config.application {
            let url = archive_url(application);
            probes.push(Probe {
                label: "application archive",
                ok: probe(http.as_ref(), &url).await,
                target: url,
                required: false,
            });
        }

        if self.check_log_sink {
            let record = LogRecord::now("info", "tincture preflight");
            let body = serde_json::to_value(&record).context("Failed to encode log record")?;
            let ok = match http.post_json(&config.log_endpoint, &body).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Log sink rejected test record: {}", e);
                    false
                }
            };
            probes.push(Probe {
                label: "log sink",
                target: config.log_endpoint.clone(),
                ok,
                required: false,
            });
        }

        let source = resolve_widget_source(http.as_ref(), &config).await;

        println!("{} {}", style("Page:").bold().cyan(), self.base);
        println!("{} {}", style("Mode:").bold().cyan(), config.mode);
        println!(
            "{} {}",
            style("Application:").bold().cyan(),
            config.application.as_deref().unwrap_or("(inline only)")
        );
        println!(
            "{} {}",
            style("Widget source:").bold().cyan(),
            describe(&source)
        );
        println!();

        for p in &probes {
            let mark = if p.ok {
                style(format!("{:<8}", "ok")).green()
            } else if p.required {
                style(format!("{:<8}", "missing")).red()
            } else {
                style(format!("{:<8}", "missing")).yellow()
            };
            println!("  {:<20} {} {}", p.label, mark, p.target);
        }

        if let Some(handle) = delivery {
            relay.detach();
            let _ = handle.await;
        }

        if probes.iter().any(|p| p.required && !p.ok) {
            anyhow::bail!("required resources are unreachable");
        }
        Ok(())
    }
}

async fn probe(http: &dyn HttpClient, url: &str) -> bool {
    tincture_boot::host::url_exists(http, url).await
}

fn describe(source: &WidgetSource) -> String {
    match source {
        WidgetSource::Override(s) => format!("{} (explicit override)", s),
        WidgetSource::DevHost(s) => format!("{} (development host)", s),
        WidgetSource::Configured(s) => format!("{} (package index)", s),
    }
}
