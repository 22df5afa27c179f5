//! Bundle installed-package assets into a static HTML fragment.
//!
//! Runs the same injection pass a boot runs in the page, against a local
//! copy of the installed packages: scripts first, then stylesheets with
//! their fonts inlined.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tincture_boot::config::DEFAULT_MATERIAL_ICONS_URL;
use tincture_boot::{AssetInjector, AssetReport, display_chain};
use tincture_host_native::{DiskFs, StaticDocument};

/// Render the assets of an installed-packages directory
#[derive(Parser)]
pub struct BundleAssets {
    /// Installed-packages directory (e.g. a site-packages copy)
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Write the fragment here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Prepend a stylesheet link to the icon font
    #[arg(long)]
    icons: bool,

    /// Icon font stylesheet URL
    #[arg(long, value_name = "URL", default_value = DEFAULT_MATERIAL_ICONS_URL)]
    icons_url: String,
}

impl BundleAssets {
    pub fn execute(self) -> Result<()> {
        if !self.dir.is_dir() {
            anyhow::bail!("Not a directory: {}", self.dir.display());
        }

        let (html, report) = bundle(&self.dir, self.icons.then_some(self.icons_url.as_str()))?;

        match &self.out {
            Some(path) => {
                std::fs::write(path, &html)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("{} {}", style("Wrote").bold().green(), path.display());
            }
            None => print!("{}", html),
        }

        eprintln!(
            "{} {} script(s), {} stylesheet(s), {} font reference(s)",
            style("Bundled").bold().cyan(),
            report.scripts,
            report.stylesheets,
            report.fonts_inlined
        );
        for failure in &report.failures {
            eprintln!(
                "  {} {}: {}",
                style("skipped").yellow(),
                failure.path,
                failure.error
            );
        }
        Ok(())
    }
}

fn bundle(dir: &std::path::Path, icons_url: Option<&str>) -> Result<(String, AssetReport)> {
    let fs = DiskFs::new(dir);
    let document = StaticDocument::new();
    let injector = AssetInjector::new(&document);

    if let Some(url) = icons_url {
        injector
            .link_stylesheet(url)
            .map_err(|e| anyhow::anyhow!(display_chain(&e)))?;
    }
    let report = injector
        .inject_from(&fs, "/")
        .map_err(|e| anyhow::anyhow!(display_chain(&e)))
        .with_context(|| format!("Failed to scan {}", dir.display()))?;

    Ok((document.render_html(), report))
}
