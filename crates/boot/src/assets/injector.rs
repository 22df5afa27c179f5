use serde::Serialize;
use tracing::{debug, info, warn};

use super::AssetError;
use super::fonts::inline_fonts;
use crate::error::display_chain;
use crate::host::{GuestFs, HostDocument, paths};
use crate::session::Session;

/// Asset categories the injector handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Script,
    Stylesheet,
}

impl AssetKind {
    pub fn from_path(path: &str) -> Option<Self> {
        match paths::extension(path)?.as_str() {
            "js" => Some(Self::Script),
            "css" => Some(Self::Stylesheet),
            _ => None,
        }
    }
}

/// A discovered asset with its content. Consumed as soon as it is injected.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub path: String,
    pub kind: AssetKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of the asset stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetReport {
    pub scripts: usize,
    pub stylesheets: usize,
    pub fonts_inlined: usize,
    pub failures: Vec<AssetFailure>,
}

impl AssetReport {
    fn record_failure(&mut self, path: &str, error: &AssetError) {
        let error = display_chain(error);
        warn!("Skipping asset {}: {}", path, error);
        self.failures.push(AssetFailure {
            path: path.to_string(),
            error,
        });
    }
}

/// Injects package assets into the host document.
pub struct AssetInjector<'a> {
    document: &'a dyn HostDocument,
}

impl<'a> AssetInjector<'a> {
    pub fn new(document: &'a dyn HostDocument) -> Self {
        Self { document }
    }

    /// Inject everything under the session runtime's installed-packages root.
    pub fn inject_session(&self, session: &Session) -> Result<AssetReport, AssetError> {
        let runtime = session.runtime();
        let root = runtime.site_packages().map_err(|source| AssetError::Enumerate {
            root: "<site-packages>".to_string(),
            source,
        })?;
        self.inject_from(runtime.fs(), &root)
    }

    /// Inject every script, then every stylesheet, found below `root`.
    ///
    /// Only a failure to enumerate `root` is returned; per-file failures are
    /// logged and collected in the report.
    pub fn inject_from(&self, fs: &dyn GuestFs, root: &str) -> Result<AssetReport, AssetError> {
        let mut files = fs.walk_files(root).map_err(|source| AssetError::Enumerate {
            root: root.to_string(),
            source,
        })?;
        files.sort();

        let mut report = AssetReport::default();
        let (scripts, stylesheets): (Vec<_>, Vec<_>) = files
            .iter()
            .filter_map(|path| AssetKind::from_path(path).map(|kind| (path, kind)))
            .partition(|(_, kind)| *kind == AssetKind::Script);

        for (path, kind) in scripts.into_iter().chain(stylesheets) {
            let record = match read_record(fs, path, kind) {
                Ok(record) => record,
                Err(e) => {
                    report.record_failure(path, &e);
                    continue;
                }
            };
            match self.inject(fs, record) {
                Ok(fonts) => {
                    match kind {
                        AssetKind::Script => report.scripts += 1,
                        AssetKind::Stylesheet => report.stylesheets += 1,
                    }
                    report.fonts_inlined += fonts;
                }
                Err(e) => report.record_failure(path, &e),
            }
        }

        info!(
            "Injected {} script(s), {} stylesheet(s), {} font reference(s); {} failure(s)",
            report.scripts,
            report.stylesheets,
            report.fonts_inlined,
            report.failures.len()
        );
        Ok(report)
    }

    /// Inject one asset. Returns the number of font references inlined.
    pub fn inject(&self, fs: &dyn GuestFs, record: AssetRecord) -> Result<usize, AssetError> {
        match record.kind {
            AssetKind::Script => {
                debug!("Evaluating script {}", record.path);
                self.document
                    .eval_script(&record.content)
                    .map_err(|source| AssetError::Evaluate {
                        path: record.path,
                        source,
                    })?;
                Ok(0)
            }
            AssetKind::Stylesheet => {
                let fonts_dir = paths::join(paths::parent(&record.path), "fonts");
                let (css, replaced) = match inline_fonts(&record.content, fs, &fonts_dir) {
                    Ok(rewrite) => (rewrite.css, rewrite.replaced),
                    Err(AssetError::MissingFontDir(dir)) => {
                        warn!("No fonts directory for {} ({}); fonts not inlined", record.path, dir);
                        (record.content, 0)
                    }
                    Err(e) => {
                        warn!(
                            "Font inlining skipped for {}: {}",
                            record.path,
                            display_chain(&e)
                        );
                        (record.content, 0)
                    }
                };

                debug!("Injecting stylesheet {}", record.path);
                self.document
                    .append_style(&css)
                    .map_err(|source| AssetError::Inject {
                        path: record.path,
                        source,
                    })?;
                Ok(replaced)
            }
        }
    }

    /// Append a `<link rel="stylesheet">` to the document.
    pub fn link_stylesheet(&self, href: &str) -> Result<(), AssetError> {
        self.document
            .append_stylesheet_link(href)
            .map_err(|source| AssetError::Link {
                href: href.to_string(),
                source,
            })
    }
}

fn read_record(fs: &dyn GuestFs, path: &str, kind: AssetKind) -> Result<AssetRecord, AssetError> {
    let content = fs.read_to_string(path).map_err(|source| AssetError::Read {
        path: path.to_string(),
        source,
    })?;
    Ok(AssetRecord {
        path: path.to_string(),
        kind,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryFs;
    use crate::host::mock::MockDocument;

    const ROOT: &str = "/lib/python3.12/site-packages";

    fn fixture() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.insert_file(&format!("{ROOT}/dhxpyt/suite.css"), "@font-face{src:url(./fonts/a.woff)}");
        fs.insert_file(&format!("{ROOT}/dhxpyt/fonts/a.woff"), vec![0u8, 1, 2]);
        fs.insert_file(&format!("{ROOT}/dhxpyt/suite.js"), "window.dhx = {};");
        fs.insert_file(&format!("{ROOT}/dhxpyt/__init__.py"), "");
        fs
    }

    #[test]
    fn test_scripts_then_styles() {
        let fs = fixture();
        fs.insert_file(&format!("{ROOT}/aaa/first.css"), "body{}");
        let document = MockDocument::new();

        let report = AssetInjector::new(&document).inject_from(&fs, ROOT).unwrap();

        assert_eq!(report.scripts, 1);
        assert_eq!(report.stylesheets, 2);
        assert_eq!(report.fonts_inlined, 1);
        assert!(report.failures.is_empty());
        assert_eq!(document.evaluated_scripts(), vec!["window.dhx = {};"]);
        let styles = document.styles();
        assert_eq!(styles[0], "body{}");
        assert!(styles[1].contains("data:font/woff;charset=utf-8;base64,AAEC"));
    }

    #[test]
    fn test_broken_script_does_not_stop_others() {
        let fs = fixture();
        fs.insert_file(&format!("{ROOT}/broken/bad.js"), "this is ( broken");
        fs.insert_file(&format!("{ROOT}/broken/latin1.css"), vec![0xffu8, 0xfe]);
        let document = MockDocument::new().with_failing_eval("( broken");

        let report = AssetInjector::new(&document).inject_from(&fs, ROOT).unwrap();

        assert_eq!(report.scripts, 1);
        assert_eq!(report.stylesheets, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().any(|f| f.path.ends_with("bad.js")));
        assert!(report.failures.iter().any(|f| f.path.ends_with("latin1.css")));
    }

    #[test]
    fn test_stylesheet_without_fonts_dir_is_injected_unchanged() {
        let fs = MemoryFs::new();
        let css = "x{src:url(./fonts/b.woff2)}";
        fs.insert_file(&format!("{ROOT}/pkg/x.css"), css);
        let document = MockDocument::new();

        let report = AssetInjector::new(&document).inject_from(&fs, ROOT).unwrap();

        assert_eq!(report.stylesheets, 1);
        assert_eq!(document.styles(), vec![css.to_string()]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let fs = MemoryFs::new();
        let document = MockDocument::new();
        let err = AssetInjector::new(&document)
            .inject_from(&fs, "/nowhere")
            .unwrap_err();
        assert!(matches!(err, AssetError::Enumerate { .. }));
    }

    #[test]
    fn test_asset_kind() {
        assert_eq!(AssetKind::from_path("/a/b.JS"), Some(AssetKind::Script));
        assert_eq!(AssetKind::from_path("/a/b.css"), Some(AssetKind::Stylesheet));
        assert_eq!(AssetKind::from_path("/a/b.py"), None);
    }
}
