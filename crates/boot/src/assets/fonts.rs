//! Stylesheet font inlining.
//!
//! Widget stylesheets reference fonts as `url(./fonts/<file>)`. The guest
//! filesystem is not reachable over HTTP, so each reference to a font found in
//! the sibling `fonts` directory is rewritten into a base64 data URI.
use base64::Engine;
use tracing::{debug, warn};

use super::AssetError;
use crate::host::{GuestError, GuestFs, paths};

/// Recognized font formats and their MIME types.
pub const FONT_FORMATS: &[(&str, &str)] = &[
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
];

pub fn font_mime(extension: &str) -> Option<&'static str> {
    FONT_FORMATS
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};charset=utf-8;base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Result of inlining a stylesheet's fonts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRewrite {
    pub css: String,
    /// Number of `url(...)` references replaced.
    pub replaced: usize,
}

/// Replace every `url(./fonts/<file_name>)` in `css` with `url(<uri>)`.
///
/// The path may be wrapped in single or double quotes.
pub fn replace_font_reference(css: &str, file_name: &str, uri: &str) -> (String, usize) {
    let target = format!("./fonts/{file_name}");
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    let mut count = 0;

    while let Some(idx) = rest.find("url(") {
        out.push_str(&rest[..idx]);
        let body = &rest[idx + "url(".len()..];
        out.push_str("url(");
        match match_reference(body, &target) {
            Some(len) => {
                out.push_str(uri);
                out.push(')');
                rest = &body[len..];
                count += 1;
            }
            None => rest = body,
        }
    }
    out.push_str(rest);
    (out, count)
}

/// Length of `['"]?<target>['"]?)` at the start of `body`.
fn match_reference(body: &str, target: &str) -> Option<usize> {
    let mut pos = 0;
    if body.starts_with(['\'', '"']) {
        pos += 1;
    }
    if !body[pos..].starts_with(target) {
        return None;
    }
    pos += target.len();
    if body[pos..].starts_with(['\'', '"']) {
        pos += 1;
    }
    body[pos..].starts_with(')').then_some(pos + 1)
}

/// Inline every recognized font in `fonts_dir` into `css`.
///
/// A missing directory is an error so the caller can keep the original text.
/// Individual unreadable fonts are logged and skipped.
pub fn inline_fonts(
    css: &str,
    fs: &dyn GuestFs,
    fonts_dir: &str,
) -> Result<FontRewrite, AssetError> {
    let entries = fs.list_dir(fonts_dir).map_err(|e| match e {
        GuestError::NotFound(_) => AssetError::MissingFontDir(fonts_dir.to_string()),
        source => AssetError::Read {
            path: fonts_dir.to_string(),
            source,
        },
    })?;

    let mut css = css.to_string();
    let mut replaced = 0;

    for name in entries {
        let path = paths::join(fonts_dir, &name);
        if !fs.is_file(&path) {
            continue;
        }
        let Some(mime) = paths::extension(&name).as_deref().and_then(font_mime) else {
            continue;
        };

        let bytes = match fs.read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable font {}: {}", path, e);
                continue;
            }
        };

        let (rewritten, count) = replace_font_reference(&css, &name, &data_uri(mime, &bytes));
        if count > 0 {
            debug!("Inlined font {} ({} reference(s))", name, count);
        }
        css = rewritten;
        replaced += count;
    }

    Ok(FontRewrite { css, replaced })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryFs;

    #[test]
    fn test_replace_quoted_and_bare() {
        let css = "a{src:url('./fonts/a.woff')} b{src:url(\"./fonts/a.woff\")} c{src:url(./fonts/a.woff)}";
        let (out, count) = replace_font_reference(css, "a.woff", "data:x");
        assert_eq!(count, 3);
        assert_eq!(out, "a{src:url(data:x)} b{src:url(data:x)} c{src:url(data:x)}");
    }

    #[test]
    fn test_replace_leaves_other_urls() {
        let css = "x{background:url(img.png)} y{src:url(./fonts/a.woff2)}";
        let (out, count) = replace_font_reference(css, "a.woff", "data:x");
        assert_eq!(count, 0);
        assert_eq!(out, css);
    }

    #[test]
    fn test_inline_present_font_only() {
        let fs = MemoryFs::new();
        fs.insert_file("/site/w/fonts/a.woff", vec![1u8, 2, 3]);
        fs.insert_file("/site/w/fonts/readme.txt", "not a font");
        let css = "@font-face{src:url(./fonts/a.woff)} @font-face{src:url('./fonts/b.woff2')}";

        let rewrite = inline_fonts(css, &fs, "/site/w/fonts").unwrap();

        assert_eq!(rewrite.replaced, 1);
        assert!(
            rewrite
                .css
                .contains("url(data:font/woff;charset=utf-8;base64,AQID)")
        );
        assert!(rewrite.css.contains("url('./fonts/b.woff2')"));
    }

    #[test]
    fn test_missing_font_dir() {
        let fs = MemoryFs::new();
        let err = inline_fonts("x{}", &fs, "/site/w/fonts").unwrap_err();
        assert!(matches!(err, AssetError::MissingFontDir(_)));
    }

    #[test]
    fn test_font_mime() {
        assert_eq!(font_mime("WOFF2"), Some("font/woff2"));
        assert_eq!(font_mime("svg"), None);
    }
}
