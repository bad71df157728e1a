use anyhow::Result;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use url::Url;

/// Strip a single trailing `/` so paths can be appended with `format!`.
pub fn normalize_url(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

/// `{base}/asset/v0/{content_id}`, validating the base URL on the way.
pub fn asset_url(base: &str, content_id: &str) -> Result<String> {
    let base = normalize_url(base);
    Url::parse(&base)?;
    Ok(format!("{}/asset/v0/{}", base, content_id))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

/// First path under `dir` named `filename` that does not exist yet, adding
/// `_1`, `_2`, ... before the extension as needed.
pub fn get_unique_filepath(dir: &Path, filename: &str) -> PathBuf {
    let mut path = dir.join(filename);
    let mut counter = 1;

    while path.exists() {
        let original = Path::new(filename);
        let file_stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = original
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();

        let new_filename = if extension.is_empty() {
            format!("{}_{}", file_stem, counter)
        } else {
            format!("{}_{}.{}", file_stem, counter, extension)
        };

        path = dir.join(new_filename);
        counter += 1;
    }
    path
}

/// Integer with thousands separators: `1234567` -> `1,234,567`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `  1) a\n  2) b` listing used in console output.
pub fn list_to_console_string<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("  {}) {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}
