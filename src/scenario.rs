//! Test scenarios: one TOML file per scenario under the scenarios directory.
//!
//! ```toml
//! kind = "download"
//! name = "Random ranges"
//! use_random_ranges = true
//! max_random_ranges = 3
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const SCENARIO_EXTENSION: &str = "toml";

fn default_max_random_ranges() -> usize {
    3
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Scenario {
    Download(DownloadProps),
    Upload(UploadProps),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DownloadProps {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Seconds to wait between two attempts.
    #[serde(default)]
    pub pause_time_secs: Option<f64>,
    /// Content to download; every known content item when empty.
    #[serde(default)]
    pub content_ids: Vec<String>,
    #[serde(default)]
    pub generate_random_ranges: bool,
    #[serde(default)]
    pub use_random_ranges: bool,
    #[serde(default = "default_max_random_ranges")]
    pub max_random_ranges: usize,
    /// Seconds allowed per declared byte before an attempt is abandoned.
    #[serde(default)]
    pub max_download_time_per_byte: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UploadProps {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pause_time_secs: Option<f64>,
    /// Resolved against the sample files directory unless absolute.
    pub content_file_name: PathBuf,
    /// Account the content is registered under.
    #[serde(default)]
    pub uploader_account_id: Option<String>,
}

impl Scenario {
    pub fn name(&self) -> &str {
        match self {
            Scenario::Download(p) => &p.name,
            Scenario::Upload(p) => &p.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Scenario::Download(p) => p.description.as_deref(),
            Scenario::Upload(p) => p.description.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scenario::Download(_) => "download",
            Scenario::Upload(_) => "upload",
        }
    }

    /// Pause between attempts; zero when unset or not a valid duration.
    pub fn pause(&self) -> Duration {
        let secs = match self {
            Scenario::Download(p) => p.pause_time_secs,
            Scenario::Upload(p) => p.pause_time_secs,
        };
        secs.and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or(Duration::ZERO)
    }
}

/// A scenario given on the command line: either a bare name looked up in
/// `dir`, or a path to a scenario file.
pub fn resolve_path(dir: &Path, name_or_path: &str) -> PathBuf {
    let mut file = name_or_path.to_string();
    if !file.ends_with(&format!(".{}", SCENARIO_EXTENSION)) {
        file = format!("{}.{}", file, SCENARIO_EXTENSION);
    }
    if file.contains('/') {
        PathBuf::from(file)
    } else {
        dir.join(file)
    }
}

pub fn parse(text: &str) -> Result<Scenario> {
    Ok(toml::from_str(text)?)
}

pub async fn load(path: &Path) -> Result<Scenario> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("read scenario {}", path.display()))?;
    parse(&text).with_context(|| format!("parse scenario {}", path.display()))
}

/// Every scenario file in `dir`, sorted by file name. Files that fail to
/// parse are returned with their error.
pub async fn list(dir: &Path) -> Result<Vec<(PathBuf, Result<Scenario>)>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("read scenarios directory {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(SCENARIO_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut scenarios = Vec::with_capacity(paths.len());
    for path in paths {
        let scenario = load(&path).await;
        scenarios.push((path, scenario));
    }
    Ok(scenarios)
}
