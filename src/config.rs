use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::stream::DEFAULT_REPORT_EVERY;

pub const DEFAULT_CONFIG_FILE: &str = "storbench.toml";

/// Largest file accepted for upload by storage providers (100 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Benchmark configuration, read from `storbench.toml`. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Root for `random-ranges/`, `test-results/` and `sample-files/`.
    pub data_dir: PathBuf,
    /// Directory holding scenario files (`*.toml`).
    pub scenarios_dir: PathBuf,
    /// Static content/provider directory of the network.
    pub network_manifest: PathBuf,
    /// Discovery nodes used to resolve provider asset endpoints. When empty,
    /// endpoints come from the network manifest.
    pub bootstrap_nodes: Vec<String>,
    /// Progress is reported each time this many bytes have arrived.
    pub progress_every_bytes: u64,
    pub max_upload_bytes: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// Optional download rate cap in bytes per second.
    pub rate_limit: Option<u32>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            scenarios_dir: PathBuf::from("scenarios"),
            network_manifest: PathBuf::from("network.toml"),
            bootstrap_nodes: Vec::new(),
            progress_every_bytes: DEFAULT_REPORT_EVERY,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            connect_timeout_secs: 10,
            user_agent: concat!("storbench/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limit: None,
        }
    }
}

impl BenchConfig {
    pub fn ranges_dir(&self) -> PathBuf {
        self.data_dir.join("random-ranges")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("test-results")
    }

    pub fn sample_files_dir(&self) -> PathBuf {
        self.data_dir.join("sample-files")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.connect_timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }
}

/// Load from `path` when given (it must exist), else from `./storbench.toml`
/// when present, else built-in defaults.
pub fn load(path: Option<&Path>) -> Result<BenchConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default_path.exists() {
                return Ok(BenchConfig::default());
            }
            default_path
        }
    };

    let data = fs::read_to_string(&path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: BenchConfig = toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}
