use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use super::{ContentDirectory, ContentMetadata, EndpointResolver};
use crate::utils::asset_url;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct NetworkManifest {
    #[serde(default)]
    pub primary_liaison: Option<String>,
    /// Staked providers; defaults to every provider listed.
    #[serde(default)]
    pub staked_providers: Option<Vec<String>>,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProviderEntry {
    pub id: String,
    pub asset_endpoint: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContentEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub size: u64,
    /// Providers holding a storage relationship for this content.
    #[serde(default)]
    pub providers: Vec<String>,
}

/// Content directory and endpoint resolver backed by a TOML manifest.
/// Content registered for upload is kept in memory for the process lifetime.
pub struct ManifestDirectory {
    manifest: NetworkManifest,
    registered: Mutex<HashMap<String, ContentEntry>>,
}

impl ManifestDirectory {
    pub fn new(manifest: NetworkManifest) -> Self {
        Self {
            manifest,
            registered: Mutex::new(HashMap::new()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read network manifest {}", path.display()))?;
        let manifest: NetworkManifest =
            toml::from_str(&data).with_context(|| format!("parse network manifest {}", path.display()))?;
        info!(
            providers = manifest.providers.len(),
            content = manifest.content.len(),
            "loaded network manifest {}",
            path.display()
        );
        Ok(Self::new(manifest))
    }

    fn find_content(&self, content_id: &str) -> Option<ContentEntry> {
        if let Some(entry) = self.manifest.content.iter().find(|c| c.id == content_id) {
            return Some(entry.clone());
        }
        self.registered
            .lock()
            .ok()
            .and_then(|r| r.get(content_id).cloned())
    }

    fn staked(&self) -> Vec<String> {
        match &self.manifest.staked_providers {
            Some(staked) => staked.clone(),
            None => self.manifest.providers.iter().map(|p| p.id.clone()).collect(),
        }
    }
}

#[async_trait]
impl ContentDirectory for ManifestDirectory {
    async fn known_content_ids(&self) -> Result<Vec<String>> {
        Ok(self.manifest.content.iter().map(|c| c.id.clone()).collect())
    }

    async fn staked_providers(&self) -> Result<Vec<String>> {
        Ok(self.staked())
    }

    async fn ready_providers(&self, content_id: &str) -> Result<Vec<String>> {
        let Some(entry) = self.find_content(content_id) else {
            return Ok(Vec::new());
        };
        // Staked order, restricted to providers storing the content.
        Ok(self
            .staked()
            .into_iter()
            .filter(|p| entry.providers.contains(p))
            .collect())
    }

    async fn metadata(&self, content_id: &str) -> Option<ContentMetadata> {
        self.find_content(content_id).map(|c| ContentMetadata {
            size: c.size,
            name: c.name,
        })
    }

    async fn primary_liaison(&self) -> Option<String> {
        self.manifest.primary_liaison.clone()
    }

    async fn register_content(&self, content_id: &str, name: &str, size: u64, content_hash: &str) -> Result<()> {
        let entry = ContentEntry {
            id: content_id.to_string(),
            name: name.to_string(),
            size,
            providers: self.manifest.primary_liaison.iter().cloned().collect(),
        };
        self.registered
            .lock()
            .map_err(|_| anyhow::anyhow!("content registry lock poisoned"))?
            .insert(content_id.to_string(), entry);
        info!(content_id, size, content_hash, "registered content");
        Ok(())
    }
}

#[async_trait]
impl EndpointResolver for ManifestDirectory {
    async fn resolve_asset_url(&self, provider_id: &str, content_id: &str) -> Option<String> {
        let provider = self.manifest.providers.iter().find(|p| p.id == provider_id)?;
        asset_url(&provider.asset_endpoint, content_id).ok()
    }
}
