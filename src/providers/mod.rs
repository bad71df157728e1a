//! Boundary to the storage network: who stores what, and where to fetch it.

pub mod discovery;
pub mod manifest;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::BenchConfig;
use discovery::DiscoveryResolver;
use manifest::ManifestDirectory;

/// Declared properties of a stored content item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentMetadata {
    pub size: u64,
    pub name: String,
}

/// Maps a (provider, content) pair to the asset URL serving that content.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// `None` when no endpoint could be resolved.
    async fn resolve_asset_url(&self, provider_id: &str, content_id: &str) -> Option<String>;
}

/// Content and provider registry of the network.
#[async_trait]
pub trait ContentDirectory: Send + Sync {
    async fn known_content_ids(&self) -> Result<Vec<String>>;

    /// Providers currently staked as storage actors.
    async fn staked_providers(&self) -> Result<Vec<String>>;

    /// Providers that store `content_id` and are still staked.
    async fn ready_providers(&self, content_id: &str) -> Result<Vec<String>>;

    /// `None` when the content id is unknown.
    async fn metadata(&self, content_id: &str) -> Option<ContentMetadata>;

    /// The only provider that accepts uploads.
    async fn primary_liaison(&self) -> Option<String>;

    /// Announce a new content item before its bytes are uploaded.
    async fn register_content(&self, content_id: &str, name: &str, size: u64, content_hash: &str) -> Result<()>;
}

/// The pair of collaborators a session runs against.
#[derive(Clone)]
pub struct Network {
    pub directory: Arc<dyn ContentDirectory>,
    pub resolver: Arc<dyn EndpointResolver>,
}

/// Build the network view from config: the manifest is always the directory;
/// endpoints come from discovery nodes when any are configured.
pub fn connect(config: &BenchConfig) -> Result<Network> {
    let manifest = Arc::new(ManifestDirectory::load(&config.network_manifest)?);
    let resolver: Arc<dyn EndpointResolver> = if config.bootstrap_nodes.is_empty() {
        manifest.clone()
    } else {
        Arc::new(DiscoveryResolver::new(
            config.http_client(),
            config.bootstrap_nodes.clone(),
        ))
    };
    Ok(Network {
        directory: manifest,
        resolver,
    })
}
