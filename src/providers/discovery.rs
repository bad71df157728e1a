use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::EndpointResolver;
use crate::utils::{asset_url, normalize_url};

#[derive(Deserialize)]
struct DiscoveryResponse {
    serialized: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServiceInfo {
    pub asset: ServiceInfoEntry,
    #[serde(default)]
    pub discover: Option<ServiceInfoEntry>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServiceInfoEntry {
    #[serde(default)]
    pub version: u32,
    pub endpoint: String,
}

/// Resolves asset endpoints through the network's discovery nodes.
pub struct DiscoveryResolver {
    client: Client,
    bootstrap_nodes: Vec<String>,
}

impl DiscoveryResolver {
    pub fn new(client: Client, bootstrap_nodes: Vec<String>) -> Self {
        Self {
            client,
            bootstrap_nodes,
        }
    }

    /// `GET {node}/discover/v0/{provider}`; the service info is a JSON
    /// document embedded as a string in the `serialized` field.
    pub async fn discover_service_info(&self, bootstrap_node: &str, provider_id: &str) -> Result<ServiceInfo> {
        let base = normalize_url(bootstrap_node);
        url::Url::parse(&base).with_context(|| format!("invalid discovery node URL: {}", base))?;
        let info_url = format!("{}/discover/v0/{}", base, provider_id);

        info!(provider_id, node = %base, "resolving storage provider");
        let resp = self
            .client
            .get(&info_url)
            .send()
            .await
            .with_context(|| format!("request {}", info_url))?;
        if !resp.status().is_success() {
            bail!("discovery request failed with status {}", resp.status());
        }

        let body = resp.text().await.context("read discovery response")?;
        let parsed: DiscoveryResponse = serde_json::from_str(&body).context("parse discovery response")?;
        let service_info: ServiceInfo =
            serde_json::from_str(&parsed.serialized).context("parse serialized service info")?;
        debug!(?service_info, "service info");
        Ok(service_info)
    }
}

#[async_trait]
impl EndpointResolver for DiscoveryResolver {
    async fn resolve_asset_url(&self, provider_id: &str, content_id: &str) -> Option<String> {
        for node in &self.bootstrap_nodes {
            match self.discover_service_info(node, provider_id).await {
                Ok(info) => match asset_url(&info.asset.endpoint, content_id) {
                    Ok(url) => return Some(url),
                    Err(e) => warn!(node = %node, "invalid asset endpoint {}: {}", info.asset.endpoint, e),
                },
                Err(e) => warn!(node = %node, "could not get service info: {:#}", e),
            }
        }
        None
    }
}
