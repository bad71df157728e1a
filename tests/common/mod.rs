#![allow(dead_code)]

pub mod range_server;

use std::sync::Arc;

use storbench::providers::manifest::{ContentEntry, ManifestDirectory, NetworkManifest, ProviderEntry};
use storbench::providers::Network;

/// Body with a repeating but position-dependent pattern.
pub fn patterned_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// One provider serving one content item from `base_url`.
pub fn single_provider_network(base_url: &str, content_id: &str, size: u64) -> Network {
    let manifest = NetworkManifest {
        primary_liaison: Some("sp-1".to_string()),
        staked_providers: None,
        providers: vec![ProviderEntry {
            id: "sp-1".to_string(),
            asset_endpoint: base_url.to_string(),
        }],
        content: vec![ContentEntry {
            id: content_id.to_string(),
            name: "sample.bin".to_string(),
            size,
            providers: vec!["sp-1".to_string()],
        }],
    };
    let directory = Arc::new(ManifestDirectory::new(manifest));
    Network {
        directory: directory.clone(),
        resolver: directory,
    }
}
