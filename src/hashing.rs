use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Fingerprint of a byte buffer: MD5 digest, base64 encoded (24 chars).
///
/// Used to spot accidental corruption of sampled ranges, not tampering.
pub fn fingerprint(bytes: &[u8]) -> String {
    STANDARD.encode(md5::compute(bytes).0)
}

/// SHA-256 of a whole file as lowercase hex, read in fixed-size blocks.
pub async fn calculate_hash(filepath: &Path) -> Result<String> {
    let mut file = File::open(filepath)
        .await
        .with_context(|| format!("open {}", filepath.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
