use futures::StreamExt;
use reqwest::{header, Body, Client};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::error::TransferError;
use crate::hashing::calculate_hash;
use crate::model::{TransferKind, TransferResult};
use crate::progress::ProgressSink;
use crate::providers::Network;
use crate::utils::format_number;

/// Reject anything a storage provider would refuse: not a regular file,
/// empty, or larger than `max_bytes`. Returns the file size.
pub async fn check_upload_file(path: &Path, max_bytes: u64) -> Result<u64, TransferError> {
    let rejected = |reason: String| TransferError::FileRejected {
        path: path.to_path_buf(),
        reason,
    };

    let meta = fs::metadata(path)
        .await
        .map_err(|e| rejected(format!("cannot stat file: {}", e)))?;
    if !meta.is_file() {
        return Err(rejected("not a regular file".to_string()));
    }
    let size = meta.len();
    if size == 0 {
        return Err(rejected("file is empty".to_string()));
    }
    if size > max_bytes {
        return Err(rejected(format!(
            "file is too large: {} bytes, max allowed {} bytes",
            format_number(size),
            format_number(max_bytes)
        )));
    }
    Ok(size)
}

/// SHA-256 of a local file, as hex. Failure to read it is a local i/o error.
async fn hash_upload_file(path: &Path) -> Result<String, TransferError> {
    calculate_hash(path).await.map_err(|e| {
        TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("hash {}: {:#}", path.display(), e),
        ))
    })
}

pub struct Uploader {
    client: Client,
    network: Network,
    progress: Arc<dyn ProgressSink>,
    report_every: u64,
    max_upload_bytes: u64,
}

impl Uploader {
    pub fn new(
        client: Client,
        network: Network,
        progress: Arc<dyn ProgressSink>,
        report_every: u64,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            client,
            network,
            progress,
            report_every: report_every.max(1),
            max_upload_bytes,
        }
    }

    /// Upload `file_path` to `provider_id` under a freshly generated content id.
    /// Failures are recorded in the returned result.
    pub async fn upload_content(&self, provider_id: &str, file_path: &Path) -> TransferResult {
        let content_id = uuid::Uuid::new_v4().to_string();
        let mut result = TransferResult::new(TransferKind::Upload, &content_id, provider_id, 0);
        result.file_path = Some(file_path.display().to_string());
        let started = Instant::now();

        let outcome = self.try_upload(provider_id, &content_id, file_path, &mut result).await;
        let elapsed = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(sent) => {
                let declared = result.declared_size;
                result.complete(sent, declared);
                println!(
                    "✅ Content uploaded! Sent {} bytes in {} millis",
                    format_number(sent),
                    format_number(elapsed)
                );
            }
            Err((sent, err)) => {
                result.fail(sent, &err);
                error!(
                    content_id = %content_id,
                    provider_id,
                    sent,
                    elapsed_ms = elapsed,
                    "upload failed: {}",
                    err
                );
                println!(
                    "❌ Failed to upload file {} to provider {}. Passed {} millis. {}",
                    file_path.display(),
                    provider_id,
                    format_number(elapsed),
                    err
                );
            }
        }
        result
    }

    async fn try_upload(
        &self,
        provider_id: &str,
        content_id: &str,
        file_path: &Path,
        result: &mut TransferResult,
    ) -> Result<u64, (u64, TransferError)> {
        let size = check_upload_file(file_path, self.max_upload_bytes)
            .await
            .map_err(|e| (0, e))?;
        result.declared_size = size;

        let content_hash = hash_upload_file(file_path).await.map_err(|e| (0, e))?;
        result.content_hash = Some(content_hash.clone());

        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| content_id.to_string());
        result.content_name = Some(name.clone());

        self.network
            .directory
            .register_content(content_id, &name, size, &content_hash)
            .await
            .map_err(|e| (0, TransferError::RequestFailed(format!("register content: {:#}", e))))?;

        let Some(endpoint) = self.network.resolver.resolve_asset_url(provider_id, content_id).await else {
            return Err((
                0,
                TransferError::EndpointUnresolved {
                    provider: provider_id.to_string(),
                },
            ));
        };
        result.endpoint_url = Some(endpoint.clone());
        println!("Uploading {} to URL {}", file_path.display(), endpoint);

        let file = fs::File::open(file_path).await.map_err(|e| (0, TransferError::Io(e)))?;
        let sent = Arc::new(AtomicU64::new(0));
        let body = self.counting_body(file, sent.clone());

        self.progress.start(TransferKind::Upload, size, "");
        let response = self
            .client
            .put(&endpoint)
            .header(header::CONTENT_LENGTH, size)
            .header(header::CONTENT_TYPE, "")
            .body(body)
            .send()
            .await;
        self.progress.stop();

        let sent_bytes = sent.load(Ordering::Relaxed);
        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                warn!(provider_id, "storage provider is unreachable");
                return Err((sent_bytes, TransferError::request(e)));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            warn!(provider_id, %status, "storage provider is unreachable");
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err((
                sent_bytes,
                TransferError::RequestFailed(format!("{} responded with HTTP {}: {}", endpoint, status, body.trim())),
            ));
        }
        info!(content_id, provider_id, sent = sent_bytes, "upload accepted");
        Ok(sent_bytes)
    }

    /// File body that counts bytes handed to the connection and reports progress.
    fn counting_body(&self, file: fs::File, sent: Arc<AtomicU64>) -> Body {
        let sink = self.progress.clone();
        let report_every = self.report_every;
        let started = Instant::now();
        let mut since_report = 0u64;

        let stream = ReaderStream::new(file).inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                let n = chunk.len() as u64;
                let total = sent.fetch_add(n, Ordering::Relaxed) + n;
                since_report += n;
                if since_report >= report_every {
                    since_report = 0;
                    let secs = started.elapsed().as_secs_f64();
                    let speed = (secs > 0.0).then(|| total as f64 / 1024.0 / 1024.0 / secs);
                    sink.update(total, speed);
                }
            }
        });
        Body::wrap_stream(stream)
    }
}
