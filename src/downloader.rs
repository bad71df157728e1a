use futures::Future;
use reqwest::{header, Client, StatusCode};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::{ConsumeError, TransferError};
use crate::ledger::RangeLedger;
use crate::model::{ByteRange, TransferKind, TransferResult};
use crate::progress::ProgressSink;
use crate::providers::Network;
use crate::sampler::RandomRangeSampler;
use crate::stream::{ChunkHandler, Passthrough, RateLimit, StreamConsumer};
use crate::utils::format_number;
use crate::verifier::RangeVerifier;

/// What a download attempt does with the bytes it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Timed full download.
    Full,
    /// Full download that records random ranges into the ledger.
    GenerateRanges,
    /// One ranged request per ledger entry (up to `max_ranges`), each verified.
    ReplayRanges { max_ranges: usize },
}

/// Limits applied to a single attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptLimits {
    /// Seconds allowed per declared byte before the attempt counts as failed.
    pub max_time_per_byte: Option<f64>,
}

/// Working state of one download attempt. Lives for one `download_content` call.
pub struct TransferSession<'r> {
    endpoint: String,
    ranges: Vec<ByteRange>,
    transferred: u64,
    started: Instant,
    deadline: Option<tokio::time::Instant>,
    result: &'r mut TransferResult,
}

impl<'r> TransferSession<'r> {
    fn new(endpoint: String, deadline: Option<tokio::time::Instant>, result: &'r mut TransferResult) -> Self {
        Self {
            endpoint,
            ranges: Vec::new(),
            transferred: 0,
            started: Instant::now(),
            deadline,
            result,
        }
    }

    fn elapsed_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn succeed(self, expected: u64) {
        self.result.complete(self.transferred, expected);
        println!(
            "✅ Content downloaded! Consumed {} bytes in {} millis",
            format_number(self.transferred),
            format_number(self.elapsed_millis())
        );
    }

    fn fail(self, err: &TransferError) {
        let elapsed = self.elapsed_millis();
        self.result.fail(self.transferred, err);
        error!(
            content_id = %self.result.content_id,
            provider_id = %self.result.provider_id,
            transferred = self.transferred,
            elapsed_ms = elapsed,
            "download failed: {}",
            err
        );
        println!(
            "❌ Failed to download content {} from provider {}. Consumed {} bytes. Passed {} millis. {}",
            self.result.content_id,
            self.result.provider_id,
            format_number(self.transferred),
            format_number(elapsed),
            err
        );
    }
}

pub struct Downloader {
    client: Client,
    network: Network,
    ledger: RangeLedger,
    progress: Arc<dyn ProgressSink>,
    report_every: u64,
    rate_limiter: Option<RateLimit>,
}

impl Downloader {
    pub fn new(
        client: Client,
        network: Network,
        ledger: RangeLedger,
        progress: Arc<dyn ProgressSink>,
        report_every: u64,
        rate_limit_bytes_per_sec: Option<u32>,
    ) -> Self {
        let rate_limiter = rate_limit_bytes_per_sec
            .and_then(NonZeroU32::new)
            .map(RateLimit::per_second);

        Self {
            client,
            network,
            ledger,
            progress,
            report_every,
            rate_limiter,
        }
    }

    pub fn ledger(&self) -> &RangeLedger {
        &self.ledger
    }

    /// Download `content_id` from `provider_id` in the given mode. Failures
    /// are recorded in the returned result, never returned as errors.
    pub async fn download_content(
        &self,
        provider_id: &str,
        content_id: &str,
        mode: DownloadMode,
        limits: AttemptLimits,
    ) -> TransferResult {
        let Some(metadata) = self.network.directory.metadata(content_id).await else {
            let mut result = TransferResult::new(TransferKind::Download, content_id, provider_id, 0);
            let err = TransferError::MetadataNotFound(content_id.to_string());
            println!("❌ {}", err);
            result.fail(0, &err);
            return result;
        };

        let mut result = TransferResult::new(TransferKind::Download, content_id, provider_id, metadata.size);
        result.content_name = Some(metadata.name.clone());

        let Some(endpoint) = self.network.resolver.resolve_asset_url(provider_id, content_id).await else {
            let err = TransferError::EndpointUnresolved {
                provider: provider_id.to_string(),
            };
            println!("❌ {}", err);
            result.fail(0, &err);
            return result;
        };
        result.endpoint_url = Some(endpoint.clone());

        match mode {
            DownloadMode::GenerateRanges => println!("Generating random ranges of content from URL {}", endpoint),
            _ => println!("Downloading content from URL {}", endpoint),
        }

        let deadline = limits
            .max_time_per_byte
            .and_then(|secs| Duration::try_from_secs_f64(secs * metadata.size as f64).ok())
            .map(|budget| tokio::time::Instant::now() + budget);

        let mut session = TransferSession::new(endpoint, deadline, &mut result);
        let outcome = match mode {
            DownloadMode::Full => self.run_full(&mut session, metadata.size).await,
            DownloadMode::GenerateRanges => self.run_sampling(&mut session, content_id, metadata.size).await,
            DownloadMode::ReplayRanges { max_ranges } => self.run_replay(&mut session, content_id, max_ranges).await,
        };
        match outcome {
            Ok(expected) => session.succeed(expected),
            Err(err) => session.fail(&err),
        }
        result
    }

    async fn run_full(&self, session: &mut TransferSession<'_>, declared: u64) -> Result<u64, TransferError> {
        self.run_phase(session, None, declared, "", &mut Passthrough).await?;
        Ok(declared)
    }

    async fn run_sampling(
        &self,
        session: &mut TransferSession<'_>,
        content_id: &str,
        declared: u64,
    ) -> Result<u64, TransferError> {
        let mut sampler = RandomRangeSampler::new();
        self.run_phase(session, None, declared, "", &mut sampler).await?;

        let ranges = sampler.into_ranges();
        if !ranges.is_empty() {
            let path = self.ledger.save(content_id, &ranges).await?;
            println!(
                "✅ {} random ranges w/ their hashes in base64 saved to file: {}",
                ranges.len(),
                path.display()
            );
        }
        session.result.ranges = Some(ranges);
        Ok(declared)
    }

    async fn run_replay(
        &self,
        session: &mut TransferSession<'_>,
        content_id: &str,
        max_ranges: usize,
    ) -> Result<u64, TransferError> {
        session.ranges = self.ledger.load(content_id, max_ranges).await?;
        session.result.ranges = Some(session.ranges.clone());
        session.result.matched_ranges = Some(0);
        let expected: u64 = session.ranges.iter().map(ByteRange::len).sum();

        let mut verifier = RangeVerifier::new();
        let queued = session.ranges.clone();
        let count = queued.len();
        for (i, range) in queued.into_iter().enumerate() {
            info!(range = %range, index = i + 1, count, "requesting range");
            let label = format!("range {}/{}", i + 1, count);
            verifier.begin(range.clone());
            let outcome = self.run_phase(session, Some(&range), range.len(), &label, &mut verifier).await;
            session.result.matched_ranges = Some(verifier.matched());
            outcome?;
        }
        println!("✅ {}/{} ranges matched their recorded fingerprints", verifier.matched(), count);
        Ok(expected)
    }

    /// One request and its body. Bytes consumed are added to the session even
    /// when the phase fails.
    async fn run_phase<H>(
        &self,
        session: &mut TransferSession<'_>,
        range: Option<&ByteRange>,
        expected: u64,
        label: &str,
        handler: &mut H,
    ) -> Result<u64, TransferError>
    where
        H: ChunkHandler + ?Sized,
    {
        self.progress.start(TransferKind::Download, expected, label);
        let mut consumer =
            StreamConsumer::new(&*self.progress, self.report_every).with_rate_limit(self.rate_limiter.as_ref());

        let phase = request_and_consume(&self.client, &mut consumer, &session.endpoint, range, expected, handler);
        let outcome = with_deadline(session.deadline, phase).await;
        self.progress.stop();

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => Err(ConsumeError {
                consumed: consumer.consumed(),
                source: TransferError::RequestFailed(format!(
                    "timed out after {} millis",
                    session.elapsed_millis()
                )),
            }),
        };
        match outcome {
            Ok(consumed) => {
                session.transferred += consumed;
                Ok(consumed)
            }
            Err(ConsumeError { consumed, source }) => {
                session.transferred += consumed;
                Err(source)
            }
        }
    }
}

/// `None` when the deadline passed first.
async fn with_deadline<F: Future>(deadline: Option<tokio::time::Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

async fn request_and_consume<H>(
    client: &Client,
    consumer: &mut StreamConsumer<'_>,
    endpoint: &str,
    range: Option<&ByteRange>,
    expected: u64,
    handler: &mut H,
) -> Result<u64, ConsumeError>
where
    H: ChunkHandler + ?Sized,
{
    let not_started = |source| ConsumeError { consumed: 0, source };

    let mut request = client.get(endpoint);
    if let Some(range) = range {
        request = request.header(header::RANGE, range.range_header());
    }
    let response = request
        .send()
        .await
        .map_err(|e| not_started(TransferError::request(e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(not_started(TransferError::RequestFailed(format!(
            "{} responded with HTTP {}",
            endpoint, status
        ))));
    }
    if expected > 0 && (status == StatusCode::NO_CONTENT || response.content_length() == Some(0)) {
        return Err(not_started(TransferError::EmptyResponse(endpoint.to_string())));
    }
    if range.is_some() && status != StatusCode::PARTIAL_CONTENT {
        warn!(endpoint, %status, "server did not answer the Range request with 206");
        return Err(not_started(TransferError::RequestFailed(format!(
            "{} answered a Range request with HTTP {} instead of 206 Partial Content",
            endpoint, status
        ))));
    }

    let total = consumer.consume(response.bytes_stream(), handler).await?;
    if total == 0 && expected > 0 {
        return Err(not_started(TransferError::EmptyResponse(endpoint.to_string())));
    }
    Ok(total)
}
