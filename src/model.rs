use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransferError;

/// A half-open `[start_idx, end_idx)` span of a content's bytes together with
/// the fingerprint of those bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ByteRange {
    pub start_idx: u64,
    pub end_idx: u64,
    pub fingerprint: String,
}

impl ByteRange {
    pub fn new(start_idx: u64, end_idx: u64, fingerprint: String) -> Self {
        debug_assert!(end_idx > start_idx, "empty byte range {}..{}", start_idx, end_idx);
        Self {
            start_idx,
            end_idx,
            fingerprint,
        }
    }

    pub fn len(&self) -> u64 {
        self.end_idx - self.start_idx
    }

    pub fn is_empty(&self) -> bool {
        self.end_idx <= self.start_idx
    }

    /// Value for the HTTP `Range` header; HTTP ranges are end-inclusive.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start_idx, self.end_idx - 1)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_idx, self.end_idx)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Download,
    Upload,
}

/// Outcome of comparing the expected byte count of an attempt with what was
/// actually transferred. A mismatch is reported, never turned into a failure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SizeCheck {
    Match,
    Mismatch { expected: u64, transferred: u64 },
}

impl SizeCheck {
    pub fn compare(expected: u64, transferred: u64) -> Self {
        if expected == transferred {
            SizeCheck::Match
        } else {
            SizeCheck::Mismatch {
                expected,
                transferred,
            }
        }
    }
}

/// Record of one transfer attempt against one (content, provider) pair.
/// Times are Unix epoch milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub kind: TransferKind,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    pub provider_id: String,
    pub endpoint_url: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub declared_size: u64,
    pub transferred_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<ByteRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_ranges: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_check: Option<SizeCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub error: Option<String>,
}

impl TransferResult {
    pub fn new(kind: TransferKind, content_id: &str, provider_id: &str, declared_size: u64) -> Self {
        let start_time = now_millis();
        Self {
            kind,
            content_id: content_id.to_string(),
            content_name: None,
            provider_id: provider_id.to_string(),
            endpoint_url: None,
            start_time,
            // Placeholder until the attempt reaches a terminal point.
            end_time: start_time,
            declared_size,
            transferred_size: 0,
            ranges: None,
            matched_ranges: None,
            size_check: None,
            file_path: None,
            content_hash: None,
            error: None,
        }
    }

    /// Terminal success: stamp the end time and the final byte count.
    pub fn complete(&mut self, transferred: u64, expected: u64) {
        self.end_time = now_millis().max(self.start_time);
        self.transferred_size = transferred;
        self.size_check = Some(SizeCheck::compare(expected, transferred));
    }

    /// Terminal failure. Partial byte counts are kept.
    pub fn fail(&mut self, transferred: u64, err: &TransferError) {
        self.end_time = now_millis().max(self.start_time);
        self.transferred_size = transferred;
        self.error = Some(err.to_string());
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn elapsed_millis(&self) -> i64 {
        self.end_time - self.start_time
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
