//! Range ledger: one plain-text file per content id holding the byte ranges
//! sampled during a full download, as `start;end;fingerprint` lines.

use rand::seq::index;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::LedgerError;
use crate::model::ByteRange;
use crate::utils::sanitize_filename;

const FIELD_SEPARATOR: char = ';';

/// Longest range a record may describe. Sampled ranges are half a network
/// chunk, far below this.
pub const MAX_RANGE_LEN: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RangeLedger {
    dir: PathBuf,
}

impl RangeLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, content_id: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", sanitize_filename(content_id)))
    }

    /// Replace the ledger for `content_id` with `entries`, in order.
    pub async fn save(&self, content_id: &str, entries: &[ByteRange]) -> Result<PathBuf, LedgerError> {
        let path = self.path_for(content_id);
        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let content = entries
            .iter()
            .map(format_record)
            .collect::<Vec<_>>()
            .join("\n");

        // Write beside the target and rename so readers never see half a file.
        let part_path = path.with_extension("csv.part");
        fs::write(&part_path, content).await.map_err(io_err)?;
        fs::rename(&part_path, &path).await.map_err(io_err)?;

        debug!(content_id, ranges = entries.len(), path = %path.display(), "saved range ledger");
        Ok(path)
    }

    /// Load up to `max_count` ranges. When the ledger holds more than that, a
    /// uniform random subset without replacement is returned.
    pub async fn load(&self, content_id: &str, max_count: usize) -> Result<Vec<ByteRange>, LedgerError> {
        let all = self.load_all(content_id).await?;
        Ok(pick_subset(all, max_count, &mut rand::thread_rng()))
    }

    pub async fn load_with_rng<R: Rng + ?Sized>(
        &self,
        content_id: &str,
        max_count: usize,
        rng: &mut R,
    ) -> Result<Vec<ByteRange>, LedgerError> {
        let all = self.load_all(content_id).await?;
        Ok(pick_subset(all, max_count, rng))
    }

    /// Every record in stored order.
    pub async fn load_all(&self, content_id: &str) -> Result<Vec<ByteRange>, LedgerError> {
        let path = self.path_for(content_id);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LedgerError::NotFound {
                    content_id: content_id.to_string(),
                    path,
                })
            }
            Err(source) => return Err(LedgerError::Io { path, source }),
        };
        parse_records(&path, &text)
    }
}

fn format_record(range: &ByteRange) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        range.start_idx,
        range.end_idx,
        range.fingerprint,
        sep = FIELD_SEPARATOR
    )
}

fn parse_records(path: &Path, text: &str) -> Result<Vec<ByteRange>, LedgerError> {
    let mut ranges = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let range = parse_record(line).map_err(|reason| LedgerError::Corrupt {
            path: path.to_path_buf(),
            line: i + 1,
            reason,
        })?;
        ranges.push(range);
    }
    Ok(ranges)
}

fn parse_record(line: &str) -> Result<ByteRange, String> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() != 3 {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    }
    let start_idx = fields[0]
        .parse::<u64>()
        .map_err(|_| format!("non-numeric start index {:?}", fields[0]))?;
    let end_idx = fields[1]
        .parse::<u64>()
        .map_err(|_| format!("non-numeric end index {:?}", fields[1]))?;
    if end_idx <= start_idx {
        return Err(format!("end index {} not after start index {}", end_idx, start_idx));
    }
    if end_idx - start_idx > MAX_RANGE_LEN {
        return Err(format!(
            "range {}..{} is longer than {} bytes",
            start_idx, end_idx, MAX_RANGE_LEN
        ));
    }
    if fields[2].is_empty() {
        return Err("missing fingerprint".to_string());
    }
    Ok(ByteRange::new(start_idx, end_idx, fields[2].to_string()))
}

fn pick_subset<R: Rng + ?Sized>(all: Vec<ByteRange>, max_count: usize, rng: &mut R) -> Vec<ByteRange> {
    if max_count >= all.len() {
        return all;
    }
    index::sample(rng, all.len(), max_count)
        .into_iter()
        .map(|i| all[i].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn sample_ranges(n: u64) -> Vec<ByteRange> {
        (0..n)
            .map(|i| ByteRange::new(i * 100, i * 100 + 50, format!("fp{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn save_then_load_all_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RangeLedger::new(dir.path());
        let ranges = sample_ranges(5);
        let path = ledger.save("cid", &ranges).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("0;50;fp0"));

        let loaded = ledger.load("cid", 5).await.unwrap();
        assert_eq!(loaded, ranges);
        let loaded = ledger.load("cid", 100).await.unwrap();
        assert_eq!(loaded, ranges);
    }

    #[tokio::test]
    async fn save_overwrites_previous_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RangeLedger::new(dir.path());
        ledger.save("cid", &sample_ranges(10)).await.unwrap();
        ledger.save("cid", &sample_ranges(2)).await.unwrap();
        assert_eq!(ledger.load_all("cid").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn subset_is_distinct_members_of_full_set() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RangeLedger::new(dir.path());
        let ranges = sample_ranges(20);
        ledger.save("cid", &ranges).await.unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for k in [0usize, 1, 3, 19] {
            let subset = ledger.load_with_rng("cid", k, &mut rng).await.unwrap();
            assert_eq!(subset.len(), k);
            let unique: HashSet<_> = subset.iter().collect();
            assert_eq!(unique.len(), k);
            assert!(subset.iter().all(|r| ranges.contains(r)));
        }
    }

    #[tokio::test]
    async fn missing_ledger_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RangeLedger::new(dir.path());
        let err = ledger.load("nope", 3).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_record_fails_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RangeLedger::new(dir.path());
        let path = ledger.path_for("cid");
        std::fs::write(&path, "0;10;aaa\n10;20\n20;30;ccc").unwrap();
        match ledger.load("cid", 10).await.unwrap_err() {
            LedgerError::Corrupt { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }

        std::fs::write(&path, "0;ten;aaa").unwrap();
        assert!(matches!(
            ledger.load("cid", 10).await.unwrap_err(),
            LedgerError::Corrupt { line: 1, .. }
        ));

        std::fs::write(&path, "10;10;aaa").unwrap();
        assert!(matches!(
            ledger.load("cid", 10).await.unwrap_err(),
            LedgerError::Corrupt { .. }
        ));
    }

    #[tokio::test]
    async fn oversized_range_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RangeLedger::new(dir.path());
        std::fs::write(ledger.path_for("cid"), "0;10;aaa\n0;18446744073709551615;abc\n").unwrap();
        match ledger.load("cid", 5).await.unwrap_err() {
            LedgerError::Corrupt { line, reason, .. } => {
                assert_eq!(line, 2);
                assert!(reason.contains("longer than"), "{}", reason);
            }
            other => panic!("unexpected error: {other}"),
        }

        let at_limit = format!("5;{};aaa", 5 + MAX_RANGE_LEN);
        assert_eq!(parse_records(Path::new("x.csv"), &at_limit).unwrap()[0].len(), MAX_RANGE_LEN);
    }

    #[test]
    fn trailing_newline_is_tolerated() {
        let ranges = parse_records(Path::new("x.csv"), "0;4;a\n4;8;b\n").unwrap();
        assert_eq!(ranges.len(), 2);
    }
}
