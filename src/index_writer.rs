//! Batched upserts to the external index API.
//!
//! The index service is rate limited and size limited, so the writer wraps
//! every batch in a small state machine:
//!
//! - `RateLimited` → exponential backoff with jitter, up to a retry ceiling;
//!   exceeding the ceiling fails the current file, not the run
//! - `PayloadTooLarge` → split the batch in half and resubmit, down to a
//!   configured floor; items rejected at the floor are counted failed
//! - `Fatal` (auth, quota, unexpected provider errors) → propagated so the
//!   orchestrator can abort the whole run
//!
//! Record ids are deterministic hashes of `(source path, ordinal, chunk
//! hash)`, so resubmitting after a crash upserts in place instead of
//! duplicating.

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::models::IndexRecord;

const MAX_BACKOFF: Duration = Duration::from_secs(32);

#[derive(Debug, Error)]
pub enum IndexError {
    /// Transient provider pushback; the writer retries with backoff.
    #[error("index provider rate limited: {0}")]
    RateLimited(String),
    /// Batch rejected for size; the writer splits and resubmits.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    /// Retry ceiling reached. Fails the current file; the run continues.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },
    /// Unrecoverable provider failure. Aborts the run.
    #[error("fatal index provider error: {0}")]
    Fatal(String),
}

/// Seam to the index service. Implementations must tolerate the same batch
/// being submitted more than once.
#[async_trait]
pub trait IndexClient: Send + Sync {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError>;
}

/// Outcome of writing one file's records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    /// Records rejected for size at the minimum batch size.
    pub failed: usize,
}

/// Terminal failure from [`IndexWriter::write`], carrying how many records
/// the index acknowledged before the writer gave up.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct WriteFailure {
    pub written: usize,
    #[source]
    pub source: IndexError,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub min_batch_size: usize,
}

impl RetryPolicy {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            min_batch_size: config.min_batch_size,
        }
    }

    /// Capped exponential backoff plus up to 25% jitter so concurrent
    /// workers do not retry in lockstep.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << attempt.min(5));
        let capped = exp.min(MAX_BACKOFF);
        let jitter_ms = rand::rng().random_range(0..=capped.as_millis() as u64 / 4);
        capped + Duration::from_millis(jitter_ms)
    }
}

pub struct IndexWriter {
    client: Arc<dyn IndexClient>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl IndexWriter {
    pub fn new(client: Arc<dyn IndexClient>, config: &IndexConfig) -> Self {
        Self {
            client,
            policy: RetryPolicy::from_config(config),
            batch_size: config.batch_size,
        }
    }

    #[cfg(test)]
    fn with_policy(client: Arc<dyn IndexClient>, policy: RetryPolicy, batch_size: usize) -> Self {
        Self {
            client,
            policy,
            batch_size,
        }
    }

    /// Writes all records in `batch_size` batches. `Err` carries only the
    /// terminal variants, `RetryExhausted` (file-level) and `Fatal`
    /// (run-level), along with the count already acknowledged; size
    /// rejections at the floor land in the report instead.
    pub async fn write(&self, records: &[IndexRecord]) -> Result<WriteReport, WriteFailure> {
        let mut report = WriteReport::default();
        for batch in records.chunks(self.batch_size) {
            match self.send_batch(batch).await {
                Ok(partial) => {
                    report.written += partial.written;
                    report.failed += partial.failed;
                }
                Err(source) => {
                    return Err(WriteFailure {
                        written: report.written,
                        source,
                    })
                }
            }
        }
        Ok(report)
    }

    fn send_batch<'a>(
        &'a self,
        batch: &'a [IndexRecord],
    ) -> Pin<Box<dyn Future<Output = Result<WriteReport, IndexError>> + Send + 'a>> {
        Box::pin(async move {
            let mut attempt: u32 = 0;
            loop {
                match self.client.upsert(batch).await {
                    Ok(()) => {
                        return Ok(WriteReport {
                            written: batch.len(),
                            failed: 0,
                        })
                    }
                    Err(IndexError::RateLimited(last)) => {
                        if attempt >= self.policy.max_retries {
                            return Err(IndexError::RetryExhausted {
                                attempts: attempt + 1,
                                last,
                            });
                        }
                        let delay = self.policy.backoff_delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "index rate limited, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(IndexError::PayloadTooLarge(message)) => {
                        if batch.len() <= self.policy.min_batch_size.max(1) {
                            warn!(
                                batch = batch.len(),
                                message, "batch rejected at the split floor, counting as failed"
                            );
                            return Ok(WriteReport {
                                written: 0,
                                failed: batch.len(),
                            });
                        }
                        debug!(batch = batch.len(), "payload too large, splitting batch");
                        let mid = batch.len() / 2;
                        let left = self.send_batch(&batch[..mid]).await?;
                        let right = self.send_batch(&batch[mid..]).await?;
                        return Ok(WriteReport {
                            written: left.written + right.written,
                            failed: left.failed + right.failed,
                        });
                    }
                    Err(other) => return Err(other),
                }
            }
        })
    }
}

/// SHA-256 hex of a chunk's text.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic record id over `(source path, chunk ordinal, chunk hash)`.
/// The same chunk of the same file always maps to the same id, making
/// resubmission an upsert no-op.
pub fn record_id(source_path: &str, ordinal: usize, chunk_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(chunk_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Client for the index service's batch upsert endpoint.
pub struct HttpIndexClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpIndexClient {
    pub fn new(config: &IndexConfig) -> Result<Self, IndexError> {
        let api_key = match &config.api_key_env {
            Some(var) => {
                let key = std::env::var(var)
                    .map_err(|_| IndexError::Fatal(format!("{var} environment variable not set")))?;
                Some(key)
            }
            None => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Fatal(format!("failed to build HTTP client: {e}")))?;

        let url = format!(
            "{}/collections/{}/upsert",
            config.url.trim_end_matches('/'),
            config.collection
        );

        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl IndexClient for HttpIndexClient {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
        let body = serde_json::json!({
            "ids": records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            "documents": records.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
            "metadatas": records.iter().map(|r| &r.metadata).collect::<Vec<_>>(),
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        // Network errors are treated as transient, same as a 429.
        let response = request
            .send()
            .await
            .map_err(|e| IndexError::RateLimited(format!("network error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            429 => Err(IndexError::RateLimited(format!("{status}: {text}"))),
            413 => Err(IndexError::PayloadTooLarge(format!("{status}: {text}"))),
            401 | 402 | 403 => Err(IndexError::Fatal(format!("{status}: {text}"))),
            _ if status.is_server_error() => {
                Err(IndexError::RateLimited(format!("{status}: {text}")))
            }
            _ => Err(IndexError::Fatal(format!("{status}: {text}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use std::sync::Mutex;

    fn record(n: usize) -> IndexRecord {
        let text = format!("chunk {n}");
        IndexRecord {
            id: record_id("/docs/a.pdf", n, &hash_text(&text)),
            text,
            metadata: ChunkMetadata {
                source: "a".to_string(),
                source_path: "/docs/a.pdf".to_string(),
                year: "2024".to_string(),
                doc_type: "report".to_string(),
                project: "unknown".to_string(),
                author: "unknown".to_string(),
                section: "unknown".to_string(),
            },
        }
    }

    fn records(n: usize) -> Vec<IndexRecord> {
        (0..n).map(record).collect()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            min_batch_size: 2,
        }
    }

    /// Scripted client: pops one canned response per call, records batch sizes.
    struct ScriptedClient {
        script: Mutex<Vec<Result<(), IndexError>>>,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedClient {
        fn new(mut script: Vec<Result<(), IndexError>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IndexClient for ScriptedClient {
        async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
            self.calls.lock().unwrap().push(records.len());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(()))
        }
    }

    /// Rejects any batch larger than `limit` as too large.
    struct SizeLimitedClient {
        limit: usize,
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl IndexClient for SizeLimitedClient {
        async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
            self.calls.lock().unwrap().push(records.len());
            if records.len() > self.limit {
                Err(IndexError::PayloadTooLarge("too big".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn rate_limited_once_then_succeeds() {
        let client = ScriptedClient::new(vec![
            Err(IndexError::RateLimited("429".to_string())),
            Ok(()),
        ]);
        let writer = IndexWriter::with_policy(client.clone(), policy(), 100);
        let report = writer.write(&records(5)).await.unwrap();
        assert_eq!(report, WriteReport { written: 5, failed: 0 });
        assert_eq!(client.calls(), vec![5, 5]);
    }

    #[tokio::test]
    async fn retry_ceiling_escalates_to_exhausted() {
        let client = ScriptedClient::new(vec![
            Err(IndexError::RateLimited("429".to_string())),
            Err(IndexError::RateLimited("429".to_string())),
            Err(IndexError::RateLimited("429".to_string())),
            Err(IndexError::RateLimited("429".to_string())),
        ]);
        let writer = IndexWriter::with_policy(client.clone(), policy(), 100);
        let err = writer.write(&records(5)).await.unwrap_err();
        assert_eq!(err.written, 0);
        match err.source {
            IndexError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert_eq!(client.calls().len(), 4);
    }

    #[tokio::test]
    async fn exhausted_write_reports_acknowledged_records() {
        // First batch lands, second batch hits the retry ceiling.
        let client = ScriptedClient::new(vec![
            Ok(()),
            Err(IndexError::RateLimited("429".to_string())),
            Err(IndexError::RateLimited("429".to_string())),
            Err(IndexError::RateLimited("429".to_string())),
            Err(IndexError::RateLimited("429".to_string())),
        ]);
        let writer = IndexWriter::with_policy(client.clone(), policy(), 4);
        let err = writer.write(&records(8)).await.unwrap_err();
        assert_eq!(err.written, 4);
        assert!(matches!(err.source, IndexError::RetryExhausted { .. }));
        assert_eq!(client.calls(), vec![4, 4, 4, 4, 4]);
    }

    #[tokio::test]
    async fn oversized_batch_splits_until_accepted() {
        let client = Arc::new(SizeLimitedClient {
            limit: 4,
            calls: Mutex::new(Vec::new()),
        });
        let writer = IndexWriter::with_policy(client.clone(), policy(), 100);
        let report = writer.write(&records(16)).await.unwrap();
        assert_eq!(report, WriteReport { written: 16, failed: 0 });

        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls[0], 16);
        // Every accepted batch respects the provider limit.
        let accepted: usize = calls.iter().filter(|&&n| n <= 4).sum();
        assert_eq!(accepted, 16);
    }

    #[tokio::test]
    async fn floor_rejection_counts_items_failed_without_aborting() {
        let client = Arc::new(SizeLimitedClient {
            limit: 0,
            calls: Mutex::new(Vec::new()),
        });
        let writer = IndexWriter::with_policy(client, policy(), 100);
        let report = writer.write(&records(8)).await.unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(report.failed, 8);
    }

    #[tokio::test]
    async fn fatal_propagates_immediately() {
        let client = ScriptedClient::new(vec![Err(IndexError::Fatal("401".to_string()))]);
        let writer = IndexWriter::with_policy(client.clone(), policy(), 100);
        let err = writer.write(&records(3)).await.unwrap_err();
        assert!(matches!(err.source, IndexError::Fatal(_)));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn records_are_written_in_batches() {
        let client = ScriptedClient::new(vec![]);
        let writer = IndexWriter::with_policy(client.clone(), policy(), 4);
        let report = writer.write(&records(10)).await.unwrap();
        assert_eq!(report.written, 10);
        assert_eq!(client.calls(), vec![4, 4, 2]);
    }

    #[test]
    fn record_ids_are_deterministic_and_distinct() {
        let hash = hash_text("same text");
        let a = record_id("/docs/a.pdf", 0, &hash);
        assert_eq!(a, record_id("/docs/a.pdf", 0, &hash));
        assert_ne!(a, record_id("/docs/a.pdf", 1, &hash));
        assert_ne!(a, record_id("/docs/b.pdf", 0, &hash));
        assert_ne!(a, record_id("/docs/a.pdf", 0, &hash_text("other text")));
    }
}
