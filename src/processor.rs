//! Chunk processing loop.
//!
//! [`ChunkProcessor::continue_processing`] advances a full bundle by up to
//! `max_chunks` chunks, strictly in index order, and returns. There is no
//! background scheduler: callers pull progress by calling again.
//!
//! # Mutual Exclusion
//!
//! A call first claims the bundle's processing lease through the store's
//! atomic check-and-set. A second concurrent caller fails the claim and
//! returns the current state with `processed = 0` without calling the
//! extractor. Every chunk commit is keyed on the lease and pushes its
//! expiry out by another `lease_ttl_secs`, so a long batch keeps it. A
//! batch whose lease lapsed and was claimed by another caller finds its
//! next commit superseded, writes nothing, and ends with the stored
//! state. The lease is released when the batch ends, including on error
//! paths, and expires if a process dies holding it.
//!
//! # Retry
//!
//! A transient extractor failure is retried after
//! `backoff_base_ms × 2^(attempt-1)` (capped at `backoff_max_ms`), up to
//! `max_attempts` total attempts. A permanent failure, or the last failed
//! attempt, marks the bundle `failed` with `last_error` and ends the
//! batch. Chunks committed earlier stay committed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bundle_harness_core::chunk::{compose_chunk_text, ChunkPlanner};
use bundle_harness_core::error::{BundleError, BundleResult, ExtractionError};
use bundle_harness_core::extract::ChunkExtractor;
use bundle_harness_core::models::{AnalysisLevel, Bundle, BundleStatus, ChunkExtraction, Scope};
use bundle_harness_core::store::{CommitOutcome, Store};

use crate::config::ProcessingConfig;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Exponential backoff schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, after `attempt` failures.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8_000),
        }
    }
}

/// A failure that ended a retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
    pub error: ExtractionError,
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// `on_retry(attempt, delay, error)` is called before each backoff sleep.
pub async fn with_retry<T, F, Fut, R>(policy: &RetryPolicy, mut op: F, mut on_retry: R) -> Result<T, Exhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractionError>>,
    R: FnMut(u32, Duration, &ExtractionError),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                on_retry(attempt, delay, &error);
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(Exhausted {
                    attempts: attempt,
                    error,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub retry: RetryPolicy,
    pub lease_ttl: chrono::Duration,
    pub default_batch: u32,
    pub max_batch: u32,
}

impl ProcessorSettings {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: Duration::from_millis(config.backoff_base_ms),
                max_delay: Duration::from_millis(config.backoff_max_ms),
            },
            lease_ttl: chrono::Duration::seconds(config.lease_ttl_secs as i64),
            default_batch: config.default_batch,
            max_batch: config.max_batch,
        }
    }

    /// Resolve a caller's `max_chunks` into a batch size.
    pub fn batch_size(&self, requested: Option<u32>) -> BundleResult<u32> {
        match requested {
            Some(0) => Err(BundleError::validation("maxChunks must be at least 1")),
            Some(n) => Ok(n.min(self.max_batch)),
            None => Ok(self.default_batch.min(self.max_batch)),
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

/// Result of one continue call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueOutcome {
    pub bundle: Bundle,
    /// Chunks committed by this call.
    pub processed: u32,
    pub remaining: u32,
    pub is_complete: bool,
}

impl ContinueOutcome {
    fn new(bundle: Bundle, processed: u32) -> Self {
        Self {
            remaining: bundle.remaining(),
            is_complete: bundle.is_complete(),
            processed,
            bundle,
        }
    }
}

/// Advances full bundles chunk by chunk.
pub struct ChunkProcessor {
    store: Arc<dyn Store>,
    extractor: Arc<dyn ChunkExtractor>,
    settings: ProcessorSettings,
}

impl ChunkProcessor {
    pub fn new(store: Arc<dyn Store>, extractor: Arc<dyn ChunkExtractor>, settings: ProcessorSettings) -> Self {
        Self {
            store,
            extractor,
            settings,
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Process up to `max_chunks` of the bundle's remaining chunks.
    ///
    /// `None` uses `default_batch`; values above `max_batch` are clamped;
    /// `Some(0)` is a validation error. Idempotent once the bundle is
    /// complete, and a no-op while another caller holds the lease.
    pub async fn continue_processing(
        &self,
        scope: &Scope,
        bundle_id: &str,
        max_chunks: Option<u32>,
        progress: &dyn ProgressReporter,
    ) -> BundleResult<ContinueOutcome> {
        let batch = self.settings.batch_size(max_chunks)?;

        let bundle = self
            .store
            .get_bundle(scope, bundle_id)
            .await?
            .ok_or_else(|| BundleError::bundle_not_found(bundle_id))?;

        if bundle.analysis_level != AnalysisLevel::Full {
            return Err(BundleError::validation(
                "phase-A bundles are analysed in one pass and have no chunks to process",
            ));
        }

        if bundle.processed_chunks >= bundle.total_chunks {
            let bundle = if bundle.status != BundleStatus::Completed {
                self.store
                    .set_status(scope, bundle_id, BundleStatus::Completed, None)
                    .await?
            } else {
                bundle
            };
            return Ok(ContinueOutcome::new(bundle, 0));
        }

        let lease_id = Uuid::new_v4().to_string();
        let acquired = self
            .store
            .try_acquire_lease(scope, bundle_id, &lease_id, Utc::now(), self.settings.lease_ttl)
            .await?;
        if !acquired {
            info!(bundle_id, "bundle is being processed by another caller; skipping");
            progress.report(ProgressEvent::Busy {
                bundle_id: bundle_id.to_string(),
            });
            return Ok(ContinueOutcome::new(bundle, 0));
        }

        let result = self.run_batch(scope, bundle, &lease_id, batch, progress).await;

        if let Err(e) = self.store.release_lease(scope, bundle_id, &lease_id).await {
            warn!(bundle_id, error = %e, "failed to release processing lease");
        }
        result
    }

    async fn run_batch(
        &self,
        scope: &Scope,
        mut bundle: Bundle,
        lease_id: &str,
        batch: u32,
        progress: &dyn ProgressReporter,
    ) -> BundleResult<ContinueOutcome> {
        if matches!(bundle.status, BundleStatus::Pending | BundleStatus::Failed) {
            if bundle.status == BundleStatus::Failed {
                info!(
                    bundle_id = %bundle.id,
                    chunk_index = bundle.processed_chunks,
                    "resuming failed bundle"
                );
            }
            bundle = self
                .store
                .set_status(scope, &bundle.id, BundleStatus::Processing, bundle.last_error.as_deref())
                .await?;
        }

        progress.report(ProgressEvent::BatchStarted {
            bundle_id: bundle.id.clone(),
            processed: bundle.processed_chunks,
            total: bundle.total_chunks,
            batch,
        });

        let planner = ChunkPlanner::new(bundle.chunk_size);
        let mut processed = 0;

        while processed < batch && bundle.processed_chunks < bundle.total_chunks {
            let index = bundle.processed_chunks;
            let range = planner.range(bundle.page_count, index).ok_or_else(|| {
                BundleError::Store(anyhow::anyhow!(
                    "bundle {} has no chunk {} ({} pages)",
                    bundle.id,
                    index,
                    bundle.page_count
                ))
            })?;

            let pages = self
                .store
                .page_range(scope, &bundle.id, range.start_page, range.end_page)
                .await?;
            let text = compose_chunk_text(pages.iter().map(|(n, t)| (*n, t.as_str())));

            debug!(bundle_id = %bundle.id, chunk_index = index, pages = ?(range.start_page, range.end_page), "extracting chunk");
            let bundle_id = bundle.id.clone();
            let extracted = with_retry(
                &self.settings.retry,
                || self.extractor.extract(&text),
                |attempt, delay, error| {
                    warn!(
                        bundle_id = %bundle_id,
                        chunk_index = index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient extraction failure; retrying"
                    );
                    progress.report(ProgressEvent::Retrying {
                        bundle_id: bundle_id.clone(),
                        chunk_index: index,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        message: error.to_string(),
                    });
                },
            )
            .await;

            match extracted {
                Ok(payload) => {
                    let extraction = ChunkExtraction::new(&bundle.id, &range, payload, &text);
                    let renew_until = Utc::now() + self.settings.lease_ttl;
                    let committed = match self
                        .store
                        .commit_chunk(scope, &extraction, lease_id, renew_until)
                        .await?
                    {
                        CommitOutcome::Committed(updated) => updated,
                        CommitOutcome::Superseded(current) => {
                            warn!(
                                bundle_id = %current.id,
                                chunk_index = index,
                                "processing lease lost; ending batch without committing"
                            );
                            progress.report(ProgressEvent::Busy {
                                bundle_id: current.id.clone(),
                            });
                            bundle = current;
                            break;
                        }
                    };
                    bundle = committed;
                    processed += 1;
                    progress.report(ProgressEvent::ChunkCompleted {
                        bundle_id: bundle.id.clone(),
                        chunk_index: index,
                        processed: bundle.processed_chunks,
                        total: bundle.total_chunks,
                    });
                }
                Err(Exhausted { attempts, error }) => {
                    let fatal = BundleError::FatalProcessing {
                        chunk_index: index,
                        attempts,
                        message: error.to_string(),
                    };
                    warn!(bundle_id = %bundle.id, error = %fatal, "chunk failed; marking bundle failed");
                    bundle = self
                        .store
                        .set_status(scope, &bundle.id, BundleStatus::Failed, Some(&fatal.to_string()))
                        .await?;
                    progress.report(ProgressEvent::ChunkFailed {
                        bundle_id: bundle.id.clone(),
                        chunk_index: index,
                        attempts,
                        message: error.to_string(),
                    });
                    break;
                }
            }
        }

        info!(
            bundle_id = %bundle.id,
            processed,
            done = bundle.processed_chunks,
            total = bundle.total_chunks,
            status = %bundle.status,
            "batch finished"
        );
        Ok(ContinueOutcome::new(bundle, processed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        let delays: Vec<u128> = (1..=5).map(|a| policy.delay_after(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn batch_size_validates_and_clamps() {
        let settings = ProcessorSettings::default();
        assert!(matches!(settings.batch_size(Some(0)), Err(BundleError::Validation(_))));
        assert_eq!(settings.batch_size(None).unwrap(), 3);
        assert_eq!(settings.batch_size(Some(1000)).unwrap(), settings.max_batch);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();
        let result = with_retry(
            &fast_policy(3),
            || {
                let calls = &calls;
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ExtractionError::Transient("429".into()))
                    } else {
                        Ok("done")
                    }
                }
            },
            |attempt, _, _| retries.push(attempt),
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            &fast_policy(3),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ExtractionError::Transient("timeout".into())) }
            },
            |_, _, _| {},
        )
        .await;
        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            &fast_policy(3),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ExtractionError::Permanent("bad request".into())) }
            },
            |_, _, _| {},
        )
        .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
