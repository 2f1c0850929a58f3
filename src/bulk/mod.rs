//! Bulk keyword execution.
//!
//! Fans a keyword list out through the pool in contiguous batches with
//! bounded concurrency, adapts the inter-batch delay to pool pressure and
//! batch outcomes, and runs a bounded retry queue over the failures. One
//! keyword failing never cancels its siblings; failures are collected and
//! surfaced in the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;

use crate::config::{BulkSettings, ADAPTIVE_DELAY_CEILING, RETRY_BACKOFF_CEILING};
use crate::error_handling::{ErrorKind, TrackError};
use crate::models::{
    BulkResult, FailedLookup, PoolStats, QualityHistogram, RankingRecord, SearchOptions,
};
use crate::pool::SearchApiPool;

/// Progress event emitted between batches and after each retry pass.
#[derive(Debug, Clone)]
pub struct BulkProgress {
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pool: PoolStats,
    /// Set during retry passes.
    pub retry_attempt: Option<u32>,
}

/// Bulk keyword executor over a shared pool.
pub struct BulkExecutor {
    pool: Arc<SearchApiPool>,
    settings: BulkSettings,
}

impl BulkExecutor {
    pub fn new(pool: Arc<SearchApiPool>, settings: BulkSettings) -> Self {
        BulkExecutor { pool, settings }
    }

    /// Runs the full keyword list. Progress events go out over `progress`
    /// with `try_send`; a slow or dropped receiver loses events rather than
    /// stalling batches.
    pub async fn run(
        &self,
        keywords: Vec<String>,
        options: &SearchOptions,
        progress: Option<mpsc::Sender<BulkProgress>>,
    ) -> BulkResult {
        let started = Instant::now();
        let deadline = started + self.settings.time_budget;

        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let total = keywords.len();

        let mut records: Vec<RankingRecord> = Vec::new();
        let mut failures: Vec<FailedLookup> = Vec::new();
        let baseline = self.settings.inter_batch_delay;
        let mut delay = baseline;

        let batches: Vec<Vec<String>> = keywords
            .chunks(self.settings.batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();
        let batch_count = batches.len();

        info!(
            "Bulk run: {total} keyword(s) in {batch_count} batch(es), concurrency {}",
            self.settings.max_concurrent
        );

        let mut timed_out = false;
        for (batch_index, batch) in batches.into_iter().enumerate() {
            if timed_out || Instant::now() >= deadline {
                // Everything not yet started is reported as a timeout.
                for keyword in batch {
                    failures.push(budget_failure(keyword));
                }
                timed_out = true;
                continue;
            }

            let outcomes = self.run_batch(&batch, options).await;
            let batch_total = outcomes.len();
            let mut batch_succeeded = 0usize;
            for (keyword, outcome) in outcomes {
                match outcome {
                    Ok(record) => {
                        batch_succeeded += 1;
                        records.push(record);
                    }
                    Err(error) => failures.push(failure_from(keyword, &error, 0)),
                }
            }

            if batch_index + 1 < batch_count {
                let all_succeeded = batch_succeeded == batch_total;
                let success_rate = if batch_total == 0 {
                    100.0
                } else {
                    batch_succeeded as f64 / batch_total as f64 * 100.0
                };
                if self.settings.adaptive_delay {
                    let usage = self.pool.stats().await.usage_percent;
                    let next = next_delay(delay, baseline, usage, success_rate, all_succeeded);
                    if next != delay {
                        debug!(
                            "Adaptive delay {} -> {} ms (usage {usage:.1}%, batch success {success_rate:.1}%)",
                            delay.as_millis(),
                            next.as_millis()
                        );
                    }
                    delay = next;
                }
                tokio::time::sleep(delay).await;
                self.emit_progress(&progress, &records, &failures, total, None)
                    .await;
            }
        }

        if self.settings.retry_enabled && !failures.is_empty() && !timed_out {
            self.run_retry_passes(options, &mut records, &mut failures, total, &progress, deadline)
                .await;
        }

        let pool = self.pool.stats().await;
        let mut quality = QualityHistogram::default();
        for record in &records {
            quality.add(record.reliability);
        }

        BulkResult {
            total_processed: total,
            records,
            failures,
            elapsed_ms: started.elapsed().as_millis() as u64,
            pool,
            quality,
        }
    }

    /// Dispatches one batch with at most `max_concurrent` lookups in
    /// flight, isolating every task's outcome.
    async fn run_batch(
        &self,
        batch: &[String],
        options: &SearchOptions,
    ) -> Vec<(String, Result<RankingRecord, TrackError>)> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let mut tasks = FuturesUnordered::new();

        for (index, keyword) in batch.iter().enumerate() {
            let pool = Arc::clone(&self.pool);
            let semaphore = Arc::clone(&semaphore);
            let keyword = keyword.clone();
            let options = options.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("bulk semaphore is never closed");
                let result = pool.track(&keyword, &options).await;
                (index, keyword, result)
            }));
        }

        let mut outcomes: Vec<(usize, String, Result<RankingRecord, TrackError>)> = Vec::new();
        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_error) => {
                    warn!("Bulk task panicked: {join_error:?}");
                }
            }
        }
        // Report outcomes in submission order regardless of completion
        // order.
        outcomes.sort_by_key(|(index, _, _)| *index);
        outcomes
            .into_iter()
            .map(|(_, keyword, result)| (keyword, result))
            .collect()
    }

    /// Sequential retry passes over the failures that can still recover.
    async fn run_retry_passes(
        &self,
        options: &SearchOptions,
        records: &mut Vec<RankingRecord>,
        failures: &mut Vec<FailedLookup>,
        total: usize,
        progress: &Option<mpsc::Sender<BulkProgress>>,
        deadline: Instant,
    ) {
        let baseline = self.settings.inter_batch_delay;
        for attempt in 1..=self.settings.max_retries {
            let has_recoverable = failures.iter().any(|f| is_recoverable(f.kind));
            if !has_recoverable {
                break;
            }
            let backoff = (baseline * attempt).min(RETRY_BACKOFF_CEILING);
            tokio::time::sleep(backoff).await;

            let mut still_failed: Vec<FailedLookup> = Vec::new();
            for failure in failures.drain(..) {
                if !is_recoverable(failure.kind) || Instant::now() >= deadline {
                    still_failed.push(failure);
                    continue;
                }
                match self.pool.track(&failure.keyword, options).await {
                    Ok(record) => {
                        debug!("Retry {attempt} recovered '{}'", failure.keyword);
                        records.push(record);
                    }
                    Err(error) => {
                        still_failed.push(failure_from(
                            failure.keyword,
                            &error,
                            failure.retry_count + 1,
                        ));
                    }
                }
            }
            *failures = still_failed;

            self.emit_progress(progress, records, failures, total, Some(attempt))
                .await;

            if attempt < self.settings.max_retries
                && failures.iter().any(|f| is_recoverable(f.kind))
            {
                tokio::time::sleep(backoff * 2).await;
            }
        }
    }

    async fn emit_progress(
        &self,
        progress: &Option<mpsc::Sender<BulkProgress>>,
        records: &[RankingRecord],
        failures: &[FailedLookup],
        total: usize,
        retry_attempt: Option<u32>,
    ) {
        let Some(sender) = progress else { return };
        let event = BulkProgress {
            processed: records.len() + failures.len(),
            total,
            succeeded: records.len(),
            failed: failures.len(),
            pool: self.pool.stats().await,
            retry_attempt,
        };
        // Back-pressure policy: drop events on a full channel.
        let _ = sender.try_send(event);
    }
}

/// Next inter-batch delay.
///
/// Pool pressure or a weak batch grows the delay by half, capped at the
/// ceiling; a fully-clean batch lets it decay toward the baseline, never
/// below it.
fn next_delay(
    current: Duration,
    baseline: Duration,
    usage_percent: f64,
    batch_success_rate: f64,
    all_succeeded: bool,
) -> Duration {
    if usage_percent > 80.0 || batch_success_rate < 80.0 {
        current.mul_f64(1.5).min(ADAPTIVE_DELAY_CEILING)
    } else if all_succeeded && current > baseline {
        current.mul_f64(0.8).max(baseline)
    } else {
        current
    }
}

/// Whether a failed keyword is worth another pass. Rotation-level
/// exhaustion can lift (pauses expire, monthly headers reconcile), so it
/// stays in the queue.
fn is_recoverable(kind: ErrorKind) -> bool {
    kind.is_retryable() || kind == ErrorKind::AllExhausted || kind == ErrorKind::Unknown
}

fn failure_from(keyword: String, error: &TrackError, retry_count: u32) -> FailedLookup {
    FailedLookup {
        keyword,
        error: error.to_string(),
        kind: error.kind,
        at: Utc::now(),
        retry_count,
        credential_id: error.credential_id.clone(),
    }
}

fn budget_failure(keyword: String) -> FailedLookup {
    FailedLookup {
        keyword,
        error: "bulk time budget exhausted before the lookup started".to_string(),
        kind: ErrorKind::Timeout,
        at: Utc::now(),
        retry_count: 0,
        credential_id: None,
    }
}
