//! Search-API pool: credential selection and lookup execution.
//!
//! The pool is the process-wide coordinator. It owns the authoritative
//! in-memory credential list and an in-flight lock set; selection and lock
//! acquisition happen in a single critical section so two concurrent
//! lookups can never hold the same credential. Counter updates happen
//! in-memory first; durability is an asynchronous, idempotent upsert off
//! the critical path.

pub mod admin;
pub mod attempt;
pub mod stats;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{Datelike, Utc};
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tokio_util::sync::CancellationToken;

use crate::config::{RotationStrategy, TrackerConfig, MIN_NATIVE_SECRET_LEN, PLACEHOLDER_SECRET_MARKERS};
use crate::error_handling::{ErrorKind, StorageError, TrackError};
use crate::models::{
    Credential, CredentialOrigin, CredentialStatus, Provider, RankingRecord, SearchOptions,
    UsagePatch,
};
use crate::storage::{CredentialStore, RecordStore};

use attempt::{AttemptOutcome, USER_KEY_ID};

/// The subset of `TrackerConfig` the pool needs at runtime.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub rotation: RotationStrategy,
    pub request_timeout: Duration,
    pub rate_limit_pause: Duration,
    pub pool_max_retries: usize,
    pub native_serp_endpoint: String,
    pub custom_search_endpoint: String,
}

impl PoolSettings {
    fn from_config(config: &TrackerConfig) -> Self {
        PoolSettings {
            rotation: config.rotation,
            request_timeout: config.request_timeout,
            rate_limit_pause: config.rate_limit_pause,
            pool_max_retries: config.pool_max_retries,
            native_serp_endpoint: config.native_serp_endpoint.clone(),
            custom_search_endpoint: config.custom_search_endpoint.clone(),
        }
    }
}

/// Everything guarded by the pool mutex. The in-flight set lives next to
/// the credential list so select-and-lock is one atomic step.
struct PoolInner {
    credentials: Vec<Credential>,
    in_flight: HashSet<String>,
    rr_cursor: usize,
}

/// Process-wide pool of search-API credentials.
///
/// The inner state is shared behind `Arc` so the pause-restore timers can
/// outlive the call that spawned them.
pub struct SearchApiPool {
    pub(crate) settings: PoolSettings,
    inner: Arc<Mutex<PoolInner>>,
    pub(crate) store: CredentialStore,
    pub(crate) records: RecordStore,
    pub(crate) client: reqwest::Client,
    shutdown: CancellationToken,
}

impl SearchApiPool {
    /// Boots the pool: validates and numbers configured credentials, merges
    /// user-added ones from the store, reconciles counters, and runs the
    /// stale-month check.
    pub async fn init(
        config: &TrackerConfig,
        store: CredentialStore,
        records: RecordStore,
        client: reqwest::Client,
    ) -> anyhow::Result<Arc<Self>> {
        let now = Utc::now();
        let mut credentials: Vec<Credential> = Vec::new();
        let mut seen_secrets: HashSet<String> = HashSet::new();

        for entry in &config.configured_credentials {
            if let Err(reason) = validate_secret(entry.provider, &entry.secret) {
                warn!(
                    "Skipping configured credential {} #{}: {reason}",
                    entry.provider.as_str(),
                    entry.index
                );
                continue;
            }
            if !seen_secrets.insert(entry.secret.clone()) {
                warn!(
                    "Skipping configured credential {} #{}: duplicate secret",
                    entry.provider.as_str(),
                    entry.index
                );
                continue;
            }
            credentials.push(Credential {
                id: format!("{}-{}", entry.provider.as_str(), entry.index),
                provider: entry.provider,
                secret: entry.secret.clone(),
                search_engine_id: entry.search_engine_id.clone(),
                daily_limit: entry.daily_limit.max(1),
                monthly_limit: entry.monthly_limit,
                used_today: 0,
                used_this_month: 0,
                status: CredentialStatus::Active,
                priority: entry.priority.unwrap_or(entry.index as u32),
                last_used_at: None,
                error_count: 0,
                success_rate: 100.0,
                monthly_reset_at: now,
                origin: CredentialOrigin::Configured,
                created_at: now,
                updated_at: now,
            });
        }

        let stored = store
            .load_all()
            .await
            .context("Failed to load credentials from store")?;
        for row in stored {
            match row.origin {
                CredentialOrigin::Configured => {
                    // Reconcile quota counters for a configured credential
                    // that survived from a previous boot.
                    if let Some(cred) = credentials.iter_mut().find(|c| c.id == row.id) {
                        cred.used_today = row.used_today;
                        cred.used_this_month = row.used_this_month;
                        cred.status = row.status;
                        cred.error_count = row.error_count;
                        cred.success_rate = row.success_rate;
                        cred.last_used_at = row.last_used_at;
                        cred.monthly_reset_at = row.monthly_reset_at;
                        cred.created_at = row.created_at;
                    } else {
                        debug!("Stored configured credential {} has no environment entry", row.id);
                    }
                }
                CredentialOrigin::UserAdded => {
                    if seen_secrets.insert(row.secret.clone()) {
                        credentials.push(row);
                    } else {
                        warn!("Skipping stored credential {}: duplicate secret", row.id);
                    }
                }
            }
        }

        // A reconciled counter can already sit at its limit.
        for cred in &mut credentials {
            if cred.status == CredentialStatus::Active
                && (!cred.has_daily_capacity() || !cred.has_monthly_capacity())
            {
                cred.status = CredentialStatus::Exhausted;
            }
        }

        // Upsert every configured credential so absent rows get created and
        // reconciled ones reflect the normalized state.
        let to_persist: Vec<Credential> = credentials
            .iter()
            .filter(|c| c.origin == CredentialOrigin::Configured)
            .cloned()
            .collect();

        let pool = Arc::new(SearchApiPool {
            settings: PoolSettings::from_config(config),
            inner: Arc::new(Mutex::new(PoolInner {
                credentials,
                in_flight: HashSet::new(),
                rr_cursor: 0,
            })),
            store,
            records,
            client,
            shutdown: CancellationToken::new(),
        });

        // Boot-time writes may block; nothing is serving yet.
        for cred in to_persist {
            if let Err(e) = pool.store.upsert(&cred).await {
                warn!("Failed to persist configured credential {}: {e}", cred.id);
            }
        }

        if let Err(e) = pool.check_monthly_if_stale().await {
            warn!("Stale-month check failed: {e}");
        }

        {
            let inner = pool.inner.lock().await;
            info!(
                "Search-API pool initialized with {} credential(s), rotation {:?}",
                inner.credentials.len(),
                pool.settings.rotation
            );
        }
        Ok(pool)
    }

    /// Stops background timers spawned by the pool.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Atomically selects the highest-ranked available credential and marks
    /// it in-flight. Available means active, under both limits, matching
    /// provider, and not already serving a request.
    async fn select_and_lock(&self, provider: Provider) -> Option<Credential> {
        let mut inner = self.inner.lock().await;
        let rotation = self.settings.rotation;
        let PoolInner {
            credentials,
            in_flight,
            rr_cursor,
        } = &mut *inner;

        let available: Vec<usize> = credentials
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_available_for(provider) && !in_flight.contains(&c.id))
            .map(|(i, _)| i)
            .collect();
        if available.is_empty() {
            return None;
        }

        let chosen = match rotation {
            RotationStrategy::Priority => *available
                .iter()
                .min_by_key(|&&i| credentials[i].priority)
                .expect("available is non-empty"),
            RotationStrategy::LeastUsed => *available
                .iter()
                .min_by_key(|&&i| credentials[i].used_today)
                .expect("available is non-empty"),
            RotationStrategy::RoundRobin => {
                let idx = available[*rr_cursor % available.len()];
                *rr_cursor = rr_cursor.wrapping_add(1);
                idx
            }
        };

        let credential = credentials[chosen].clone();
        in_flight.insert(credential.id.clone());
        debug!(
            "Selected credential {} ({} used {}/{})",
            credential.id,
            credential.provider.as_str(),
            credential.used_today,
            credential.daily_limit
        );
        Some(credential)
    }

    /// Drops an in-flight lock without committing an outcome. The lookup
    /// path releases through `commit_success`/`commit_failure`.
    #[cfg(test)]
    async fn release(&self, id: &str) {
        self.inner.lock().await.in_flight.remove(id);
    }

    /// Executes one keyword lookup.
    ///
    /// A user-supplied secret takes a one-shot path with no pool mutation.
    /// Otherwise the pool rotates through credentials, at most
    /// `min(pool_size, configured_max)` attempts, handling quota, rate-limit
    /// and transient errors per credential along the way.
    pub async fn track(
        &self,
        keyword: &str,
        options: &SearchOptions,
    ) -> Result<RankingRecord, TrackError> {
        let started = Instant::now();
        let provider = options.provider.unwrap_or(Provider::NativeSerp);

        if let Some(secret) = options.api_key.as_deref() {
            return self.track_with_user_key(keyword, options, provider, secret, started).await;
        }

        let pool_size = self.inner.lock().await.credentials.len();
        if pool_size == 0 {
            return Err(TrackError::new(
                ErrorKind::AllExhausted,
                "credential pool is empty",
            ));
        }
        // One initial attempt plus up to min(pool_size, configured) rotations.
        // A retry that finds nothing left to select surfaces as
        // all_exhausted, which is how a single-credential pool reports a
        // rate-limit pause.
        let max_retries = self.settings.pool_max_retries.min(pool_size).max(1);

        let mut last_failure: Option<(ErrorKind, String, String)> = None;
        for attempt in 0..=max_retries {
            let Some(credential) = self.select_and_lock(provider).await else {
                return Err(TrackError::new(
                    ErrorKind::AllExhausted,
                    match last_failure {
                        Some((kind, ref message, _)) => {
                            format!("no available credential after {kind}: {message}")
                        }
                        None => "no credential satisfies selection".to_string(),
                    },
                ));
            };

            match self
                .execute_attempt(&credential, keyword, options, started)
                .await
            {
                AttemptOutcome::Success(record, usage) => {
                    if let Some(patch) = self.commit_success(&credential.id, usage).await {
                        spawn_usage_upsert(self.store.clone(), credential.id.clone(), patch);
                    }
                    if let Err(e) = self.records.insert(&record).await {
                        warn!("Failed to persist ranking record for '{keyword}': {e}");
                    }
                    return Ok(*record);
                }
                AttemptOutcome::Retryable { kind, message } => {
                    debug!(
                        "Attempt {} on {} failed with {kind}: {message}",
                        attempt + 1,
                        credential.id
                    );
                    if let Some(patch) = self.commit_failure(&credential.id, kind).await {
                        spawn_usage_upsert(self.store.clone(), credential.id.clone(), patch);
                    }
                    last_failure = Some((kind, message, credential.id));
                }
                AttemptOutcome::Fatal { kind, message } => {
                    if let Some(patch) = self.commit_failure(&credential.id, kind).await {
                        spawn_usage_upsert(self.store.clone(), credential.id.clone(), patch);
                    }
                    return Err(TrackError::new(kind, message).with_credential(credential.id));
                }
            }
        }

        let (kind, message, credential_id) = last_failure.unwrap_or((
            ErrorKind::Unknown,
            "lookup failed".to_string(),
            String::new(),
        ));
        let mut error = TrackError::new(kind, format!("retries exhausted: {message}"));
        if !credential_id.is_empty() {
            error = error.with_credential(credential_id);
        }
        Err(error)
    }

    /// One-shot lookup with a caller-provided secret. Failures surface as
    /// `invalid_request`; the pool is never mutated.
    async fn track_with_user_key(
        &self,
        keyword: &str,
        options: &SearchOptions,
        provider: Provider,
        secret: &str,
        started: Instant,
    ) -> Result<RankingRecord, TrackError> {
        let now = Utc::now();
        let credential = Credential {
            id: USER_KEY_ID.to_string(),
            provider,
            secret: secret.to_string(),
            search_engine_id: options.extra_params.get("search_engine_id").cloned(),
            daily_limit: u32::MAX,
            monthly_limit: 0,
            used_today: 0,
            used_this_month: 0,
            status: CredentialStatus::Active,
            priority: 1,
            last_used_at: None,
            error_count: 0,
            success_rate: 100.0,
            monthly_reset_at: now,
            origin: CredentialOrigin::UserAdded,
            created_at: now,
            updated_at: now,
        };

        match self
            .execute_attempt(&credential, keyword, options, started)
            .await
        {
            AttemptOutcome::Success(record, _) => {
                if let Err(e) = self.records.insert(&record).await {
                    warn!("Failed to persist ranking record for '{keyword}': {e}");
                }
                Ok(*record)
            }
            AttemptOutcome::Retryable { message, .. }
            | AttemptOutcome::Fatal { message, .. } => Err(TrackError::new(
                ErrorKind::InvalidRequest,
                format!("user-supplied key lookup failed: {message}"),
            )),
        }
    }

    /// Applies a successful call to the serving credential and releases its
    /// in-flight lock. Returns the usage patch to persist asynchronously.
    async fn commit_success(
        &self,
        id: &str,
        usage: Option<crate::providers::AccountUsage>,
    ) -> Option<UsagePatch> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(id);
        let cred = inner.credentials.iter_mut().find(|c| c.id == id)?;
        cred.record_success(Utc::now());

        if let Some(usage) = usage {
            if let Some(limit) = usage.monthly_limit {
                if limit > 0 {
                    cred.monthly_limit = limit.min(u64::from(u32::MAX)) as u32;
                }
            }
            if let Some(used) = usage.effective_used() {
                cred.used_this_month = used.min(u64::from(u32::MAX)) as u32;
            }
            if cred.status == CredentialStatus::Active && !cred.has_monthly_capacity() {
                cred.status = CredentialStatus::Exhausted;
            }
        }
        Some(cred.usage_patch())
    }

    /// Applies a failed call: quota marks the credential exhausted,
    /// rate-limit pauses it for the configured window, an auth failure
    /// parks it in error state. Always releases the in-flight lock.
    async fn commit_failure(&self, id: &str, kind: ErrorKind) -> Option<UsagePatch> {
        let mut pause_prior: Option<CredentialStatus> = None;
        let patch = {
            let mut inner = self.inner.lock().await;
            inner.in_flight.remove(id);
            let cred = inner.credentials.iter_mut().find(|c| c.id == id)?;
            cred.record_failure(Utc::now());
            match kind {
                ErrorKind::QuotaExceeded => cred.status = CredentialStatus::Exhausted,
                ErrorKind::RateLimited => {
                    pause_prior = Some(cred.status);
                    cred.status = CredentialStatus::Paused;
                }
                ErrorKind::Unauthorized => cred.status = CredentialStatus::Error,
                _ => {}
            }
            Some(cred.usage_patch())
        };

        if let Some(prior) = pause_prior {
            self.spawn_unpause(id.to_string(), prior);
        }
        patch
    }

    /// Restores a paused credential's prior status after the rate-limit
    /// window, unless something else changed it meanwhile.
    fn spawn_unpause(&self, id: String, prior: CredentialStatus) {
        let inner = Arc::clone(&self.inner);
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        let pause = self.settings.rate_limit_pause;
        info!(
            "Credential {id} rate-limited; pausing for {} ms",
            pause.as_millis()
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.cancelled() => return,
            }
            let patch = {
                let mut inner = inner.lock().await;
                let Some(cred) = inner.credentials.iter_mut().find(|c| c.id == id) else {
                    return;
                };
                if cred.status != CredentialStatus::Paused {
                    return;
                }
                cred.status = prior;
                if cred.status == CredentialStatus::Active
                    && (!cred.has_daily_capacity() || !cred.has_monthly_capacity())
                {
                    cred.status = CredentialStatus::Exhausted;
                }
                cred.updated_at = Utc::now();
                info!("Credential {id} resumed as {}", cred.status.as_str());
                cred.usage_patch()
            };
            spawn_usage_upsert(store, id, patch);
        });
    }

    /// Zeroes daily counters, clears error counts, and reactivates every
    /// credential that is not paused.
    pub async fn reset_daily_all(&self) -> Result<(), StorageError> {
        let now = Utc::now();
        {
            let mut inner = self.inner.lock().await;
            for cred in &mut inner.credentials {
                cred.used_today = 0;
                cred.error_count = 0;
                if cred.status != CredentialStatus::Paused {
                    cred.status = CredentialStatus::Active;
                }
                cred.updated_at = now;
            }
        }
        info!("Daily counters reset");
        self.store.reset_daily_all(now.timestamp_millis()).await?;
        Ok(())
    }

    /// Zeroes monthly counters, reopens exhausted credentials whose daily
    /// counter is still under limit, and stamps the new reset time.
    pub async fn reset_monthly_all(&self) -> Result<(), StorageError> {
        let now = Utc::now();
        {
            let mut inner = self.inner.lock().await;
            for cred in &mut inner.credentials {
                cred.used_this_month = 0;
                cred.monthly_reset_at = now;
                if cred.status == CredentialStatus::Exhausted && cred.has_daily_capacity() {
                    cred.status = CredentialStatus::Active;
                }
                cred.updated_at = now;
            }
        }
        info!("Monthly counters reset");
        self.store
            .reset_monthly_all(now.timestamp_millis())
            .await?;
        Ok(())
    }

    /// Triggers a monthly reset once when any credential's stored reset
    /// time lies in a prior calendar month. Covers down-time across a month
    /// boundary.
    pub async fn check_monthly_if_stale(&self) -> Result<(), StorageError> {
        let now = Utc::now();
        let stale = {
            let inner = self.inner.lock().await;
            inner.credentials.iter().any(|c| {
                let reset = c.monthly_reset_at;
                reset.year() < now.year()
                    || (reset.year() == now.year() && reset.month() < now.month())
            })
        };
        if stale {
            info!("Stored monthly reset lies in a prior month; resetting monthly counters");
            self.reset_monthly_all().await?;
        }
        Ok(())
    }

    /// Runs `f` over the credential list under the pool mutex.
    pub(crate) async fn with_credentials<R>(
        &self,
        f: impl FnOnce(&mut Vec<Credential>) -> R,
    ) -> R {
        let mut inner = self.inner.lock().await;
        f(&mut inner.credentials)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        settings: PoolSettings,
        store: CredentialStore,
        records: RecordStore,
        client: reqwest::Client,
        credentials: Vec<Credential>,
    ) -> Arc<Self> {
        Arc::new(SearchApiPool {
            settings,
            inner: Arc::new(Mutex::new(PoolInner {
                credentials,
                in_flight: HashSet::new(),
                rr_cursor: 0,
            })),
            store,
            records,
            client,
            shutdown: CancellationToken::new(),
        })
    }
}

/// Schedules the idempotent durability write for a credential's usage
/// columns; never blocks the lookup path.
fn spawn_usage_upsert(store: CredentialStore, id: String, patch: UsagePatch) {
    tokio::spawn(async move {
        let strategy = ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(5))
            .take(3);
        let result = Retry::spawn(strategy, || {
            let store = store.clone();
            let patch = patch.clone();
            let id = id.clone();
            async move { store.upsert_usage(&id, &patch).await }
        })
        .await;
        if let Err(e) = result {
            warn!("Failed to persist usage for credential {id}: {e}");
        }
    });
}

/// Rejects empty, short, or placeholder secrets. Native-SERP secrets must
/// carry at least 32 characters.
pub(crate) fn validate_secret(provider: Provider, secret: &str) -> Result<(), String> {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return Err("secret is empty".to_string());
    }
    let lower = trimmed.to_lowercase();
    if lower.contains("your_") && lower.contains("_here") {
        return Err("secret looks like a placeholder".to_string());
    }
    for marker in PLACEHOLDER_SECRET_MARKERS {
        if lower.contains(&marker.to_lowercase()) {
            return Err("secret looks like a placeholder".to_string());
        }
    }
    if provider == Provider::NativeSerp && trimmed.len() < MIN_NATIVE_SECRET_LEN {
        return Err(format!(
            "secret is too short ({} < {MIN_NATIVE_SECRET_LEN} characters)",
            trimmed.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
