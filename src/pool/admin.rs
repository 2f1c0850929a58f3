//! Credential lifecycle operations: add, update, remove, test.

use std::time::Instant;

use chrono::Utc;
use log::{info, warn};

use crate::error_handling::{ErrorKind, TrackError};
use crate::models::{
    Credential, CredentialOrigin, CredentialStatus, Provider, SearchOptions,
};

use super::attempt::{AttemptOutcome, USER_KEY_ID};
use super::{validate_secret, SearchApiPool};

/// Keyword used to probe a candidate secret against its provider.
const PROBE_KEYWORD: &str = "test query";
/// Domain/country context for the probe.
const PROBE_DOMAIN: &str = "example.com";
const PROBE_COUNTRY: &str = "US";

/// Request to add a credential to the pool.
#[derive(Debug, Clone)]
pub struct AddCredentialRequest {
    pub provider: Provider,
    pub secret: String,
    pub search_engine_id: Option<String>,
    pub daily_limit: Option<u32>,
    pub monthly_limit: Option<u32>,
}

/// Mutable fields of a stored credential.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub daily_limit: Option<u32>,
    pub monthly_limit: Option<u32>,
    pub priority: Option<u32>,
}

impl SearchApiPool {
    /// Validates, probes, and appends a user-added credential. Returns the
    /// new credential's id.
    ///
    /// A duplicate of another user-added secret is rejected; a duplicate of
    /// a configured secret is allowed with a warning. A rate-limited probe
    /// surfaces as `rate_limited` so callers can retry instead of treating
    /// the key as invalid.
    pub async fn add(&self, request: AddCredentialRequest) -> Result<String, TrackError> {
        validate_secret(request.provider, &request.secret)
            .map_err(|reason| TrackError::new(ErrorKind::InvalidRequest, reason))?;

        let pool_size = self
            .with_credentials(|creds| {
                for cred in creds.iter() {
                    if cred.secret == request.secret {
                        match cred.origin {
                            CredentialOrigin::UserAdded => {
                                return Err(TrackError::new(
                                    ErrorKind::InvalidRequest,
                                    format!("secret already present as credential {}", cred.id),
                                ))
                            }
                            CredentialOrigin::Configured => {
                                warn!(
                                    "Adding a secret that duplicates configured credential {}",
                                    cred.id
                                );
                            }
                        }
                    }
                }
                Ok(creds.len())
            })
            .await?;

        self.probe_secret(
            request.provider,
            &request.secret,
            request.search_engine_id.as_deref(),
        )
        .await?;

        let now = Utc::now();
        let credential = Credential {
            id: format!("user-{}", now.timestamp_millis()),
            provider: request.provider,
            secret: request.secret,
            search_engine_id: request.search_engine_id,
            daily_limit: request.daily_limit.unwrap_or(crate::config::DEFAULT_DAILY_LIMIT).max(1),
            monthly_limit: request.monthly_limit.unwrap_or(0),
            used_today: 0,
            used_this_month: 0,
            status: CredentialStatus::Active,
            priority: pool_size as u32 + 1,
            last_used_at: None,
            error_count: 0,
            success_rate: 100.0,
            monthly_reset_at: now,
            origin: CredentialOrigin::UserAdded,
            created_at: now,
            updated_at: now,
        };

        let id = credential.id.clone();
        self.with_credentials(|creds| creds.push(credential.clone()))
            .await;
        if let Err(e) = self.store.upsert(&credential).await {
            warn!("Failed to persist new credential {id}: {e}");
        }
        info!("Added credential {id} at priority {}", credential.priority);
        Ok(id)
    }

    /// Updates limits/priority of a credential in memory and in the store.
    pub async fn update(
        &self,
        id: &str,
        update: CredentialUpdate,
    ) -> Result<(), TrackError> {
        let updated = self
            .with_credentials(|creds| {
                let cred = creds.iter_mut().find(|c| c.id == id)?;
                if let Some(daily) = update.daily_limit {
                    cred.daily_limit = daily.max(1);
                }
                if let Some(monthly) = update.monthly_limit {
                    cred.monthly_limit = monthly;
                }
                if let Some(priority) = update.priority {
                    cred.priority = priority;
                }
                // A raised limit can reopen an exhausted credential.
                if cred.status == CredentialStatus::Exhausted
                    && cred.has_daily_capacity()
                    && cred.has_monthly_capacity()
                {
                    cred.status = CredentialStatus::Active;
                }
                cred.updated_at = Utc::now();
                Some(cred.clone())
            })
            .await
            .ok_or_else(|| {
                TrackError::new(ErrorKind::InvalidRequest, format!("no credential with id {id}"))
            })?;

        if let Err(e) = self.store.upsert(&updated).await {
            warn!("Failed to persist update for credential {id}: {e}");
        }
        Ok(())
    }

    /// Removes a credential from memory and the store.
    pub async fn remove(&self, id: &str) -> Result<(), TrackError> {
        let removed = self
            .with_credentials(|creds| {
                let index = creds.iter().position(|c| c.id == id)?;
                Some(creds.remove(index))
            })
            .await
            .ok_or_else(|| {
                TrackError::new(ErrorKind::InvalidRequest, format!("no credential with id {id}"))
            })?;

        if let Err(e) = self.store.delete(id).await {
            warn!("Failed to delete credential {id} from store: {e}");
        }
        info!("Removed credential {} ({})", removed.id, removed.provider.as_str());
        Ok(())
    }

    /// Probes a caller-provided secret without persisting anything.
    pub async fn test_user_key(
        &self,
        provider: Provider,
        secret: &str,
        search_engine_id: Option<&str>,
    ) -> Result<(), TrackError> {
        validate_secret(provider, secret)
            .map_err(|reason| TrackError::new(ErrorKind::InvalidRequest, reason))?;
        self.probe_secret(provider, secret, search_engine_id).await
    }

    /// Runs the canned probe request against the provider.
    async fn probe_secret(
        &self,
        provider: Provider,
        secret: &str,
        search_engine_id: Option<&str>,
    ) -> Result<(), TrackError> {
        let now = Utc::now();
        let credential = Credential {
            id: USER_KEY_ID.to_string(),
            provider,
            secret: secret.to_string(),
            search_engine_id: search_engine_id.map(String::from),
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
        let mut options = SearchOptions::for_domain(PROBE_DOMAIN);
        options.country = PROBE_COUNTRY.to_string();
        options.max_results = 10;

        match self
            .execute_attempt(&credential, PROBE_KEYWORD, &options, Instant::now())
            .await
        {
            AttemptOutcome::Success(..) => Ok(()),
            AttemptOutcome::Retryable { kind, message }
            | AttemptOutcome::Fatal { kind, message } => match kind {
                // Distinguishable: a rate-limited probe says nothing about
                // key validity.
                ErrorKind::RateLimited => Err(TrackError::new(kind, message)),
                ErrorKind::Unauthorized => Err(TrackError::new(
                    ErrorKind::Unauthorized,
                    format!("provider rejected the key: {message}"),
                )),
                _ => Err(TrackError::new(
                    ErrorKind::InvalidRequest,
                    format!("key test failed: {message}"),
                )),
            },
        }
    }
}
