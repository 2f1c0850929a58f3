use super::*;
use sqlx::SqlitePool;

use crate::storage::run_migrations;

async fn test_pool(
    credentials: Vec<Credential>,
    rotation: RotationStrategy,
) -> Arc<SearchApiPool> {
    let db = Arc::new(SqlitePool::connect("sqlite::memory:").await.unwrap());
    run_migrations(&db).await.unwrap();
    let settings = PoolSettings {
        rotation,
        request_timeout: Duration::from_secs(5),
        // Short pause so the resume timer is observable in a test.
        rate_limit_pause: Duration::from_millis(50),
        pool_max_retries: 3,
        native_serp_endpoint: "http://127.0.0.1:9/search".to_string(),
        custom_search_endpoint: "http://127.0.0.1:9/cse".to_string(),
    };
    SearchApiPool::for_tests(
        settings,
        CredentialStore::new(Arc::clone(&db)),
        RecordStore::new(db),
        reqwest::Client::new(),
        credentials,
    )
}

fn credential(id: &str, priority: u32, used_today: u32, daily_limit: u32) -> Credential {
    let now = Utc::now();
    Credential {
        id: id.to_string(),
        provider: Provider::NativeSerp,
        secret: format!("secret-{id}-0123456789abcdef0123456789"),
        search_engine_id: None,
        daily_limit,
        monthly_limit: 0,
        used_today,
        used_this_month: used_today,
        status: if used_today >= daily_limit {
            CredentialStatus::Exhausted
        } else {
            CredentialStatus::Active
        },
        priority,
        last_used_at: None,
        error_count: 0,
        success_rate: 100.0,
        monthly_reset_at: now,
        origin: CredentialOrigin::Configured,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_priority_selection_skips_exhausted() {
    // K1 is the preferred credential but sits at its limit; K2 must serve.
    let pool = test_pool(
        vec![credential("k1", 1, 10, 10), credential("k2", 2, 0, 10)],
        RotationStrategy::Priority,
    )
    .await;

    let selected = pool.select_and_lock(Provider::NativeSerp).await.unwrap();
    assert_eq!(selected.id, "k2");
}

#[tokio::test]
async fn test_priority_selection_prefers_lowest_value() {
    let pool = test_pool(
        vec![
            credential("k3", 3, 0, 10),
            credential("k1", 1, 0, 10),
            credential("k2", 2, 0, 10),
        ],
        RotationStrategy::Priority,
    )
    .await;
    assert_eq!(
        pool.select_and_lock(Provider::NativeSerp).await.unwrap().id,
        "k1"
    );
}

#[tokio::test]
async fn test_least_used_selection() {
    let pool = test_pool(
        vec![credential("k1", 1, 7, 10), credential("k2", 2, 3, 10)],
        RotationStrategy::LeastUsed,
    )
    .await;
    assert_eq!(
        pool.select_and_lock(Provider::NativeSerp).await.unwrap().id,
        "k2"
    );
}

#[tokio::test]
async fn test_round_robin_cycles() {
    let pool = test_pool(
        vec![credential("k1", 1, 0, 10), credential("k2", 2, 0, 10)],
        RotationStrategy::RoundRobin,
    )
    .await;

    let first = pool.select_and_lock(Provider::NativeSerp).await.unwrap();
    pool.release(&first.id).await;
    let second = pool.select_and_lock(Provider::NativeSerp).await.unwrap();
    pool.release(&second.id).await;
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_in_flight_credential_is_not_selected_twice() {
    // Two concurrent lookups can never hold the same credential.
    let pool = test_pool(vec![credential("k1", 1, 0, 10)], RotationStrategy::Priority).await;

    let first = pool.select_and_lock(Provider::NativeSerp).await;
    assert!(first.is_some());
    let second = pool.select_and_lock(Provider::NativeSerp).await;
    assert!(second.is_none());

    pool.release("k1").await;
    assert!(pool.select_and_lock(Provider::NativeSerp).await.is_some());
}

#[tokio::test]
async fn test_selection_filters_provider_and_status() {
    let mut custom = credential("cse1", 1, 0, 10);
    custom.provider = Provider::CustomSearch;
    custom.search_engine_id = Some("engine".into());
    let mut errored = credential("bad", 1, 0, 10);
    errored.status = CredentialStatus::Error;

    let pool = test_pool(vec![custom, errored], RotationStrategy::Priority).await;
    // Only the custom-search credential is selectable, and only for its
    // own provider.
    assert!(pool.select_and_lock(Provider::NativeSerp).await.is_none());
    let selected = pool.select_and_lock(Provider::CustomSearch).await.unwrap();
    assert_eq!(selected.id, "cse1");
}

#[tokio::test]
async fn test_commit_success_updates_counters_and_exhausts_at_limit() {
    let pool = test_pool(vec![credential("k1", 1, 9, 10)], RotationStrategy::Priority).await;
    let selected = pool.select_and_lock(Provider::NativeSerp).await.unwrap();
    assert_eq!(selected.used_today, 9);

    let patch = pool.commit_success(&selected.id, None).await.unwrap();
    assert_eq!(patch.used_today, 10);
    assert_eq!(patch.status, CredentialStatus::Exhausted);

    // Lock released, but the credential is now exhausted.
    assert!(pool.select_and_lock(Provider::NativeSerp).await.is_none());
}

#[tokio::test]
async fn test_quota_failure_marks_exhausted() {
    let pool = test_pool(vec![credential("k1", 1, 0, 10)], RotationStrategy::Priority).await;
    let selected = pool.select_and_lock(Provider::NativeSerp).await.unwrap();
    let patch = pool
        .commit_failure(&selected.id, ErrorKind::QuotaExceeded)
        .await
        .unwrap();
    assert_eq!(patch.status, CredentialStatus::Exhausted);
    assert_eq!(patch.error_count, 1);
    assert!(patch.success_rate < 100.0);
}

#[tokio::test]
async fn test_rate_limit_pauses_then_resumes() {
    let pool = test_pool(vec![credential("k1", 1, 0, 10)], RotationStrategy::Priority).await;
    let selected = pool.select_and_lock(Provider::NativeSerp).await.unwrap();
    pool.commit_failure(&selected.id, ErrorKind::RateLimited)
        .await
        .unwrap();

    let stats = pool.stats().await;
    assert_eq!(stats.paused, 1);
    assert!(pool.select_and_lock(Provider::NativeSerp).await.is_none());

    // The resume timer runs at the configured 50ms pause.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let stats = pool.stats().await;
    assert_eq!(stats.paused, 0);
    assert_eq!(stats.active, 1);
    assert!(pool.select_and_lock(Provider::NativeSerp).await.is_some());
}

#[tokio::test]
async fn test_unauthorized_parks_credential_in_error() {
    let pool = test_pool(vec![credential("k1", 1, 0, 10)], RotationStrategy::Priority).await;
    let selected = pool.select_and_lock(Provider::NativeSerp).await.unwrap();
    pool.commit_failure(&selected.id, ErrorKind::Unauthorized)
        .await
        .unwrap();
    let stats = pool.stats().await;
    assert_eq!(stats.error, 1);
    assert!(pool.select_and_lock(Provider::NativeSerp).await.is_none());
}

#[tokio::test]
async fn test_reset_daily_all() {
    // R1: counters zero, error counts cleared, non-paused rows active.
    let mut paused = credential("k2", 2, 5, 10);
    paused.status = CredentialStatus::Paused;
    let pool = test_pool(
        vec![credential("k1", 1, 10, 10), paused],
        RotationStrategy::Priority,
    )
    .await;

    pool.reset_daily_all().await.unwrap();
    let stats = pool.stats().await;
    assert_eq!(stats.daily_used, 0);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.paused, 1);
    for snapshot in &stats.credentials {
        assert_eq!(snapshot.used_today, 0);
    }
}

#[tokio::test]
async fn test_monthly_reset_reopens_exhausted_under_daily_limit() {
    let mut monthly_capped = credential("k1", 1, 2, 10);
    monthly_capped.monthly_limit = 100;
    monthly_capped.used_this_month = 100;
    monthly_capped.status = CredentialStatus::Exhausted;

    let pool = test_pool(vec![monthly_capped], RotationStrategy::Priority).await;
    pool.reset_monthly_all().await.unwrap();
    let stats = pool.stats().await;
    assert_eq!(stats.monthly_used, 0);
    assert_eq!(stats.active, 1);
}

#[tokio::test]
async fn test_stale_month_triggers_reset() {
    let mut stale = credential("k1", 1, 0, 10);
    stale.used_this_month = 50;
    stale.monthly_reset_at = Utc::now() - chrono::Duration::days(62);

    let pool = test_pool(vec![stale], RotationStrategy::Priority).await;
    pool.check_monthly_if_stale().await.unwrap();
    assert_eq!(pool.stats().await.monthly_used, 0);
}

#[tokio::test]
async fn test_track_on_empty_pool_is_all_exhausted() {
    let pool = test_pool(Vec::new(), RotationStrategy::Priority).await;
    let err = pool
        .track("kw", &SearchOptions::for_domain("example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AllExhausted);
}

#[test]
fn test_validate_secret() {
    let ok = "0123456789abcdef0123456789abcdef";
    assert!(validate_secret(Provider::NativeSerp, ok).is_ok());
    assert!(validate_secret(Provider::NativeSerp, "").is_err());
    assert!(validate_secret(Provider::NativeSerp, "short").is_err());
    assert!(validate_secret(Provider::NativeSerp, "your_api_key_here_padded_to_32_chars").is_err());
    assert!(validate_secret(Provider::NativeSerp, "CHANGE_ME_0123456789abcdef012345").is_err());
    assert!(
        validate_secret(Provider::NativeSerp, "replace_with_your_real_key_123456").is_err()
    );
    // Custom-search keys may be shorter than 32 characters.
    assert!(validate_secret(Provider::CustomSearch, "AIzaShortKey").is_ok());
}
