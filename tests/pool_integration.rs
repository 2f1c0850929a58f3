//! Integration tests for the pool manager against a mock provider.
//!
//! No real network requests; `httptest` plays the upstream provider so
//! rotation, quota, rate-limit, and persistence behavior can be observed
//! end to end.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use httptest::{matchers::*, responders::*, Expectation, Server};

use helpers::{create_test_db, serp_body, stored_configured_credential, test_config, SECRET_A, SECRET_B};
use rank_tracker::models::CredentialStatus;
use rank_tracker::storage::{CredentialStore, RecordStore};
use rank_tracker::{AddCredentialRequest, ErrorKind, Provider, SearchApiPool, SearchOptions};

async fn boot_pool(
    server: &Server,
    secrets: &[(&str, u32)],
) -> (Arc<SearchApiPool>, CredentialStore, RecordStore) {
    let db = create_test_db().await;
    let store = CredentialStore::new(Arc::clone(&db));
    let records = RecordStore::new(Arc::clone(&db));
    let config = test_config(&server.url_str("/search"), secrets);
    let pool = SearchApiPool::init(&config, store.clone(), records.clone(), reqwest::Client::new())
        .await
        .expect("pool init");
    (pool, store, records)
}

#[tokio::test]
async fn test_rotation_skips_exhausted_credential() {
    // S3: K1 has burned its daily quota; the lookup must run on K2 and
    // never touch K1.
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("api_key", SECRET_A)))),
        ])
        .times(0)
        .respond_with(status_code(500)),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("api_key", SECRET_B)))),
        ])
        .times(1)
        .respond_with(json_encoded(serp_body(3))),
    );

    let db = create_test_db().await;
    let store = CredentialStore::new(Arc::clone(&db));
    let records = RecordStore::new(Arc::clone(&db));
    // K1's counters survive from a previous boot at their limit.
    store
        .upsert(&stored_configured_credential("native_serp-1", SECRET_A, 10, 10))
        .await
        .unwrap();

    let config = test_config(&server.url_str("/search"), &[(SECRET_A, 10), (SECRET_B, 10)]);
    let pool = SearchApiPool::init(&config, store, records, reqwest::Client::new())
        .await
        .unwrap();

    let record = pool
        .track("rust web framework", &SearchOptions::for_domain("example.com"))
        .await
        .expect("lookup should rotate to K2");
    assert!(record.found);
    assert_eq!(record.position, Some(3));

    let stats = pool.stats().await;
    let k1 = stats.credentials.iter().find(|c| c.id == "native_serp-1").unwrap();
    let k2 = stats.credentials.iter().find(|c| c.id == "native_serp-2").unwrap();
    assert_eq!(k1.status, CredentialStatus::Exhausted);
    assert_eq!(k1.used_today, 10);
    assert_eq!(k2.used_today, 1);
}

#[tokio::test]
async fn test_exhausted_pool_raises_all_exhausted() {
    // B3: the only credential is exhausted; no HTTP traffic happens.
    let server = Server::run();
    let db = create_test_db().await;
    let store = CredentialStore::new(Arc::clone(&db));
    let records = RecordStore::new(Arc::clone(&db));
    store
        .upsert(&stored_configured_credential("native_serp-1", SECRET_A, 10, 10))
        .await
        .unwrap();

    let config = test_config(&server.url_str("/search"), &[(SECRET_A, 10)]);
    let pool = SearchApiPool::init(&config, store, records, reqwest::Client::new())
        .await
        .unwrap();

    let err = pool
        .track("kw", &SearchOptions::for_domain("example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AllExhausted);
}

#[tokio::test]
async fn test_rate_limit_pauses_credential_and_raises_all_exhausted() {
    // S4 at test scale: the pause window is 150ms instead of 60s.
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(1)
            .respond_with(status_code(429).body("Too many requests")),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10)]).await;
    let err = pool
        .track("kw", &SearchOptions::for_domain("example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AllExhausted);
    assert_eq!(pool.stats().await.paused, 1);

    // After the pause window the credential returns to service.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let stats = pool.stats().await;
    assert_eq!(stats.paused, 0);
    assert_eq!(stats.active, 1);
}

#[tokio::test]
async fn test_unauthorized_fails_fast_and_parks_credential() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(1)
            .respond_with(status_code(401).body(r#"{"error": "Invalid API key supplied"}"#)),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10), (SECRET_B, 10)]).await;
    let err = pool
        .track("kw", &SearchOptions::for_domain("example.com"))
        .await
        .unwrap_err();
    // Non-retryable: the second credential is never tried.
    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(pool.stats().await.error, 1);
}

#[tokio::test]
async fn test_quota_error_rotates_to_next_credential() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("api_key", SECRET_A)))),
        ])
        .times(1)
        .respond_with(
            status_code(403).body(r#"{"error": "Monthly searches used up"}"#),
        ),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("api_key", SECRET_B)))),
        ])
        .times(1)
        .respond_with(json_encoded(serp_body(1))),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10), (SECRET_B, 10)]).await;
    let record = pool
        .track("kw", &SearchOptions::for_domain("example.com"))
        .await
        .expect("second credential should serve");
    assert_eq!(record.position, Some(1));

    let stats = pool.stats().await;
    let k1 = stats.credentials.iter().find(|c| c.id == "native_serp-1").unwrap();
    assert_eq!(k1.status, CredentialStatus::Exhausted);
}

#[tokio::test]
async fn test_usage_headers_reconcile_monthly_counters() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(1)
            .respond_with(
                status_code(200)
                    .append_header("content-type", "application/json")
                    .append_header("x-api-usage", "120/1000")
                    .body(serp_body(2).to_string()),
            ),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10)]).await;
    pool.track("kw", &SearchOptions::for_domain("example.com"))
        .await
        .unwrap();

    let stats = pool.stats().await;
    let k1 = &stats.credentials[0];
    assert_eq!(k1.monthly_limit, 1000);
    assert_eq!(k1.used_this_month, 120);
}

#[tokio::test]
async fn test_successful_lookup_persists_record_and_usage() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(1)
            .respond_with(json_encoded(serp_body(4))),
    );

    let (pool, store, records) = boot_pool(&server, &[(SECRET_A, 10)]).await;
    pool.track("persist me", &SearchOptions::for_domain("example.com"))
        .await
        .unwrap();

    // The ranking record is written on the lookup path.
    assert_eq!(records.count().await.unwrap(), 1);
    assert_eq!(
        records
            .latest_position("persist me", "example.com")
            .await
            .unwrap(),
        Some(Some(4))
    );

    // The usage upsert is asynchronous; give it a moment.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let stored = store.find_by_id("native_serp-1").await.unwrap().unwrap();
    assert_eq!(stored.used_today, 1);
}

#[tokio::test]
async fn test_add_then_remove_restores_pool_shape() {
    // R2: the probe request runs against the provider; afterwards the pool
    // looks exactly as before.
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("q", "test query")))),
        ])
        .times(1)
        .respond_with(json_encoded(serp_body(1))),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10)]).await;
    let before = pool.stats().await;

    let id = pool
        .add(AddCredentialRequest {
            provider: Provider::NativeSerp,
            secret: SECRET_B.to_string(),
            search_engine_id: None,
            daily_limit: Some(50),
            monthly_limit: None,
        })
        .await
        .expect("add should pass the probe");
    assert_eq!(pool.stats().await.total, before.total + 1);

    pool.remove(&id).await.unwrap();
    let after = pool.stats().await;
    assert_eq!(after.total, before.total);
    assert_eq!(after.daily_capacity, before.daily_capacity);
    assert_eq!(after.active, before.active);
}

#[tokio::test]
async fn test_add_rejects_duplicate_user_secret() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(1)
            .respond_with(json_encoded(serp_body(1))),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10)]).await;
    pool.add(AddCredentialRequest {
        provider: Provider::NativeSerp,
        secret: SECRET_B.to_string(),
        search_engine_id: None,
        daily_limit: None,
        monthly_limit: None,
    })
    .await
    .unwrap();

    let err = pool
        .add(AddCredentialRequest {
            provider: Provider::NativeSerp,
            secret: SECRET_B.to_string(),
            search_engine_id: None,
            daily_limit: None,
            monthly_limit: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn test_rate_limited_probe_is_distinguishable() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(1)
            .respond_with(status_code(429).body("Too many requests")),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10)]).await;
    let err = pool
        .test_user_key(Provider::NativeSerp, SECRET_B, None)
        .await
        .unwrap_err();
    // Not invalid_request: the caller can simply retry later.
    assert_eq!(err.kind, ErrorKind::RateLimited);
}

#[tokio::test]
async fn test_user_supplied_key_bypasses_pool() {
    let server = Server::run();
    let user_secret = "cccccccc0000000011111111222222223333";
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("api_key", user_secret)))),
        ])
        .times(1)
        .respond_with(json_encoded(serp_body(7))),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10)]).await;
    let mut options = SearchOptions::for_domain("example.com");
    options.api_key = Some(user_secret.to_string());

    let record = pool.track("kw", &options).await.unwrap();
    assert_eq!(record.position, Some(7));
    assert!(record.metadata.credential_id.is_none());

    // The pool's own counters are untouched.
    let stats = pool.stats().await;
    assert_eq!(stats.daily_used, 0);
}

#[tokio::test]
async fn test_user_supplied_key_failure_is_invalid_request() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(1)
            .respond_with(status_code(500)),
    );

    let (pool, _store, _records) = boot_pool(&server, &[(SECRET_A, 10)]).await;
    let mut options = SearchOptions::for_domain("example.com");
    options.api_key = Some("cccccccc0000000011111111222222223333".to_string());

    let err = pool.track("kw", &options).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidRequest);
    assert_eq!(pool.stats().await.daily_used, 0);
}
