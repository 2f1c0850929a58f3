// Shared test helpers for database setup, configuration, and canned
// provider payloads.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use rank_tracker::models::{Credential, CredentialStatus};
use rank_tracker::storage::run_migrations;
use rank_tracker::TrackerConfig;

/// Creates an in-memory database with migrations applied.
#[allow(dead_code)] // Used by other test files
pub async fn create_test_db() -> Arc<SqlitePool> {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    Arc::new(pool)
}

/// 32+ character secrets that pass native-SERP validation.
#[allow(dead_code)]
pub const SECRET_A: &str = "aaaaaaaa0000000011111111222222223333";
#[allow(dead_code)]
pub const SECRET_B: &str = "bbbbbbbb0000000011111111222222223333";

/// Builds a tracker configuration with native-SERP credentials pointed at a
/// mock server. `secrets` carries `(secret, daily_limit)` pairs numbered
/// from 1.
#[allow(dead_code)]
pub fn test_config(endpoint: &str, secrets: &[(&str, u32)]) -> TrackerConfig {
    use rank_tracker::config::ConfiguredCredential;
    use rank_tracker::models::Provider;
    use std::time::Duration;

    let mut config = TrackerConfig {
        native_serp_endpoint: endpoint.to_string(),
        rate_limit_pause: Duration::from_millis(150),
        ..Default::default()
    };
    config.bulk.inter_batch_delay = Duration::from_millis(10);
    config.configured_credentials = secrets
        .iter()
        .enumerate()
        .map(|(i, (secret, daily_limit))| ConfiguredCredential {
            index: i + 1,
            provider: Provider::NativeSerp,
            secret: (*secret).to_string(),
            search_engine_id: None,
            daily_limit: *daily_limit,
            monthly_limit: 0,
            priority: None,
        })
        .collect();
    config
}

/// A native-SERP body where example.com ranks at the given provider
/// position, padded with filler organic results.
#[allow(dead_code)]
pub fn serp_body(position: u32) -> Value {
    let mut organic = vec![json!({
        "position": position,
        "link": "https://www.example.com/page",
        "title": "Example",
        "snippet": "snippet"
    })];
    for i in 0..10 {
        organic.push(json!({
            "position": position + i + 1,
            "link": format!("https://filler{i}.net/page"),
            "title": "filler"
        }));
    }
    json!({
        "organic_results": organic,
        "search_information": {"total_results": 123456},
        "search_metadata": {"id": "req-1", "total_time_taken": 0.42}
    })
}

/// A configured-credential row as it would survive from a previous boot,
/// for pre-populating the store before pool init.
#[allow(dead_code)]
pub fn stored_configured_credential(
    id: &str,
    secret: &str,
    used_today: u32,
    daily_limit: u32,
) -> Credential {
    use rank_tracker::models::{CredentialOrigin, Provider};

    let now = Utc::now();
    Credential {
        id: id.to_string(),
        provider: Provider::NativeSerp,
        secret: secret.to_string(),
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
        priority: 1,
        last_used_at: None,
        error_count: 0,
        success_rate: 100.0,
        monthly_reset_at: now,
        origin: CredentialOrigin::Configured,
        created_at: now,
        updated_at: now,
    }
}
