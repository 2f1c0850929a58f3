//! rank_tracker library: keyword rank tracking through pooled search APIs
//!
//! This library tracks where a target domain ranks for one or more keywords
//! in a third-party search provider's results, through a process-wide pool
//! of API credentials with quota, health, and rotation semantics.
//!
//! # Example
//!
//! ```no_run
//! use rank_tracker::{RankTracker, SearchApiPool, TrackRequest, TrackerConfig};
//! use rank_tracker::storage::{init_db_pool_with_path, run_migrations, CredentialStore, RecordStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = TrackerConfig::from_env();
//! let db = init_db_pool_with_path(&config.db_path).await?;
//! run_migrations(&db).await?;
//!
//! let client = rank_tracker::initialization::init_client(config.request_timeout)?;
//! let pool = SearchApiPool::init(
//!     &config,
//!     CredentialStore::new(db.clone()),
//!     RecordStore::new(db),
//!     (*client).clone(),
//! )
//! .await?;
//!
//! let tracker = RankTracker::new(pool, config.bulk.clone());
//! let response = tracker
//!     .handle(TrackRequest {
//!         keywords: vec!["rust web framework".into()],
//!         domain: "example.com".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{}", response.insight);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your
//! application or ensure you're calling library functions within an async
//! context.

pub mod bulk;
pub mod config;
pub mod domain_match;
pub mod error_handling;
pub mod facade;
pub mod initialization;
pub mod models;
pub mod parser;
pub mod pool;
pub mod providers;
pub mod scheduler;
pub mod storage;

// Re-export public API
pub use bulk::{BulkExecutor, BulkProgress};
pub use config::{BulkSettings, LogFormat, LogLevel, RotationStrategy, TrackerConfig};
pub use error_handling::{ErrorKind, TrackError};
pub use facade::{RankTracker, TrackOutcome, TrackRequest, TrackResponse};
pub use models::{
    BulkResult, Credential, CredentialStatus, Device, FailedLookup, PoolStats, PositionSource,
    Provider, RankingRecord, SearchOptions,
};
pub use pool::admin::{AddCredentialRequest, CredentialUpdate};
pub use pool::SearchApiPool;
pub use scheduler::ResetScheduler;
