//! Database operations and storage management.
//!
//! This module provides:
//! - SQLite connection pool management (WAL mode)
//! - the credential projection consumed by the pool manager
//! - append-only ranking-record persistence
//! - embedded database migrations
//!
//! Writes off the lookup critical path are scheduled asynchronously by the
//! pool; everything here is plain awaited SQL.

pub mod credentials;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod records;

pub use credentials::CredentialStore;
pub use migrations::run_migrations;
pub use pool::init_db_pool_with_path;
pub use records::RecordStore;
