//! Error kinds, classification, and lookup statistics.
//!
//! This module defines the typed error surface of the engine:
//! - `ErrorKind` categorizes every failure a lookup can hit
//! - `TrackError` carries a kind plus a human-readable message
//! - categorization maps HTTP statuses, transport errors, and provider
//!   messages onto kinds
//! - `LookupStats` counts failures per kind for end-of-run reporting

pub mod categorization;
pub mod stats;
pub mod types;

pub use categorization::{classify_provider_message, classify_reqwest_error, classify_status};
pub use stats::LookupStats;
pub use types::{ErrorKind, StorageError, TrackError};
