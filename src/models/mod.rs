//! Canonical data model.
//!
//! Everything the engine persists or hands back to callers lives here:
//! credentials and their health state, search options, ranking records with
//! position provenance, and the bulk/pool aggregate shapes.

pub mod credential;
pub mod options;
pub mod record;

pub use credential::{
    Credential, CredentialHealth, CredentialOrigin, CredentialStatus, CredentialSnapshot,
    PoolStats, Provider, UsagePatch,
};
pub use options::{Device, SearchOptions};
pub use record::{
    BulkResult, CompetitorEntry, FailedLookup, PositionSource, PositionValidation,
    QualityHistogram, RankingRecord, Reliability, SearchLocation, SearchMetadata, SerpFeature,
    SerpFeatureKind,
};
