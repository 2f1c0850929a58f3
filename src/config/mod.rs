//! Configuration: environment-driven settings, CLI enums, and constants.

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::{
    BulkSettings, ConfiguredCredential, LogFormat, LogLevel, RotationStrategy, TrackerConfig,
};
