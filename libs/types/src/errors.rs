//! Error types for the live site feed
//!
//! Comprehensive error taxonomy using thiserror

use crate::ids::GeoId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the feed service to callers of `subscribe`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Feed is shutting down")]
    ShuttingDown,

    #[error("Snapshot serialization failed: {message}")]
    Serialization { message: String },
}

/// Startup failures while reading the backing data source
///
/// All variants are fatal: the service never starts with an undefined
/// record set.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read site data from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Site data in {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Site data in {path} must be a JSON array of records")]
    NotAnArray { path: PathBuf },

    #[error("Site data in {path} has {total} entries but none are valid records")]
    NoValidRecords { path: PathBuf, total: usize },
}

/// Rejected writes to the record set
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpdateError {
    #[error("Invalid severity {value} for site {geo_id}")]
    InvalidSeverity { geo_id: GeoId, value: f64 },

    #[error("Duplicate site identifier: {0}")]
    DuplicateGeoId(GeoId),
}

/// Invalid environment configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
