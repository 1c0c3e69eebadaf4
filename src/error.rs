//! Error types for engine runs.
//!
//! Errors are classified by recoverability. Only two conditions are fatal
//! to a run and cross layer boundaries:
//! - `Config`: policy values out of range, rejected before any extraction
//! - `Cancelled`: deadline exceeded, no partial output is ever emitted
//!
//! Everything else degrades gracefully and is reported as a `Warning`
//! accumulated on the run and included in the `RankedResult`, so that
//! silent data loss is impossible. Extractors never fail past their
//! boundary; they return `(interactions, warnings)`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal run errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run cancelled: deadline exceeded during {0}")]
    Cancelled(&'static str),
}

/// Cache-layer errors. Always recoverable at the engine level — a failed
/// cache degrades to a `CacheUnavailable` warning and the run proceeds
/// without caching.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to create cache directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cached result serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Category of a non-fatal degraded condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A structurally unreadable record was skipped.
    InvalidRecord,
    /// A source had too many invalid records and was treated as absent.
    SourceDegraded,
    /// A name-only reference was merged into an existing key (rule 3).
    LowConfidenceMerge,
    /// Two pre-existing keys would have had to merge; the merge was refused.
    IdentityAmbiguity,
    /// The cache could not be read or written; the run proceeded without it.
    CacheUnavailable,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRecord => "invalid_record",
            Self::SourceDegraded => "source_degraded",
            Self::LowConfidenceMerge => "low_confidence_merge",
            Self::IdentityAmbiguity => "identity_ambiguity",
            Self::CacheUnavailable => "cache_unavailable",
        }
    }
}

/// One degraded condition observed during a run. Serialized into the
/// `RankedResult` warnings array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_record(source: &str, detail: impl std::fmt::Display) -> Self {
        Self::new(
            WarningKind::InvalidRecord,
            format!("{source}: skipped unreadable record: {detail}"),
        )
    }

    pub fn source_degraded(source: &str, invalid: usize, total: usize) -> Self {
        Self::new(
            WarningKind::SourceDegraded,
            format!("{source}: {invalid} of {total} records invalid; source treated as absent"),
        )
    }
}
