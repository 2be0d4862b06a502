//! Error taxonomy.
//!
//! `ErrorKind` is the closed set from spec §7; it is what gets reported to
//! `ErrorCollector` and surfaced alongside a snapshot. `AgentError` is the
//! richer internal error type components actually return/propagate, modeled
//! on `DbError` in the teacher crate (`src/core/error.rs`).

use thiserror::Error;

/// Closed set of error kinds surfaced in responses and in `ErrorCollector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MetricsUnavailable,
    InformerSyncFailed,
    InformerSyncTimeout,
    BackendUnreachable,
    SnapshotBuildFailed,
    CompressionFailed,
    AuthFailed,
    BufferFull,
    CrdNotFound,
    DiscoveryFailed,
    Timeout,
    PartialData,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MetricsUnavailable => "METRICS_UNAVAILABLE",
            ErrorKind::InformerSyncFailed => "INFORMER_SYNC_FAILED",
            ErrorKind::InformerSyncTimeout => "INFORMER_SYNC_TIMEOUT",
            ErrorKind::BackendUnreachable => "BACKEND_UNREACHABLE",
            ErrorKind::SnapshotBuildFailed => "SNAPSHOT_BUILD_FAILED",
            ErrorKind::CompressionFailed => "COMPRESSION_FAILED",
            ErrorKind::AuthFailed => "AUTH_FAILED",
            ErrorKind::BufferFull => "BUFFER_FULL",
            ErrorKind::CrdNotFound => "CRD_NOT_FOUND",
            ErrorKind::DiscoveryFailed => "DISCOVERY_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::PartialData => "PARTIAL_DATA",
        }
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to construct cluster client: {0}")]
    ClientConstruction(String),

    #[error("all collectors failed to start")]
    AllCollectorsFailed,

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("canceled")]
    Canceled,

    #[error("snapshot send failed: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
