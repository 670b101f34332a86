//! Error types shared by the store, capture sources and the pipeline.

use std::time::Duration;

use thiserror::Error;

/// Failures of the persisted scan store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend read or write failed (disk full, database closed, ...)
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A value is present under the scan key but is not a valid record
    #[error("stored scan record is malformed: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("failed to serialize scan record: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Failures reported by a capture source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("captured frame is not a valid image: {0}")]
    InvalidPayload(String),

    #[error("no frame received within {0:?}")]
    Timeout(Duration),
}

/// Failures of pipeline actions.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// The attempt was reset before it produced a result
    #[error("scan attempt was cancelled")]
    Cancelled,
}
