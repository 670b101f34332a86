use serde::Serialize;

use crate::models::ScanId;

use super::state::PipelineSnapshot;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PipelineEvent {
    StateChanged {
        snapshot: PipelineSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    CaptureFailed {
        attempt_id: String,
        message: String,
    },
    RecordSaved {
        id: ScanId,
        timestamp: i64,
    },
    RecordDeleted,
    StorageFailed {
        message: String,
    },
}
