use shared::domain::RoomId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("room {0} is not open")]
    RoomNotOpen(RoomId),
    /// The optimistic copy stays in the room sequence; a retry will show twice.
    #[error("failed to publish message to room {room_id}: {source}")]
    Publish {
        room_id: RoomId,
        source: anyhow::Error,
    },
    #[error("failed to leave room {room_id}: {source}")]
    Leave {
        room_id: RoomId,
        source: anyhow::Error,
    },
    #[error("failed to download {storage_name}: {source}")]
    Download {
        storage_name: String,
        source: anyhow::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Upload,
    Publish,
}

/// One file of a batch that did not make it into the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub index: usize,
    pub file_name: String,
    pub stage: TransferStage,
    pub reason: String,
}
