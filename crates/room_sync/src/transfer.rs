//! Sequential file uploads that land in the transcript as FILE messages.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{MemberId, RoomId},
    protocol::{ChatMessage, FileEntry},
};
use tracing::{info, warn};

use crate::{
    collaborators::{FileBlob, FileTransferBackend},
    error::{SyncError, TransferFailure, TransferStage},
};

/// The path typed messages take: optimistic append, then publish.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, room_id: &RoomId, message: ChatMessage) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// FILE messages handed to the send path, in input order.
    pub sent: Vec<ChatMessage>,
    pub failures: Vec<TransferFailure>,
    pub file_list: Vec<FileEntry>,
    /// The room went away mid-batch; remaining files were skipped.
    pub cancelled: bool,
}

pub struct TransferCoordinator {
    backend: Arc<dyn FileTransferBackend>,
}

impl TransferCoordinator {
    pub fn new(backend: Arc<dyn FileTransferBackend>) -> Self {
        Self { backend }
    }

    /// Uploads `files` one at a time in the given order. A failed file is
    /// reported and skipped; the rest of the batch still runs. The room's file
    /// list is refreshed once after the last attempt.
    pub async fn upload(
        &self,
        room_id: &RoomId,
        local_user: &MemberId,
        files: Vec<FileBlob>,
        outbound: &dyn OutboundSender,
    ) -> TransferReport {
        let mut report = TransferReport::default();

        for (index, file) in files.iter().enumerate() {
            let uploaded = match self.backend.upload(room_id, file).await {
                Ok(uploaded) => uploaded,
                Err(err) => {
                    warn!(
                        room_id = %room_id,
                        index,
                        file_name = %file.file_name,
                        "transfer: upload failed: {err:#}"
                    );
                    report.failures.push(TransferFailure {
                        index,
                        file_name: file.file_name.clone(),
                        stage: TransferStage::Upload,
                        reason: format!("{err:#}"),
                    });
                    continue;
                }
            };

            let message = ChatMessage::file(room_id.clone(), local_user.clone(), &uploaded);
            match outbound.send(room_id, message.clone()).await {
                Ok(()) => report.sent.push(message),
                Err(SyncError::RoomNotOpen(_)) => {
                    info!(room_id = %room_id, index, "transfer: room closed mid-batch; stopping");
                    report.cancelled = true;
                    return report;
                }
                Err(err) => {
                    // the optimistic FILE row is already in the transcript
                    report.sent.push(message);
                    report.failures.push(TransferFailure {
                        index,
                        file_name: file.file_name.clone(),
                        stage: TransferStage::Publish,
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.file_list = self.refresh_file_list(room_id).await;
        info!(
            room_id = %room_id,
            sent = report.sent.len(),
            failed = report.failures.len(),
            "transfer: batch finished"
        );
        report
    }

    pub async fn refresh_file_list(&self, room_id: &RoomId) -> Vec<FileEntry> {
        match self.backend.list_files(room_id).await {
            Ok(files) => files,
            Err(err) => {
                warn!(room_id = %room_id, "transfer: file list fetch failed: {err:#}");
                Vec::new()
            }
        }
    }

    pub async fn download(&self, storage_name: &str) -> Result<Vec<u8>, SyncError> {
        self.backend
            .download(storage_name)
            .await
            .map_err(|source| SyncError::Download {
                storage_name: storage_name.to_string(),
                source,
            })
    }
}

#[cfg(test)]
#[path = "tests/transfer_tests.rs"]
mod tests;
