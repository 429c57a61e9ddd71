//! Interfaces of the services the synchronizer consumes but does not own.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use shared::{
    domain::{MemberId, RoomId},
    protocol::{ChatMessage, FileEntry, MemberProfileRecord, MemberRecord, ReadReceipt, UploadedFile},
};

/// A file picked or dropped by the user, waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>>;
}

/// Push channel for one logical room. Transport is the implementor's concern;
/// events are expected in per-room order.
#[async_trait]
pub trait LiveChannel: Send + Sync {
    async fn subscribe(&self, room_id: &RoomId) -> Result<BoxStream<'static, ChatMessage>>;
    async fn publish(&self, room_id: &RoomId, message: &ChatMessage) -> Result<()>;
}

#[async_trait]
pub trait ReadReceiptSink: Send + Sync {
    async fn notify_read(&self, receipt: &ReadReceipt) -> Result<()>;
}

#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn fetch_members(&self, room_id: &RoomId) -> Result<Vec<MemberRecord>>;
    async fn fetch_profile(&self, member_id: &MemberId) -> Result<MemberProfileRecord>;
}

#[async_trait]
pub trait FileTransferBackend: Send + Sync {
    async fn upload(&self, room_id: &RoomId, file: &FileBlob) -> Result<UploadedFile>;
    async fn list_files(&self, room_id: &RoomId) -> Result<Vec<FileEntry>>;
    async fn download(&self, storage_name: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait RoomMembership: Send + Sync {
    async fn leave_room(&self, room_id: &RoomId) -> Result<()>;
}

/// Receives `RoomUpdated` signals for companion views (room lists, badges).
#[async_trait]
pub trait RoomNotifier: Send + Sync {
    async fn room_updated(&self, room_id: &RoomId) -> Result<()>;
}

pub struct MissingLiveChannel;

#[async_trait]
impl LiveChannel for MissingLiveChannel {
    async fn subscribe(&self, _room_id: &RoomId) -> Result<BoxStream<'static, ChatMessage>> {
        Ok(Box::pin(stream::empty()))
    }

    async fn publish(&self, room_id: &RoomId, _message: &ChatMessage) -> Result<()> {
        Err(anyhow!("live channel is unavailable for room {room_id}"))
    }
}

pub struct MissingReadReceiptSink;

#[async_trait]
impl ReadReceiptSink for MissingReadReceiptSink {
    async fn notify_read(&self, _receipt: &ReadReceipt) -> Result<()> {
        Ok(())
    }
}

pub struct NoopRoomNotifier;

#[async_trait]
impl RoomNotifier for NoopRoomNotifier {
    async fn room_updated(&self, _room_id: &RoomId) -> Result<()> {
        Ok(())
    }
}
