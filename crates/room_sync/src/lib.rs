use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use futures::{future::join_all, StreamExt};
use shared::{
    domain::{FallbackIdentity, MemberId, MessageId, Participant, RoomId},
    protocol::{ChatMessage, FileEntry},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod collaborators;
pub mod config;
pub mod error;
pub mod grouping;
pub mod http;
pub mod read_tracker;
pub mod scroll;
pub mod store;
pub mod transfer;

use collaborators::{
    FileBlob, FileTransferBackend, HistorySource, LiveChannel, MissingLiveChannel,
    MissingReadReceiptSink, NoopRoomNotifier, ParticipantDirectory, ReadReceiptSink,
    RoomMembership, RoomNotifier,
};
use config::SyncSettings;
use error::SyncError;
use grouping::{DisplayMessage, GroupingPresenter, ParticipantRoster};
use http::RestBackend;
use read_tracker::{ReadAdvance, ReadTracker};
use scroll::{ScrollAction, ScrollFollower};
use store::MessageStore;
use transfer::{OutboundSender, TransferCoordinator, TransferReport};

/// Identity of the signed-in user, one per authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub local_user: MemberId,
    pub auth_token: Option<String>,
}

#[derive(Clone)]
pub struct SyncCollaborators {
    pub history: Arc<dyn HistorySource>,
    pub live: Arc<dyn LiveChannel>,
    pub receipts: Arc<dyn ReadReceiptSink>,
    pub directory: Arc<dyn ParticipantDirectory>,
    pub files: Arc<dyn FileTransferBackend>,
    pub membership: Arc<dyn RoomMembership>,
    pub notifier: Arc<dyn RoomNotifier>,
}

impl SyncCollaborators {
    /// REST for everything request/response shaped; no push channel.
    pub fn from_rest(rest: Arc<RestBackend>) -> Self {
        Self {
            history: rest.clone(),
            live: Arc::new(MissingLiveChannel),
            receipts: Arc::new(MissingReadReceiptSink),
            directory: rest.clone(),
            files: rest.clone(),
            membership: rest,
            notifier: Arc::new(NoopRoomNotifier),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    SequenceChanged { room_id: RoomId, len: usize },
    Scroll { room_id: RoomId, action: ScrollAction },
    ReadAdvanced(ReadAdvance),
    ParticipantsUpdated { room_id: RoomId },
    FileListRefreshed { room_id: RoomId, files: Vec<FileEntry> },
    RoomClosed { room_id: RoomId },
    Error(String),
}

struct OpenRoom {
    generation: u64,
    fallback: FallbackIdentity,
    roster: ParticipantRoster,
    live_task: Option<JoinHandle<()>>,
}

struct SyncState {
    next_generation: u64,
    rooms: HashMap<RoomId, OpenRoom>,
    store: MessageStore,
    reads: ReadTracker,
    scroll: ScrollFollower,
}

impl SyncState {
    fn is_current(&self, room_id: &RoomId, generation: Option<u64>) -> bool {
        match (self.rooms.get(room_id), generation) {
            (Some(room), Some(generation)) => room.generation == generation,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[derive(Debug, Default)]
struct Reaction {
    len: usize,
    read: Option<ReadAdvance>,
    scroll: Option<ScrollAction>,
}

/// Runs the tail observers after a room's sequence changed. Caller holds the lock.
/// The scroll rule only runs when the sequence `grew`.
fn react(state: &mut SyncState, room_id: &RoomId, local_user: &MemberId, grew: bool) -> Reaction {
    let sequence = state.store.get(room_id);
    let len = sequence.len();
    let read = state.reads.observe(room_id, sequence, local_user);
    let scroll = match sequence.last() {
        Some(tail) if grew => state.scroll.on_sequence_grew(room_id, tail, local_user),
        _ => None,
    };
    Reaction { len, read, scroll }
}

pub struct RoomSynchronizer {
    session: SessionContext,
    settings: SyncSettings,
    history: Arc<dyn HistorySource>,
    live: Arc<dyn LiveChannel>,
    receipts: Arc<dyn ReadReceiptSink>,
    directory: Arc<dyn ParticipantDirectory>,
    membership: Arc<dyn RoomMembership>,
    notifier: Arc<dyn RoomNotifier>,
    transfers: TransferCoordinator,
    presenter: GroupingPresenter,
    inner: Mutex<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl RoomSynchronizer {
    pub fn new(
        session: SessionContext,
        settings: SyncSettings,
        collaborators: SyncCollaborators,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            transfers: TransferCoordinator::new(collaborators.files),
            presenter: GroupingPresenter::new(settings.grouping_window_ms),
            inner: Mutex::new(SyncState {
                next_generation: 1,
                rooms: HashMap::new(),
                store: MessageStore::new(),
                reads: ReadTracker::new(),
                scroll: ScrollFollower::new(settings.near_bottom_threshold_px),
            }),
            session,
            settings,
            history: collaborators.history,
            live: collaborators.live,
            receipts: collaborators.receipts,
            directory: collaborators.directory,
            membership: collaborators.membership,
            notifier: collaborators.notifier,
            events,
        })
    }

    pub fn local_user(&self) -> &MemberId {
        &self.session.local_user
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Starts following `room_id`: live subscription, participant roster and
    /// history. Returns once history has been applied (or given up on).
    /// `fallback` names senders missing from the roster; defaults to settings.
    pub async fn open_room(
        self: &Arc<Self>,
        room_id: &RoomId,
        fallback: Option<FallbackIdentity>,
    ) -> Result<(), SyncError> {
        let generation = {
            let mut guard = self.inner.lock().await;
            if guard.rooms.contains_key(room_id) {
                debug!(room_id = %room_id, "sync: room already open");
                return Ok(());
            }
            let generation = guard.next_generation;
            guard.next_generation += 1;
            guard.rooms.insert(
                room_id.clone(),
                OpenRoom {
                    generation,
                    fallback: fallback.unwrap_or_else(|| self.settings.fallback_identity()),
                    roster: ParticipantRoster::default(),
                    live_task: None,
                },
            );
            generation
        };
        info!(room_id = %room_id, generation, "sync: room opened");
        self.notify_room_updated(room_id).await;

        self.start_live_subscription(room_id, generation).await;
        self.refresh_participants_for(room_id, Some(generation)).await;

        let history = match self.history.fetch_history(room_id).await {
            Ok(history) => history,
            Err(err) => {
                warn!(room_id = %room_id, "sync: history fetch failed: {err:#}");
                Vec::new()
            }
        };

        let reaction = {
            let mut guard = self.inner.lock().await;
            if !guard.is_current(room_id, Some(generation)) {
                debug!(room_id = %room_id, generation, "sync: dropping history for closed room");
                return Ok(());
            }
            let len_before = guard.store.get(room_id).len();
            let tail_before = guard.store.tail(room_id).cloned();
            let seeded = guard.store.seed(room_id, history).len();
            debug!(room_id = %room_id, seeded, "sync: history applied");
            let grew = seeded > len_before;
            if !grew && guard.store.tail(room_id) == tail_before.as_ref() {
                return Ok(());
            }
            react(&mut guard, room_id, &self.session.local_user, grew)
        };
        self.dispatch(room_id, reaction).await;
        Ok(())
    }

    async fn start_live_subscription(self: &Arc<Self>, room_id: &RoomId, generation: u64) {
        let mut stream = match self.live.subscribe(room_id).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(room_id = %room_id, "sync: live subscription failed: {err:#}");
                let _ = self.events.send(SyncEvent::Error(format!(
                    "live subscription failed for room {room_id}: {err}"
                )));
                return;
            }
        };

        let client = Arc::clone(self);
        let task_room = room_id.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                if !client
                    .apply_live_event(&task_room, Some(generation), message)
                    .await
                {
                    break;
                }
            }
            debug!(room_id = %task_room, "sync: live stream ended");
        });

        let mut guard = self.inner.lock().await;
        match guard.rooms.get_mut(room_id) {
            Some(room) if room.generation == generation => room.live_task = Some(task),
            _ => task.abort(),
        }
    }

    /// Applies one push event. Events for rooms that are not open are ignored.
    pub async fn handle_live_event(&self, room_id: &RoomId, message: ChatMessage) {
        self.apply_live_event(room_id, None, message).await;
    }

    /// Returns `false` once the room (or this generation of it) is gone.
    async fn apply_live_event(
        &self,
        room_id: &RoomId,
        generation: Option<u64>,
        message: ChatMessage,
    ) -> bool {
        let reaction = {
            let mut guard = self.inner.lock().await;
            if !guard.is_current(room_id, generation) {
                return false;
            }
            if !guard.store.append(room_id, message) {
                debug!(room_id = %room_id, "sync: duplicate live event dropped");
                return true;
            }
            react(&mut guard, room_id, &self.session.local_user, true)
        };
        self.dispatch(room_id, reaction).await;
        true
    }

    /// Sends a typed message. Blank input is ignored and yields `Ok(None)`.
    pub async fn send_text(
        &self,
        room_id: &RoomId,
        text: &str,
    ) -> Result<Option<ChatMessage>, SyncError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let message = ChatMessage::talk(room_id.clone(), self.session.local_user.clone(), text);
        self.send(room_id, message.clone()).await?;
        Ok(Some(message))
    }

    pub async fn update_viewport(&self, room_id: &RoomId, distance_from_bottom: f64) {
        let mut guard = self.inner.lock().await;
        if guard.rooms.contains_key(room_id) {
            guard.scroll.update_viewport(room_id, distance_from_bottom);
        }
    }

    pub async fn refresh_participants(&self, room_id: &RoomId) {
        self.refresh_participants_for(room_id, None).await;
    }

    async fn refresh_participants_for(&self, room_id: &RoomId, generation: Option<u64>) {
        let records = match self.directory.fetch_members(room_id).await {
            Ok(records) => records,
            Err(err) => {
                warn!(room_id = %room_id, "sync: member list fetch failed: {err:#}");
                return;
            }
        };

        let profiles = join_all(records.iter().map(|record| async move {
            match self.directory.fetch_profile(&record.member_id).await {
                Ok(profile) => Some(profile),
                Err(err) => {
                    warn!(member_id = %record.member_id, "sync: profile fetch failed: {err:#}");
                    None
                }
            }
        }))
        .await;

        let roster = ParticipantRoster::from_directory(
            records,
            profiles,
            &self.settings.storage_base_url,
            &self.settings.default_avatar,
        );

        {
            let mut guard = self.inner.lock().await;
            if !guard.is_current(room_id, generation) {
                return;
            }
            if let Some(room) = guard.rooms.get_mut(room_id) {
                room.roster = roster;
            }
        }
        let _ = self.events.send(SyncEvent::ParticipantsUpdated {
            room_id: room_id.clone(),
        });
        self.notify_room_updated(room_id).await;
    }

    /// Uploads `files` in order, posting a FILE message for each success, then
    /// refreshes the room's file list.
    pub async fn upload_files(
        &self,
        room_id: &RoomId,
        files: Vec<FileBlob>,
    ) -> Result<TransferReport, SyncError> {
        let generation = self.generation_of(room_id).await?;
        let outbound = GenerationSender {
            sync: self,
            generation,
        };
        let mut report = self
            .transfers
            .upload(room_id, &self.session.local_user, files, &outbound)
            .await;

        let current = self.inner.lock().await.is_current(room_id, Some(generation));
        if !current {
            report.cancelled = true;
        } else if !report.cancelled {
            let _ = self.events.send(SyncEvent::FileListRefreshed {
                room_id: room_id.clone(),
                files: report.file_list.clone(),
            });
        }
        Ok(report)
    }

    pub async fn refresh_file_list(&self, room_id: &RoomId) -> Result<Vec<FileEntry>, SyncError> {
        let generation = self.generation_of(room_id).await?;
        let files = self.transfers.refresh_file_list(room_id).await;
        if self.inner.lock().await.is_current(room_id, Some(generation)) {
            let _ = self.events.send(SyncEvent::FileListRefreshed {
                room_id: room_id.clone(),
                files: files.clone(),
            });
        }
        Ok(files)
    }

    pub async fn download(&self, storage_name: &str) -> Result<Vec<u8>, SyncError> {
        self.transfers.download(storage_name).await
    }

    /// Asks the server to remove the local user from the room. Local state is
    /// torn down only when the server accepts.
    pub async fn leave_room(&self, room_id: &RoomId) -> Result<(), SyncError> {
        self.generation_of(room_id).await?;
        self.membership
            .leave_room(room_id)
            .await
            .map_err(|source| SyncError::Leave {
                room_id: room_id.clone(),
                source,
            })?;
        info!(room_id = %room_id, "sync: left room");
        self.notify_room_updated(room_id).await;
        self.close_room(room_id).await;
        Ok(())
    }

    /// Discards all local state for the room. Outstanding fetches and uploads
    /// for it complete into nothing.
    pub async fn close_room(&self, room_id: &RoomId) {
        let removed = {
            let mut guard = self.inner.lock().await;
            let removed = guard.rooms.remove(room_id);
            guard.store.forget(room_id);
            guard.reads.forget(room_id);
            guard.scroll.forget(room_id);
            removed
        };
        let Some(room) = removed else {
            return;
        };
        if let Some(task) = room.live_task {
            task.abort();
        }
        debug!(room_id = %room_id, generation = room.generation, "sync: room closed");
        let _ = self.events.send(SyncEvent::RoomClosed {
            room_id: room_id.clone(),
        });
    }

    pub async fn is_open(&self, room_id: &RoomId) -> bool {
        self.inner.lock().await.rooms.contains_key(room_id)
    }

    pub async fn messages(&self, room_id: &RoomId) -> Vec<ChatMessage> {
        self.inner.lock().await.store.get(room_id).to_vec()
    }

    pub async fn last_read(&self, room_id: &RoomId) -> Option<MessageId> {
        self.inner.lock().await.reads.last_acknowledged(room_id)
    }

    pub async fn participants(&self, room_id: &RoomId) -> Vec<Participant> {
        let guard = self.inner.lock().await;
        guard
            .rooms
            .get(room_id)
            .map(|room| room.roster.members().to_vec())
            .unwrap_or_default()
    }

    pub async fn decorate(&self, room_id: &RoomId) -> Vec<DisplayMessage> {
        let guard = self.inner.lock().await;
        let Some(room) = guard.rooms.get(room_id) else {
            return Vec::new();
        };
        self.presenter.decorate(
            guard.store.get(room_id),
            &self.session.local_user,
            &room.roster,
            &room.fallback,
        )
    }

    pub async fn conversation_title(&self, room_id: &RoomId) -> Option<String> {
        let guard = self.inner.lock().await;
        guard
            .rooms
            .get(room_id)
            .map(|room| room.roster.conversation_title(&self.session.local_user, &room.fallback))
    }

    async fn generation_of(&self, room_id: &RoomId) -> Result<u64, SyncError> {
        self.inner
            .lock()
            .await
            .rooms
            .get(room_id)
            .map(|room| room.generation)
            .ok_or_else(|| SyncError::RoomNotOpen(room_id.clone()))
    }

    async fn dispatch(&self, room_id: &RoomId, reaction: Reaction) {
        let _ = self.events.send(SyncEvent::SequenceChanged {
            room_id: room_id.clone(),
            len: reaction.len,
        });

        if let Some(advance) = reaction.read {
            if let Err(err) = self.receipts.notify_read(&advance.to_receipt()).await {
                warn!(
                    room_id = %room_id,
                    message_id = advance.message_id.0,
                    "sync: read receipt not delivered: {err:#}"
                );
            }
            let _ = self.events.send(SyncEvent::ReadAdvanced(advance));
            self.notify_room_updated(room_id).await;
        }

        if let Some(action) = reaction.scroll {
            let _ = self.events.send(SyncEvent::Scroll {
                room_id: room_id.clone(),
                action,
            });
        }
    }

    async fn notify_room_updated(&self, room_id: &RoomId) {
        if let Err(err) = self.notifier.room_updated(room_id).await {
            warn!(room_id = %room_id, "sync: room update notification failed: {err:#}");
        }
    }

    /// Optimistic append, reactions, then publish. A failed publish leaves the
    /// local copy in place. With `generation` set, a room that was closed or
    /// reopened since counts as not open.
    async fn send_in(
        &self,
        room_id: &RoomId,
        generation: Option<u64>,
        message: ChatMessage,
    ) -> Result<(), SyncError> {
        let reaction = {
            let mut guard = self.inner.lock().await;
            if !guard.is_current(room_id, generation) {
                return Err(SyncError::RoomNotOpen(room_id.clone()));
            }
            guard.store.append(room_id, message.clone());
            react(&mut guard, room_id, &self.session.local_user, true)
        };
        self.dispatch(room_id, reaction).await;

        self.live
            .publish(room_id, &message)
            .await
            .map_err(|source| {
                warn!(room_id = %room_id, "sync: publish failed: {source:#}");
                SyncError::Publish {
                    room_id: room_id.clone(),
                    source,
                }
            })
    }
}

#[async_trait]
impl OutboundSender for RoomSynchronizer {
    async fn send(&self, room_id: &RoomId, message: ChatMessage) -> Result<(), SyncError> {
        self.send_in(room_id, None, message).await
    }
}

/// Send path pinned to the room generation an upload batch started in.
struct GenerationSender<'a> {
    sync: &'a RoomSynchronizer,
    generation: u64,
}

#[async_trait]
impl<'a> OutboundSender for GenerationSender<'a> {
    async fn send(&self, room_id: &RoomId, message: ChatMessage) -> Result<(), SyncError> {
        self.sync
            .send_in(room_id, Some(self.generation), message)
            .await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
