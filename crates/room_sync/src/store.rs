//! Per-room message sequences: the merge point of fetched history and live events.

use std::collections::{HashMap, HashSet};

use shared::{
    domain::{MessageId, RoomId},
    protocol::ChatMessage,
};

#[derive(Debug, Default)]
struct RoomSequence {
    messages: Vec<ChatMessage>,
    known_ids: HashSet<MessageId>,
    /// Set by the first seed. Until then appends are also kept in
    /// `appended_before_seed` so the seed can replay them over the history.
    seeded: bool,
    appended_before_seed: Vec<ChatMessage>,
}

impl RoomSequence {
    fn push(&mut self, message: ChatMessage) -> bool {
        if let Some(id) = message.message_id {
            if !self.known_ids.insert(id) {
                return false;
            }
        }
        self.messages.push(message);
        true
    }
}

#[derive(Debug, Default)]
pub struct MessageStore {
    rooms: HashMap<RoomId, RoomSequence>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the room's sequence with `history`. On the first seed, whatever
    /// was appended while the fetch was outstanding is re-appended after it.
    /// Replayed messages whose id is already part of the history are dropped;
    /// id-less ones are always kept. Later seeds take `history` as is.
    pub fn seed(&mut self, room_id: &RoomId, history: Vec<ChatMessage>) -> &[ChatMessage] {
        let room = self.rooms.entry(room_id.clone()).or_default();
        let pending = std::mem::take(&mut room.appended_before_seed);
        room.seeded = true;

        room.messages = Vec::with_capacity(history.len() + pending.len());
        room.known_ids.clear();
        for message in history {
            room.push(message);
        }
        for message in pending {
            room.push(message);
        }
        &room.messages
    }

    /// Adds `message` at the tail. Returns `false` when a message with the same
    /// id is already in the room, in which case nothing changes.
    pub fn append(&mut self, room_id: &RoomId, message: ChatMessage) -> bool {
        let room = self.rooms.entry(room_id.clone()).or_default();
        let replay = (!room.seeded).then(|| message.clone());
        if !room.push(message) {
            return false;
        }
        if let Some(replay) = replay {
            room.appended_before_seed.push(replay);
        }
        true
    }

    pub fn get(&self, room_id: &RoomId) -> &[ChatMessage] {
        self.rooms
            .get(room_id)
            .map(|room| room.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn tail(&self, room_id: &RoomId) -> Option<&ChatMessage> {
        self.get(room_id).last()
    }

    pub fn forget(&mut self, room_id: &RoomId) {
        self.rooms.remove(room_id);
    }
}
