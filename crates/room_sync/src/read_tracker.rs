use std::collections::HashMap;

use shared::{
    domain::{MemberId, MessageId, RoomId},
    protocol::{ChatMessage, ReadReceipt},
};

/// Read cursor movement to report to the receipt sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAdvance {
    pub room_id: RoomId,
    pub message_id: MessageId,
    pub reader_id: MemberId,
}

impl ReadAdvance {
    pub fn to_receipt(&self) -> ReadReceipt {
        ReadReceipt {
            room_id: self.room_id.clone(),
            message_id: self.message_id,
            reader_id: self.reader_id.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReadTracker {
    last_acknowledged: HashMap<RoomId, MessageId>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks at the tail of `sequence` and returns an advance when it is a
    /// persisted message from someone else that has not been acknowledged yet.
    pub fn observe(
        &mut self,
        room_id: &RoomId,
        sequence: &[ChatMessage],
        local_user: &MemberId,
    ) -> Option<ReadAdvance> {
        let last = sequence.last()?;
        if &last.sender == local_user {
            return None;
        }
        let message_id = last.message_id?;
        if self.last_acknowledged.get(room_id) == Some(&message_id) {
            return None;
        }

        self.last_acknowledged.insert(room_id.clone(), message_id);
        Some(ReadAdvance {
            room_id: room_id.clone(),
            message_id,
            reader_id: local_user.clone(),
        })
    }

    pub fn last_acknowledged(&self, room_id: &RoomId) -> Option<MessageId> {
        self.last_acknowledged.get(room_id).copied()
    }

    pub fn forget(&mut self, room_id: &RoomId) {
        self.last_acknowledged.remove(room_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shared::domain::MessageKind;

    use super::*;

    fn message(id: Option<i64>, sender: &str) -> ChatMessage {
        ChatMessage {
            room_id: RoomId::from("r"),
            message_id: id.map(MessageId),
            sender: MemberId::from(sender),
            content: "x".into(),
            kind: MessageKind::Talk,
            send_time: Utc::now(),
            file_url: None,
        }
    }

    #[test]
    fn emits_once_per_remote_tail() {
        let room = RoomId::from("r");
        let me = MemberId::from("me");
        let mut tracker = ReadTracker::new();
        let sequence = vec![message(Some(1), "kim")];

        let advance = tracker.observe(&room, &sequence, &me).expect("advance");
        assert_eq!(advance.message_id, MessageId(1));
        assert_eq!(advance.reader_id, me);
        assert_eq!(tracker.observe(&room, &sequence, &me), None);
        assert_eq!(tracker.last_acknowledged(&room), Some(MessageId(1)));
    }

    #[test]
    fn ignores_local_tail_and_idless_tail() {
        let room = RoomId::from("r");
        let me = MemberId::from("me");
        let mut tracker = ReadTracker::new();

        assert_eq!(tracker.observe(&room, &[], &me), None);
        assert_eq!(tracker.observe(&room, &[message(Some(2), "me")], &me), None);
        assert_eq!(tracker.observe(&room, &[message(None, "kim")], &me), None);
        assert_eq!(tracker.last_acknowledged(&room), None);
    }

    #[test]
    fn never_repeats_an_id_across_interleaved_tails() {
        let room = RoomId::from("r");
        let me = MemberId::from("me");
        let mut tracker = ReadTracker::new();
        let mut sequence = vec![message(Some(1), "kim")];
        let mut emitted = Vec::new();

        for next in [
            message(None, "me"),
            message(Some(2), "kim"),
            message(Some(3), "me"),
            message(Some(4), "lee"),
        ] {
            if let Some(advance) = tracker.observe(&room, &sequence, &me) {
                emitted.push(advance.message_id);
            }
            sequence.push(next);
            if let Some(advance) = tracker.observe(&room, &sequence, &me) {
                emitted.push(advance.message_id);
            }
        }

        assert_eq!(
            emitted,
            vec![MessageId(1), MessageId(2), MessageId(4)]
        );
    }

    #[test]
    fn cursors_are_per_room() {
        let me = MemberId::from("me");
        let mut tracker = ReadTracker::new();
        let sequence = vec![message(Some(9), "kim")];

        assert!(tracker.observe(&RoomId::from("a"), &sequence, &me).is_some());
        assert!(tracker.observe(&RoomId::from("b"), &sequence, &me).is_some());

        tracker.forget(&RoomId::from("a"));
        assert!(tracker.observe(&RoomId::from("a"), &sequence, &me).is_some());
    }
}
