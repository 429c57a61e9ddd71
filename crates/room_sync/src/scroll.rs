//! Auto-scroll decisions for the conversation viewport.
//!
//! The follower never reads a viewport. The presentation layer reports the
//! remaining distance to the bottom on each scroll tick and executes the
//! returned [`ScrollAction`].

use std::collections::HashMap;

use shared::{
    domain::{MemberId, RoomId},
    protocol::ChatMessage,
};

pub const DEFAULT_NEAR_BOTTOM_THRESHOLD_PX: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    /// Move to the end without animation (first content of a room).
    JumpToEnd,
    AnimateToEnd,
}

#[derive(Debug, Clone, Copy)]
struct FollowState {
    initialized: bool,
    near_bottom: bool,
}

impl Default for FollowState {
    fn default() -> Self {
        Self {
            initialized: false,
            near_bottom: true,
        }
    }
}

#[derive(Debug)]
pub struct ScrollFollower {
    threshold_px: f64,
    rooms: HashMap<RoomId, FollowState>,
}

impl Default for ScrollFollower {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR_BOTTOM_THRESHOLD_PX)
    }
}

impl ScrollFollower {
    pub fn new(threshold_px: f64) -> Self {
        Self {
            threshold_px,
            rooms: HashMap::new(),
        }
    }

    pub fn threshold_px(&self) -> f64 {
        self.threshold_px
    }

    pub fn update_viewport(&mut self, room_id: &RoomId, distance_from_bottom: f64) {
        let near_bottom = distance_from_bottom < self.threshold_px;
        self.rooms.entry(room_id.clone()).or_default().near_bottom = near_bottom;
    }

    pub fn is_near_bottom(&self, room_id: &RoomId) -> bool {
        self.rooms
            .get(room_id)
            .map_or(FollowState::default().near_bottom, |state| state.near_bottom)
    }

    pub fn is_initialized(&self, room_id: &RoomId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|state| state.initialized)
    }

    /// Called after the room's sequence changed, with its new tail.
    pub fn on_sequence_grew(
        &mut self,
        room_id: &RoomId,
        tail: &ChatMessage,
        local_user: &MemberId,
    ) -> Option<ScrollAction> {
        let state = self.rooms.entry(room_id.clone()).or_default();
        if !state.initialized {
            state.initialized = true;
            return Some(ScrollAction::JumpToEnd);
        }
        if &tail.sender == local_user || state.near_bottom {
            return Some(ScrollAction::AnimateToEnd);
        }
        None
    }

    pub fn forget(&mut self, room_id: &RoomId) {
        self.rooms.remove(room_id);
    }
}
