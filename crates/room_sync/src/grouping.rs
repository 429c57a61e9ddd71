//! Display metadata derived from a room sequence: profile grouping and sender
//! identity resolution.

use std::collections::HashSet;

use shared::{
    domain::{FallbackIdentity, MemberId, Participant},
    protocol::{ChatMessage, MemberProfileRecord, MemberRecord},
};

pub const DEFAULT_GROUPING_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub message: ChatMessage,
    pub hide_profile: bool,
    pub is_mine: bool,
    /// SYSTEM rows render as a standalone banner without sender chrome.
    pub is_banner: bool,
    pub sender_label: String,
    pub avatar_url: String,
}

/// Room members keyed by sender id. Lookups that miss fall back to the
/// caller's [`FallbackIdentity`]; a miss is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantRoster {
    members: Vec<Participant>,
}

impl ParticipantRoster {
    pub fn new(members: Vec<Participant>) -> Self {
        Self { members }
    }

    /// Joins directory rows with their profiles. `profiles[i]` belongs to
    /// `records[i]`; `None` means the profile lookup failed. A blank directory
    /// name is filled from the profile.
    pub fn from_directory(
        records: Vec<MemberRecord>,
        profiles: Vec<Option<MemberProfileRecord>>,
        storage_base_url: &str,
        default_avatar: &str,
    ) -> Self {
        let members = records
            .into_iter()
            .zip(profiles.into_iter().chain(std::iter::repeat(None)))
            .map(|(record, profile)| {
                let name = match profile.as_ref().and_then(|p| p.display_name.as_deref()) {
                    Some(profile_name) if record.name.trim().is_empty() => profile_name.to_string(),
                    _ => record.name,
                };
                Participant {
                    member_id: record.member_id,
                    name,
                    rank_name: record.rank_name.unwrap_or_default(),
                    profile_image_url: avatar_url(
                        profile.as_ref(),
                        storage_base_url,
                        default_avatar,
                    ),
                }
            })
            .collect();
        Self { members }
    }

    pub fn members(&self) -> &[Participant] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn find(&self, member_id: &MemberId) -> Option<&Participant> {
        self.members.iter().find(|p| &p.member_id == member_id)
    }

    pub fn sender_label(&self, sender: &MemberId, fallback: &FallbackIdentity) -> String {
        self.find(sender)
            .map(Participant::label)
            .unwrap_or_else(|| fallback.label())
    }

    pub fn avatar_url(&self, sender: &MemberId, fallback: &FallbackIdentity) -> String {
        self.find(sender)
            .map(|p| p.profile_image_url.clone())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| fallback.avatar_url.clone())
    }

    /// Labels of everyone but the local user, deduplicated in roster order.
    pub fn conversation_title(&self, local_user: &MemberId, fallback: &FallbackIdentity) -> String {
        if self.members.is_empty() {
            return fallback.label();
        }
        let mut seen = HashSet::new();
        let labels: Vec<String> = self
            .members
            .iter()
            .filter(|p| &p.member_id != local_user)
            .map(Participant::label)
            .filter(|label| seen.insert(label.clone()))
            .collect();
        labels.join(", ")
    }
}

pub fn avatar_url(
    profile: Option<&MemberProfileRecord>,
    storage_base_url: &str,
    default_avatar: &str,
) -> String {
    match profile.and_then(|p| p.avatar_ref.as_deref()) {
        Some(stored) if !stored.is_empty() => format!("{storage_base_url}{stored}"),
        _ => default_avatar.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GroupingPresenter {
    window_ms: i64,
}

impl Default for GroupingPresenter {
    fn default() -> Self {
        Self::new(DEFAULT_GROUPING_WINDOW_MS)
    }
}

impl GroupingPresenter {
    pub fn new(window_ms: i64) -> Self {
        Self { window_ms }
    }

    pub fn decorate(
        &self,
        sequence: &[ChatMessage],
        local_user: &MemberId,
        roster: &ParticipantRoster,
        fallback: &FallbackIdentity,
    ) -> Vec<DisplayMessage> {
        sequence
            .iter()
            .enumerate()
            .map(|(index, message)| {
                let previous = index.checked_sub(1).map(|i| &sequence[i]);
                DisplayMessage {
                    message: message.clone(),
                    hide_profile: self.hides_profile(message, previous, local_user),
                    is_mine: &message.sender == local_user,
                    is_banner: message.is_system(),
                    sender_label: roster.sender_label(&message.sender, fallback),
                    avatar_url: roster.avatar_url(&message.sender, fallback),
                }
            })
            .collect()
    }

    fn hides_profile(
        &self,
        message: &ChatMessage,
        previous: Option<&ChatMessage>,
        local_user: &MemberId,
    ) -> bool {
        let Some(previous) = previous else {
            return false;
        };
        if message.is_system() || previous.is_system() {
            return false;
        }
        let gap_ms = (message.send_time - previous.send_time)
            .num_milliseconds()
            .abs();
        message.sender == previous.sender
            && gap_ms <= self.window_ms
            && &previous.sender != local_user
    }
}

#[cfg(test)]
#[path = "tests/grouping_tests.rs"]
mod tests;
