use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MemberId, MessageId, MessageKind, RoomId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub sender: MemberId,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(with = "timestamp")]
    pub send_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl ChatMessage {
    pub fn talk(room_id: RoomId, sender: MemberId, content: impl Into<String>) -> Self {
        Self {
            room_id,
            message_id: None,
            sender,
            content: content.into(),
            kind: MessageKind::Talk,
            send_time: Utc::now(),
            file_url: None,
        }
    }

    pub fn file(room_id: RoomId, sender: MemberId, uploaded: &UploadedFile) -> Self {
        Self {
            room_id,
            message_id: None,
            sender,
            content: uploaded.original_name.clone(),
            kind: MessageKind::File,
            send_time: Utc::now(),
            file_url: Some(uploaded.sys_name.clone()),
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }
}

/// Row of `GET /api/chat/members/{roomId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub member_id: MemberId,
    pub name: String,
    #[serde(default)]
    pub rank_name: Option<String>,
}

/// Body of `GET /member/info/{memberId}`. Only the fields the room view reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfileRecord {
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(
        default,
        rename = "profileImage_servName",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub original_name: String,
    pub sys_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub original_name: String,
    pub sys_name: String,
    #[serde(default)]
    pub size: u64,
}

impl FileEntry {
    pub fn size_label(&self) -> String {
        format!("{:.1} KB", self.size as f64 / 1024.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub room_id: RoomId,
    pub message_id: MessageId,
    pub reader_id: MemberId,
}

/// `sendTime` arrives as RFC 3339, as a zone-less local timestamp, or as epoch
/// milliseconds depending on the producer. Zone-less values are read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {ms}"))),
            Raw::Text(text) => parse(&text).map_err(de::Error::custom),
        }
    }

    pub fn parse(text: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| naive.and_utc())
            .map_err(|err| format!("invalid timestamp '{text}': {err}"))
    }
}
