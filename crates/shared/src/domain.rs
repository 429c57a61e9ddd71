use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(MessageId);
string_id_newtype!(RoomId);
string_id_newtype!(MemberId);

/// Transcript entry kind as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Talk,
    File,
    System,
}

/// Identity shown for senders that are missing from the room roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackIdentity {
    pub name: String,
    pub rank: String,
    pub avatar_url: String,
}

impl FallbackIdentity {
    pub fn label(&self) -> String {
        display_label(&self.name, &self.rank)
    }
}

/// A roster member after profile enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub member_id: MemberId,
    pub name: String,
    pub rank_name: String,
    pub profile_image_url: String,
}

impl Participant {
    pub fn label(&self) -> String {
        display_label(&self.name, &self.rank_name)
    }
}

pub fn display_label(name: &str, rank: &str) -> String {
    if rank.is_empty() {
        name.to_string()
    } else {
        format!("{name} {rank}")
    }
}
