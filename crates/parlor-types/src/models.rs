use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a user inside one group. A user with no role is not a member.
///
/// Every role implies participation, so "moderator without participant"
/// cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Participant,
    Moderator,
    /// Pinned at creation; never granted or revoked afterwards.
    Creator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Moderator => "moderator",
            Self::Creator => "creator",
        }
    }

    /// Moderators and the creator may manage participants.
    pub fn is_moderator(self) -> bool {
        matches!(self, Self::Moderator | Self::Creator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "participant" => Ok(Self::Participant),
            "moderator" => Ok(Self::Moderator),
            "creator" => Ok(Self::Creator),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Deleted,
    /// Client-defined tag we store but do not interpret.
    Other,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Deleted => "deleted",
            Self::Other => "other",
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "deleted" => Ok(Self::Deleted),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown message kind '{}'", other)),
        }
    }
}

/// Body shown in place of a soft-deleted message.
pub const DELETED_MESSAGE_BODY: &str = "This message has been deleted";

/// Public view of an account, as embedded in group and message payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub status: String,
    pub image_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub image_type: String,
    /// Base64 (standard alphabet) encoded payload.
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: Uuid,
    pub body: String,
    pub sender_id: Uuid,
    pub sender_username: String,
}

/// A message with sender, images and reply target resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub group_id: Uuid,
    pub kind: MessageKind,
    pub body: String,
    pub sender: UserProfile,
    pub images: Vec<Image>,
    pub reply: Option<ReplyPreview>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub title: String,
    pub image_id: Option<Uuid>,
    pub creator: UserProfile,
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn moderators(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.role.is_moderator())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    pub user: UserProfile,
    pub last_active_at: DateTime<Utc>,
}
