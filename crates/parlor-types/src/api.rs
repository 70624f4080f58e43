use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageKind, Role, UserProfile};

// -- JWT Claims --

/// JWT claims carried by every authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub token: String,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetUsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Image upload; `data` is standard base64.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageUpload {
    pub image_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub image_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestMessage {
    pub body: String,
    pub sender_username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub title: String,
    pub image_id: Option<Uuid>,
    pub latest_message: Option<LatestMessage>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub email: String,
    pub contacts: Vec<UserProfile>,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Serialize)]
pub struct ContactToggleResponse {
    pub contact_id: Uuid,
    pub added: bool,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub title: String,
    #[serde(default)]
    pub participants: Vec<Uuid>,
    #[serde(default)]
    pub moderators: Vec<Uuid>,
    #[serde(default)]
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Serialize)]
pub struct CreateGroupResponse {
    pub id: Uuid,
    pub title: String,
    pub creator: Uuid,
}

/// Result of toggling a user's membership or moderator status.
#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub group_id: Uuid,
    pub user_id: Uuid,
    /// `None` when the user is no longer a member.
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct DeleteGroupResponse {
    pub group_id: Uuid,
    pub deleted_messages: usize,
    pub deleted_images: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub images: Vec<ImageUpload>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_page_size")]
    pub limit: u32,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

// -- Visits --

#[derive(Debug, Serialize)]
pub struct VisitResponse {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub last_active_at: DateTime<Utc>,
}
