/// Database row types. These map directly to SQLite rows.
/// Distinct from parlor-types API models to keep the DB layer independent.
/// Timestamps are microseconds since the Unix epoch.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub status: String,
    pub image_id: Option<String>,
    pub deleted: bool,
    pub created_at: i64,
}

/// The public subset of a user row, joined into group and message queries.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub status: String,
    pub image_id: Option<String>,
}

pub struct ImageRow {
    pub id: String,
    pub image_type: String,
    pub data: Vec<u8>,
}

pub struct GroupRow {
    pub id: String,
    pub title: String,
    pub image_id: Option<String>,
    pub creator_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct MemberRow {
    pub profile: ProfileRow,
    pub role: String,
}

pub struct GroupSummaryRow {
    pub id: String,
    pub title: String,
    pub image_id: Option<String>,
    pub latest_body: Option<String>,
    pub latest_sender: Option<String>,
    pub latest_at: Option<i64>,
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub group_id: String,
    pub sender: ProfileRow,
    pub kind: String,
    pub body: String,
    pub reply_to: Option<String>,
    pub created_at: i64,
}

/// Ownership and state of a message, used for permission checks.
pub struct MessageMeta {
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    pub kind: String,
}

pub struct MessageImageRow {
    pub message_id: String,
    pub image: ImageRow,
}

pub struct ReplyRow {
    pub id: String,
    pub body: String,
    pub sender_id: String,
    pub sender_username: String,
}

pub struct VisitRow {
    pub user: ProfileRow,
    pub last_active_at: i64,
}
