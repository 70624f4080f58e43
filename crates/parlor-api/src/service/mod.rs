//! Group, message and visit operations, independent of HTTP.
//!
//! Every public method takes the acting user's id, checks it against the
//! group's member rows through [`crate::policy`], then reads or writes the
//! store.

mod accounts;
mod groups;
mod sync;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::warn;
use uuid::Uuid;

use parlor_db::Database;
use parlor_db::NewImage;
use parlor_db::models::{GroupRow, ImageRow, ProfileRow};
use parlor_types::api::ImageUpload;
use parlor_types::models::{Image, Role, UserProfile};

use crate::error::{ApiError, ApiResult};

/// 5 MB decoded limit per image
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
}

impl ChatService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn require_group(&self, group_id: Uuid) -> ApiResult<GroupRow> {
        self.db
            .get_group(&group_id.to_string())?
            .ok_or_else(|| ApiError::not_found("Group", group_id))
    }

    /// Role of `user_id` in an existing group.
    fn role_in(&self, group_id: Uuid, user_id: Uuid) -> ApiResult<Option<Role>> {
        self.require_group(group_id)?;
        Ok(self.db.get_role(&group_id.to_string(), &user_id.to_string())?)
    }

    /// The acting account must still exist and not be soft-deleted. Tokens
    /// issued before an account was deleted fail here.
    pub fn require_account(&self, user_id: Uuid) -> ApiResult<()> {
        match self.db.get_user_by_id(&user_id.to_string())? {
            Some(row) if !row.deleted => Ok(()),
            _ => Err(ApiError::Authentication),
        }
    }

    /// Role of the acting user, who must hold a live account.
    fn actor_role_in(&self, group_id: Uuid, actor: Uuid) -> ApiResult<Option<Role>> {
        self.require_account(actor)?;
        self.role_in(group_id, actor)
    }

    /// Live (not soft-deleted) account, or NotFound.
    fn require_user(&self, user_id: Uuid) -> ApiResult<ProfileRow> {
        match self.db.get_user_by_id(&user_id.to_string())? {
            Some(row) if !row.deleted => Ok(ProfileRow {
                id: row.id,
                username: row.username,
                status: row.status,
                image_id: row.image_id,
            }),
            _ => Err(ApiError::not_found("User", user_id)),
        }
    }

    pub fn get_image(&self, image_id: Uuid) -> ApiResult<Image> {
        let row = self
            .db
            .get_image(&image_id.to_string())?
            .ok_or_else(|| ApiError::not_found("Image", image_id))?;
        Ok(to_image(row))
    }
}

pub(crate) fn decode_image(upload: &ImageUpload) -> ApiResult<NewImage> {
    if upload.image_type.trim().is_empty() {
        return Err(ApiError::validation("Image type can't be empty."));
    }
    let data = B64
        .decode(&upload.data)
        .map_err(|_| ApiError::validation("Image data must be base64."))?;
    if data.is_empty() {
        return Err(ApiError::validation("Image data can't be empty."));
    }
    if data.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::validation("Image is too large."));
    }
    Ok(NewImage {
        id: Uuid::new_v4().to_string(),
        image_type: upload.image_type.clone(),
        data,
    })
}

/// A write the uniqueness indexes rejected is a conflict, not a store failure.
pub(crate) fn conflict_or_store(err: anyhow::Error, reason: &str) -> ApiError {
    if parlor_db::is_unique_violation(&err) {
        ApiError::Conflict(reason.to_string())
    } else {
        ApiError::Store(err)
    }
}

pub(crate) fn to_image(row: ImageRow) -> Image {
    Image {
        id: parse_id(&row.id, "image"),
        image_type: row.image_type,
        data: B64.encode(&row.data),
    }
}

pub(crate) fn to_profile(row: ProfileRow) -> UserProfile {
    UserProfile {
        id: parse_id(&row.id, "user"),
        image_id: row.image_id.as_deref().map(|id| parse_id(id, "image")),
        username: row.username,
        status: row.status,
    }
}

/// Ids are written by us as UUIDs; a bad one means a corrupt row.
pub(crate) fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}
