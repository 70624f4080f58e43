use std::collections::HashMap;

use tracing::{debug, info};
use uuid::Uuid;

use parlor_db::NewMessage;
use parlor_db::models::MessageRow;
use parlor_types::api::{SendMessageRequest, VisitResponse};
use parlor_types::models::{Image, Message, MessageKind, ReplyPreview, Visit};

use super::{ChatService, decode_image, parse_id, to_image, to_profile};
use crate::error::{ApiError, ApiResult};
use crate::policy;

pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_IMAGES_PER_MESSAGE: usize = 10;
const MAX_BODY_CHARS: usize = 4000;

impl ChatService {
    /// Everything posted since the caller's last visit, newest first.
    ///
    /// Without a recorded visit the whole log is returned. The result is
    /// never truncated.
    pub fn incremental_sync(&self, user_id: Uuid, group_id: Uuid) -> ApiResult<Vec<Message>> {
        policy::require_participant(self.actor_role_in(group_id, user_id)?)?;

        let gid = group_id.to_string();
        let since = self.db.get_visit(&user_id.to_string(), &gid)?;
        let rows = self.db.get_messages_since(&gid, since)?;
        debug!("Sync for {} in {}: {} unread", user_id, group_id, rows.len());
        self.resolve_messages(rows)
    }

    /// A page of history, newest first, for scrolling back past the unread
    /// window.
    pub fn paged_history(&self, user_id: Uuid, group_id: Uuid, skip: u32, limit: u32) -> ApiResult<Vec<Message>> {
        policy::require_participant(self.actor_role_in(group_id, user_id)?)?;

        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let rows = self
            .db
            .get_messages_page(&group_id.to_string(), skip, limit)?;
        self.resolve_messages(rows)
    }

    pub fn touch_visit(&self, user_id: Uuid, group_id: Uuid) -> ApiResult<VisitResponse> {
        policy::require_participant(self.actor_role_in(group_id, user_id)?)?;

        let ts = self
            .db
            .touch_visit(&user_id.to_string(), &group_id.to_string())?;
        Ok(VisitResponse {
            group_id,
            user_id,
            last_active_at: parlor_db::micros_to_datetime(ts),
        })
    }

    pub fn get_visit(&self, user_id: Uuid, group_id: Uuid) -> ApiResult<Option<chrono::DateTime<chrono::Utc>>> {
        let ts = self
            .db
            .get_visit(&user_id.to_string(), &group_id.to_string())?;
        Ok(ts.map(parlor_db::micros_to_datetime))
    }

    /// Who has looked at the group and when. Unordered.
    pub fn list_visits(&self, group_id: Uuid) -> ApiResult<Vec<Visit>> {
        self.require_group(group_id)?;
        let visits = self
            .db
            .list_visits(&group_id.to_string())?
            .into_iter()
            .map(|row| Visit {
                user: to_profile(row.user),
                last_active_at: parlor_db::micros_to_datetime(row.last_active_at),
            })
            .collect();
        Ok(visits)
    }

    pub fn send_message(&self, sender: Uuid, group_id: Uuid, req: SendMessageRequest) -> ApiResult<Message> {
        policy::require_participant(self.actor_role_in(group_id, sender)?)?;

        if req.body.trim().is_empty() && req.images.is_empty() {
            return Err(ApiError::validation("Message can't be empty."));
        }
        if req.body.chars().count() > MAX_BODY_CHARS {
            return Err(ApiError::validation("Message is too long."));
        }
        if req.images.len() > MAX_IMAGES_PER_MESSAGE {
            return Err(ApiError::validation("Too many images attached."));
        }
        let kind = req.kind.unwrap_or(MessageKind::Text);
        if kind == MessageKind::Deleted {
            return Err(ApiError::validation("Messages can't be sent as deleted."));
        }

        let gid = group_id.to_string();
        if let Some(reply_to) = req.reply_to {
            match self.db.get_message_meta(&reply_to.to_string())? {
                Some(target) if target.group_id == gid => {}
                _ => return Err(ApiError::not_found("Reply target", reply_to)),
            }
        }

        let images = req.images.iter().map(decode_image).collect::<ApiResult<Vec<_>>>()?;
        let message_id = Uuid::new_v4();
        self.db.append_message(NewMessage {
            id: message_id.to_string(),
            group_id: gid,
            sender_id: sender.to_string(),
            kind,
            body: req.body,
            reply_to: req.reply_to.map(|id| id.to_string()),
            images,
        })?;

        self.load_message(message_id)
    }

    /// Sender-only. The message stays in the log with placeholder text.
    pub fn delete_message(&self, actor: Uuid, message_id: Uuid) -> ApiResult<Message> {
        self.require_account(actor)?;
        let meta = self
            .db
            .get_message_meta(&message_id.to_string())?
            .ok_or_else(|| ApiError::not_found("Message", message_id))?;
        policy::require_sender(actor, parse_id(&meta.sender_id, "user"))?;

        if meta.kind != MessageKind::Deleted.as_str() {
            let removed = self.db.soft_delete_message(&meta.id)?;
            info!(
                "Message {} in group {} deleted by sender ({} images removed)",
                message_id, meta.group_id, removed
            );
        }

        self.load_message(message_id)
    }

    fn load_message(&self, message_id: Uuid) -> ApiResult<Message> {
        let row = self
            .db
            .get_message(&message_id.to_string())?
            .ok_or_else(|| ApiError::not_found("Message", message_id))?;
        let mut resolved = self.resolve_messages(vec![row])?;
        resolved
            .pop()
            .ok_or_else(|| ApiError::not_found("Message", message_id))
    }

    /// Attach images and reply previews to a batch of rows, keeping order.
    fn resolve_messages(&self, rows: Vec<MessageRow>) -> ApiResult<Vec<Message>> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let reply_ids: Vec<String> = rows.iter().filter_map(|r| r.reply_to.clone()).collect();

        let mut images: HashMap<String, Vec<Image>> = HashMap::new();
        for row in self.db.get_images_for_messages(&ids)? {
            images.entry(row.message_id).or_default().push(to_image(row.image));
        }

        let replies: HashMap<String, ReplyPreview> = self
            .db
            .get_reply_previews(&reply_ids)?
            .into_iter()
            .map(|r| {
                let preview = ReplyPreview {
                    id: parse_id(&r.id, "message"),
                    body: r.body,
                    sender_id: parse_id(&r.sender_id, "user"),
                    sender_username: r.sender_username,
                };
                (r.id, preview)
            })
            .collect();

        let messages = rows
            .into_iter()
            .map(|row| Message {
                id: parse_id(&row.id, "message"),
                group_id: parse_id(&row.group_id, "group"),
                kind: row.kind.parse().unwrap_or(MessageKind::Other),
                images: images.remove(&row.id).unwrap_or_default(),
                reply: row.reply_to.as_ref().and_then(|id| replies.get(id).cloned()),
                body: row.body,
                sender: to_profile(row.sender),
                created_at: parlor_db::micros_to_datetime(row.created_at),
            })
            .collect();
        Ok(messages)
    }
}
