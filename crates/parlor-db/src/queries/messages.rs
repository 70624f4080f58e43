use anyhow::Result;
use parlor_types::models::{DELETED_MESSAGE_BODY, MessageKind};
use rusqlite::{Connection, OptionalExtension, Row};

use super::images::{delete_images, insert_image};
use super::users::NewImage;
use super::{as_params, placeholders, profile_at};
use crate::Database;
use crate::models::{ImageRow, MessageImageRow, MessageMeta, MessageRow, ReplyRow};

pub struct NewMessage {
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub body: String,
    pub reply_to: Option<String>,
    pub images: Vec<NewImage>,
}

impl Database {
    /// Append a message to the end of the group's log.
    ///
    /// The timestamp is taken under the writer lock, so creation order and
    /// log order always agree. Returns the creation timestamp.
    pub fn append_message(&self, message: NewMessage) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = self.now_micros();

            tx.execute(
                "INSERT INTO messages (id, group_id, sender_id, kind, body, reply_to, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message.id,
                    message.group_id,
                    message.sender_id,
                    message.kind.as_str(),
                    message.body,
                    message.reply_to,
                    now,
                ],
            )?;

            for (position, image) in message.images.iter().enumerate() {
                insert_image(&tx, &image.id, &image.image_type, &image.data)?;
                tx.execute(
                    "INSERT INTO message_images (message_id, position, image_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![message.id, position as i64, image.id],
                )?;
            }

            tx.execute(
                "UPDATE groups SET updated_at = ?2 WHERE id = ?1",
                rusqlite::params![message.group_id, now],
            )?;

            tx.commit()?;
            Ok(now)
        })
    }

    pub fn get_message_meta(&self, id: &str) -> Result<Option<MessageMeta>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, group_id, sender_id, kind FROM messages WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(MessageMeta {
                            id: row.get(0)?,
                            group_id: row.get(1)?,
                            sender_id: row.get(2)?,
                            kind: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
            Ok(conn.query_row(&sql, [id], message_from_row).optional()?)
        })
    }

    /// Replace the body with the placeholder, mark the message deleted and
    /// drop its images. The message keeps its place in the log.
    /// Returns the number of image blobs removed.
    pub fn soft_delete_message(&self, id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let image_ids = message_image_ids(&tx, id)?;

            tx.execute("DELETE FROM message_images WHERE message_id = ?1", [id])?;
            let deleted = delete_images(&tx, &image_ids)?;
            tx.execute(
                "UPDATE messages SET body = ?2, kind = ?3 WHERE id = ?1",
                [id, DELETED_MESSAGE_BODY, MessageKind::Deleted.as_str()],
            )?;

            tx.commit()?;
            Ok(deleted)
        })
    }

    /// Messages created strictly after `since`, newest first. With no
    /// cutoff the whole log is returned.
    pub fn get_messages_since(&self, group_id: &str, since: Option<i64>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.group_id = ?1 AND m.created_at > ?2
                 ORDER BY m.created_at DESC, m.seq DESC",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![group_id, since.unwrap_or(i64::MIN)], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One page of the log, newest first.
    pub fn get_messages_page(&self, group_id: &str, skip: u32, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.group_id = ?1
                 ORDER BY m.created_at DESC, m.seq DESC
                 LIMIT ?2 OFFSET ?3",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![group_id, limit, skip], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_messages(&self, group_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM messages WHERE group_id = ?1", [group_id], |r| r.get(0))?;
            Ok(count as usize)
        })
    }

    /// Batch-fetch attached images for a set of messages, in attach order.
    pub fn get_images_for_messages(&self, message_ids: &[String]) -> Result<Vec<MessageImageRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT mi.message_id, i.id, i.image_type, i.data
                 FROM message_images mi JOIN images i ON i.id = mi.image_id
                 WHERE mi.message_id IN ({})
                 ORDER BY mi.message_id, mi.position",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(as_params(message_ids).as_slice(), |row| {
                    Ok(MessageImageRow {
                        message_id: row.get(0)?,
                        image: ImageRow {
                            id: row.get(1)?,
                            image_type: row.get(2)?,
                            data: row.get(3)?,
                        },
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch reply targets with their sender's name.
    pub fn get_reply_previews(&self, message_ids: &[String]) -> Result<Vec<ReplyRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT m.id, m.body, u.id, u.username
                 FROM messages m JOIN users u ON u.id = m.sender_id
                 WHERE m.id IN ({})",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(as_params(message_ids).as_slice(), |row| {
                    Ok(ReplyRow {
                        id: row.get(0)?,
                        body: row.get(1)?,
                        sender_id: row.get(2)?,
                        sender_username: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// JOIN users to fetch the sender profile in a single query
const MESSAGE_SELECT: &str = "SELECT m.seq, m.id, m.group_id, m.kind, m.body, m.reply_to, m.created_at, \
     u.id, u.username, u.status, u.image_id \
     FROM messages m JOIN users u ON u.id = m.sender_id";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        group_id: row.get(2)?,
        kind: row.get(3)?,
        body: row.get(4)?,
        reply_to: row.get(5)?,
        created_at: row.get(6)?,
        sender: profile_at(row, 7)?,
    })
}

fn message_image_ids(conn: &Connection, message_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT image_id FROM message_images WHERE message_id = ?1 ORDER BY position")?;
    let ids = stmt
        .query_map([message_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewGroup;
    use crate::queries::fixtures;

    struct Fixture {
        db: Database,
        alice: String,
        group: String,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let group = uuid::Uuid::new_v4().to_string();
        db.create_group(NewGroup {
            id: group.clone(),
            title: "t".into(),
            creator_id: alice.clone(),
            members: vec![],
            image: None,
        })
        .unwrap();
        Fixture { db, alice, group }
    }

    fn send(f: &Fixture, body: &str, images: usize) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        f.db.append_message(NewMessage {
            id: id.clone(),
            group_id: f.group.clone(),
            sender_id: f.alice.clone(),
            kind: MessageKind::Text,
            body: body.into(),
            reply_to: None,
            images: (0..images)
                .map(|_| NewImage {
                    id: uuid::Uuid::new_v4().to_string(),
                    image_type: "image/png".into(),
                    data: vec![1, 2, 3],
                })
                .collect(),
        })
        .unwrap();
        id
    }

    #[test]
    fn log_order_matches_creation_order() {
        let f = setup();
        for i in 0..10 {
            send(&f, &format!("m{}", i), 0);
        }
        let rows = f.db.get_messages_page(&f.group, 0, 100).unwrap();
        let bodies: Vec<_> = rows.iter().map(|r| r.body.as_str()).collect();
        assert_eq!(bodies, ["m9", "m8", "m7", "m6", "m5", "m4", "m3", "m2", "m1", "m0"]);
        for pair in rows.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
            assert!(pair[0].seq > pair[1].seq);
        }
    }

    #[test]
    fn since_is_strict() {
        let f = setup();
        send(&f, "old", 0);
        let cutoff = f.db.get_messages_page(&f.group, 0, 1).unwrap()[0].created_at;
        send(&f, "new", 0);

        let rows = f.db.get_messages_since(&f.group, Some(cutoff)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].body, "new");
        assert_eq!(f.db.get_messages_since(&f.group, None).unwrap().len(), 2);
    }

    #[test]
    fn soft_delete_keeps_position_and_drops_images() {
        let f = setup();
        send(&f, "first", 0);
        let target = send(&f, "with pictures", 2);
        send(&f, "last", 0);

        let attached = f.db.get_images_for_messages(&[target.clone()]).unwrap();
        assert_eq!(attached.len(), 2);

        assert_eq!(f.db.soft_delete_message(&target).unwrap(), 2);
        assert_eq!(f.db.count_messages(&f.group).unwrap(), 3);

        let row = f.db.get_message(&target).unwrap().unwrap();
        assert_eq!(row.body, DELETED_MESSAGE_BODY);
        assert_eq!(row.kind, "deleted");
        assert!(f.db.get_images_for_messages(&[target]).unwrap().is_empty());
        for image in attached {
            assert!(f.db.get_image(&image.image.id).unwrap().is_none());
        }
    }
}
