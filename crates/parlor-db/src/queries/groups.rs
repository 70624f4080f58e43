use anyhow::{Result, anyhow};
use parlor_types::models::Role;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use super::images::{delete_images, insert_image, replace_image};
use super::users::NewImage;
use super::{PROFILE_COLUMNS, profile_at};
use crate::Database;
use crate::models::{GroupRow, MemberRow};

pub struct NewGroup {
    pub id: String,
    pub title: String,
    pub creator_id: String,
    /// Members other than the creator.
    pub members: Vec<(String, Role)>,
    pub image: Option<NewImage>,
}

/// What a group cascade removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CascadeReport {
    pub messages: usize,
    pub images: usize,
    pub members: usize,
}

impl Database {
    /// Insert the group, its creator and members, and propagate membership
    /// to every member's side. Returns the creation timestamp.
    pub fn create_group(&self, group: NewGroup) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = self.now_micros();

            let image_id = match &group.image {
                Some(image) => {
                    insert_image(&tx, &image.id, &image.image_type, &image.data)?;
                    Some(image.id.as_str())
                }
                None => None,
            };

            tx.execute(
                "INSERT INTO groups (id, title, image_id, creator_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![group.id, group.title, image_id, group.creator_id, now],
            )?;

            add_member(&tx, &group.id, &group.creator_id, Role::Creator, now)?;
            for (user_id, role) in &group.members {
                if *role == Role::Creator {
                    return Err(anyhow!("only the creator may hold the creator role"));
                }
                if user_id != &group.creator_id {
                    add_member(&tx, &group.id, user_id, *role, now)?;
                }
            }

            tx.commit()?;
            Ok(now)
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, title, image_id, creator_id, created_at, updated_at FROM groups WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(GroupRow {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            image_id: row.get(2)?,
                            creator_id: row.get(3)?,
                            created_at: row.get(4)?,
                            updated_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Members in join order, creator first.
    pub fn get_members(&self, group_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, gm.role FROM group_members gm
                 JOIN users u ON u.id = gm.user_id
                 WHERE gm.group_id = ?1
                 ORDER BY gm.role = 'creator' DESC, gm.joined_at, u.username",
                PROFILE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([group_id], |row| {
                    Ok(MemberRow {
                        profile: profile_at(row, 0)?,
                        role: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The user's role in the group, read from the authoritative member rows.
    pub fn get_role(&self, group_id: &str, user_id: &str) -> Result<Option<Role>> {
        self.with_conn(|conn| query_role(conn, group_id, user_id))
    }

    pub fn add_participant(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = self.now_micros();
            add_member(&tx, group_id, user_id, Role::Participant, now)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Drop a non-creator member from both sides of the membership and
    /// forget their last visit. Returns false if nothing was removed.
    pub fn remove_participant(&self, group_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2 AND role != 'creator'",
                [group_id, user_id],
            )?;
            if removed == 0 {
                return Ok(false);
            }
            tx.execute(
                "DELETE FROM user_groups WHERE group_id = ?1 AND user_id = ?2",
                [group_id, user_id],
            )?;
            tx.execute(
                "DELETE FROM last_visits WHERE group_id = ?1 AND user_id = ?2",
                [group_id, user_id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Switch a member between participant and moderator. The creator row
    /// is never touched. Returns false if no row changed.
    pub fn set_role(&self, group_id: &str, user_id: &str, role: Role) -> Result<bool> {
        if role == Role::Creator {
            return Err(anyhow!("the creator role cannot be granted"));
        }
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE group_members SET role = ?3
                 WHERE group_id = ?1 AND user_id = ?2 AND role != 'creator'",
                [group_id, user_id, role.as_str()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Replace the group's image in place, or store and link a new one.
    pub fn set_group_image(&self, group_id: &str, image: NewImage) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = self.now_micros();
            let current: Option<String> = tx
                .query_row("SELECT image_id FROM groups WHERE id = ?1", [group_id], |row| row.get::<_, Option<String>>(0))
                .optional()?
                .flatten();

            let image_id = match current {
                Some(existing) if replace_image(&tx, &existing, &image.image_type, &image.data)? => existing,
                _ => {
                    insert_image(&tx, &image.id, &image.image_type, &image.data)?;
                    image.id
                }
            };
            tx.execute(
                "UPDATE groups SET image_id = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![group_id, image_id, now],
            )?;
            tx.commit()?;
            Ok(image_id)
        })
    }

    /// Delete the group with everything it owns: membership on both sides,
    /// visits, messages, message images and the group image.
    ///
    /// Runs in one transaction; the group row goes last, so if any step
    /// fails the group still exists and nothing is removed.
    pub fn delete_group_cascade(&self, group_id: &str) -> Result<CascadeReport> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let group_image: Option<String> = tx
                .query_row("SELECT image_id FROM groups WHERE id = ?1", [group_id], |row| row.get::<_, Option<String>>(0))
                .optional()?
                .ok_or_else(|| anyhow!("Group not found: {}", group_id))?;

            let mut image_ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT mi.image_id FROM message_images mi
                     JOIN messages m ON m.id = mi.message_id
                     WHERE m.group_id = ?1",
                )?;
                stmt.query_map([group_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut report = CascadeReport::default();

            report.members = tx.execute("DELETE FROM group_members WHERE group_id = ?1", [group_id])?;
            tx.execute("DELETE FROM user_groups WHERE group_id = ?1", [group_id])?;
            tx.execute("DELETE FROM last_visits WHERE group_id = ?1", [group_id])?;
            tx.execute(
                "DELETE FROM message_images
                 WHERE message_id IN (SELECT id FROM messages WHERE group_id = ?1)",
                [group_id],
            )?;
            report.messages = tx.execute("DELETE FROM messages WHERE group_id = ?1", [group_id])?;

            image_ids.extend(group_image);
            report.images = delete_images(&tx, &image_ids)?;

            tx.execute("DELETE FROM groups WHERE id = ?1", [group_id])?;
            tx.commit()?;

            info!(
                "Group {} deleted: {} messages, {} images, {} members",
                group_id, report.messages, report.images, report.members
            );
            Ok(report)
        })
    }
}

fn add_member(conn: &Connection, group_id: &str, user_id: &str, role: Role, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![group_id, user_id, role.as_str(), now],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
        [user_id, group_id],
    )?;
    Ok(())
}

pub(crate) fn query_role(conn: &Connection, group_id: &str, user_id: &str) -> Result<Option<Role>> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            [group_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    role.map(|r| r.parse::<Role>().map_err(|e| anyhow!(e))).transpose()
}
