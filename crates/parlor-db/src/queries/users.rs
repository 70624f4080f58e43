use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use super::images::{delete_images, insert_image, replace_image};
use super::{PROFILE_COLUMNS, profile_at};
use crate::Database;
use crate::models::{GroupSummaryRow, ProfileRow, UserRow};

/// An image blob about to be stored under a fresh id.
pub struct NewImage {
    pub id: String,
    pub image_type: String,
    pub data: Vec<u8>,
}

const USER_COLUMNS: &str =
    "id, username, email, password, status, image_id, deleted, created_at";

impl Database {
    // -- Accounts --

    pub fn create_user(&self, id: &str, username: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let now = self.now_micros();
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, email, password_hash, now],
            )?;
            Ok(())
        })
    }

    /// Live account by email. Soft-deleted accounts never match.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE email = ?1 AND deleted = 0", USER_COLUMNS);
            Ok(conn.query_row(&sql, [email], user_from_row).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
            Ok(conn.query_row(&sql, [id], user_from_row).optional()?)
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, id))
    }

    pub fn username_taken(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1 AND deleted = 0",
                    [username],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            Ok(taken)
        })
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        Ok(self.get_user_by_email(email)?.is_some())
    }

    /// Returns false when nothing changed (unknown user or same value).
    pub fn set_status(&self, id: &str, status: &str) -> Result<bool> {
        self.update_user_field(id, "status", status)
    }

    pub fn set_username(&self, id: &str, username: &str) -> Result<bool> {
        self.update_user_field(id, "username", username)
    }

    pub fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.update_user_field(id, "password", password_hash)
    }

    fn update_user_field(&self, id: &str, column: &'static str, value: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "UPDATE users SET {col} = ?2 WHERE id = ?1 AND deleted = 0 AND {col} != ?2",
                col = column
            );
            Ok(conn.execute(&sql, [id, value])? == 1)
        })
    }

    /// Replace the user's image in place, or store and link a new one.
    /// Returns the id of the image now attached.
    pub fn set_user_image(&self, user_id: &str, image: NewImage) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row("SELECT image_id FROM users WHERE id = ?1", [user_id], |row| row.get::<_, Option<String>>(0))
                .optional()?
                .flatten();

            if let Some(existing) = current {
                if replace_image(&tx, &existing, &image.image_type, &image.data)? {
                    tx.commit()?;
                    return Ok(existing);
                }
            }

            insert_image(&tx, &image.id, &image.image_type, &image.data)?;
            tx.execute(
                "UPDATE users SET image_id = ?2 WHERE id = ?1",
                [user_id, image.id.as_str()],
            )?;
            tx.commit()?;
            Ok(image.id)
        })
    }

    /// Detach and delete the user's image. Returns false if there was none.
    pub fn clear_user_image(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row("SELECT image_id FROM users WHERE id = ?1", [user_id], |row| row.get::<_, Option<String>>(0))
                .optional()?
                .flatten();
            let Some(image_id) = current else {
                return Ok(false);
            };
            tx.execute("UPDATE users SET image_id = NULL WHERE id = ?1", [user_id])?;
            delete_images(&tx, &[image_id])?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Blank the account in place and drop it from every contact list.
    /// Group membership and sent messages stay.
    pub fn soft_delete_user(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current: Option<Option<String>> = tx
                .query_row(
                    "SELECT image_id FROM users WHERE id = ?1 AND deleted = 0",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(image_id) = current else {
                return Ok(false);
            };
            tx.execute(
                "UPDATE users
                 SET username = 'Deleted', email = '', password = '', status = '',
                     image_id = NULL, deleted = 1
                 WHERE id = ?1",
                [user_id],
            )?;
            if let Some(image_id) = image_id {
                delete_images(&tx, &[image_id])?;
            }
            tx.execute(
                "DELETE FROM contacts WHERE user_id = ?1 OR contact_id = ?1",
                [user_id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    // -- Contacts --

    /// Toggle a contact: removes if present, inserts if not.
    /// Returns true when the contact was added.
    pub fn toggle_contact(&self, user_id: &str, contact_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM contacts WHERE user_id = ?1 AND contact_id = ?2",
                [user_id, contact_id],
            )?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO contacts (user_id, contact_id) VALUES (?1, ?2)",
                [user_id, contact_id],
            )?;
            Ok(true)
        })
    }

    pub fn get_contacts(&self, user_id: &str) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM contacts c JOIN users u ON u.id = c.contact_id
                 WHERE c.user_id = ?1 ORDER BY u.username",
                PROFILE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| profile_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The user's membership set with each group's newest message.
    pub fn get_user_groups(&self, user_id: &str) -> Result<Vec<GroupSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.title, g.image_id, m.body, u.username, m.created_at
                 FROM user_groups ug
                 JOIN groups g ON g.id = ug.group_id
                 LEFT JOIN messages m ON m.seq = (
                     SELECT seq FROM messages WHERE group_id = g.id
                     ORDER BY created_at DESC, seq DESC LIMIT 1
                 )
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE ug.user_id = ?1
                 ORDER BY COALESCE(m.created_at, g.created_at) DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(GroupSummaryRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        image_id: row.get(2)?,
                        latest_body: row.get(3)?,
                        latest_sender: row.get(4)?,
                        latest_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_profile(conn: &Connection, id: &str) -> Result<Option<ProfileRow>> {
    let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", PROFILE_COLUMNS);
    Ok(conn.query_row(&sql, [id], |row| profile_at(row, 0)).optional()?)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        status: row.get(4)?,
        image_id: row.get(5)?,
        deleted: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    fn png(id: &str, data: &[u8]) -> NewImage {
        NewImage {
            id: id.to_string(),
            image_type: "image/png".into(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn profile_updates_report_changes() {
        let db = Database::open_in_memory().unwrap();
        let id = fixtures::user(&db, "alice");

        assert!(db.set_status(&id, "busy").unwrap());
        assert!(!db.set_status(&id, "busy").unwrap());
        assert!(db.set_username(&id, "alicia").unwrap());
        assert!(db.username_taken("alicia").unwrap());
        assert!(!db.username_taken("alice").unwrap());
    }

    #[test]
    fn user_image_is_replaced_in_place() {
        let db = Database::open_in_memory().unwrap();
        let id = fixtures::user(&db, "alice");

        let first = db.set_user_image(&id, png("img-1", b"one")).unwrap();
        let second = db.set_user_image(&id, png("img-2", b"two")).unwrap();
        assert_eq!(first, "img-1");
        assert_eq!(second, "img-1");
        assert_eq!(db.get_image("img-1").unwrap().unwrap().data, b"two");
        assert!(db.get_image("img-2").unwrap().is_none());

        assert!(db.clear_user_image(&id).unwrap());
        assert!(db.get_image("img-1").unwrap().is_none());
        assert!(!db.clear_user_image(&id).unwrap());
    }

    #[test]
    fn soft_delete_blanks_fields_and_frees_names() {
        let db = Database::open_in_memory().unwrap();
        let id = fixtures::user(&db, "alice");
        db.set_user_image(&id, png("img-1", b"one")).unwrap();

        assert!(db.soft_delete_user(&id).unwrap());
        assert!(!db.soft_delete_user(&id).unwrap());

        let row = db.get_user_by_id(&id).unwrap().unwrap();
        assert!(row.deleted);
        assert_eq!(row.username, "Deleted");
        assert_eq!(row.email, "");
        assert!(row.image_id.is_none());
        assert!(db.get_image("img-1").unwrap().is_none());
        assert!(db.get_user_by_email("alice@example.com").unwrap().is_none());

        // A second deleted account does not collide on the placeholder name.
        let other = fixtures::user(&db, "bob");
        assert!(db.soft_delete_user(&other).unwrap());
        // And the original name can be registered again.
        fixtures::user(&db, "alice");
    }

    #[test]
    fn soft_delete_removes_account_from_other_contact_lists() {
        let db = Database::open_in_memory().unwrap();
        let a = fixtures::user(&db, "alice");
        let b = fixtures::user(&db, "bob");
        assert!(db.toggle_contact(&a, &b).unwrap());
        assert!(db.toggle_contact(&b, &a).unwrap());

        assert!(db.soft_delete_user(&b).unwrap());
        assert!(db.get_contacts(&a).unwrap().is_empty());
        assert!(db.get_contacts(&b).unwrap().is_empty());
    }

    #[test]
    fn contacts_toggle() {
        let db = Database::open_in_memory().unwrap();
        let a = fixtures::user(&db, "alice");
        let b = fixtures::user(&db, "bob");

        assert!(db.toggle_contact(&a, &b).unwrap());
        assert_eq!(db.get_contacts(&a).unwrap()[0].username, "bob");
        assert!(!db.toggle_contact(&a, &b).unwrap());
        assert!(db.get_contacts(&a).unwrap().is_empty());
    }
}
