use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use super::{as_params, placeholders};
use crate::Database;
use crate::models::ImageRow;

impl Database {
    pub fn get_image(&self, id: &str) -> Result<Option<ImageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, image_type, data FROM images WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(ImageRow {
                            id: row.get(0)?,
                            image_type: row.get(1)?,
                            data: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}

// Connection-level helpers so cascades can run them inside one transaction.

pub(crate) fn insert_image(conn: &Connection, id: &str, image_type: &str, data: &[u8]) -> Result<()> {
    conn.execute(
        "INSERT INTO images (id, image_type, data) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, image_type, data],
    )?;
    Ok(())
}

/// Overwrite an existing blob in place. Returns false if it no longer exists.
pub(crate) fn replace_image(conn: &Connection, id: &str, image_type: &str, data: &[u8]) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE images SET image_type = ?2, data = ?3 WHERE id = ?1",
        rusqlite::params![id, image_type, data],
    )?;
    Ok(changed == 1)
}

pub(crate) fn delete_images(conn: &Connection, ids: &[String]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!("DELETE FROM images WHERE id IN ({})", placeholders(ids.len()));
    let deleted = conn.execute(&sql, as_params(ids).as_slice())?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_and_delete_blobs() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn_mut(|conn| {
            insert_image(conn, "a", "image/png", b"one")?;
            insert_image(conn, "b", "image/png", b"two")?;
            assert!(replace_image(conn, "a", "image/jpeg", b"three")?);
            assert!(!replace_image(conn, "missing", "image/jpeg", b"x")?);
            Ok(())
        })
        .unwrap();

        let a = db.get_image("a").unwrap().unwrap();
        assert_eq!(a.image_type, "image/jpeg");
        assert_eq!(a.data, b"three");

        let removed = db
            .with_conn_mut(|conn| delete_images(conn, &["a".to_string(), "b".to_string()]))
            .unwrap();
        assert_eq!(removed, 2);
        assert!(db.get_image("b").unwrap().is_none());
    }
}
