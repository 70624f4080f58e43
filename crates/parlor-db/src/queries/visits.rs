use anyhow::Result;
use rusqlite::OptionalExtension;

use super::{PROFILE_COLUMNS, profile_at};
use crate::Database;
use crate::models::VisitRow;

impl Database {
    /// Record that the user looked at the group now. Creates the record on
    /// first touch and advances it afterwards. Returns the new timestamp.
    pub fn touch_visit(&self, user_id: &str, group_id: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let now = self.now_micros();
            conn.execute(
                "INSERT INTO last_visits (user_id, group_id, last_active_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, group_id) DO UPDATE SET last_active_at = excluded.last_active_at",
                rusqlite::params![user_id, group_id, now],
            )?;
            Ok(now)
        })
    }

    pub fn get_visit(&self, user_id: &str, group_id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let ts = conn
                .query_row(
                    "SELECT last_active_at FROM last_visits WHERE user_id = ?1 AND group_id = ?2",
                    [user_id, group_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(ts)
        })
    }

    pub fn list_visits(&self, group_id: &str) -> Result<Vec<VisitRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, v.last_active_at FROM last_visits v
                 JOIN users u ON u.id = v.user_id
                 WHERE v.group_id = ?1",
                PROFILE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([group_id], |row| {
                    Ok(VisitRow {
                        user: profile_at(row, 0)?,
                        last_active_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewGroup;
    use crate::queries::fixtures;

    #[test]
    fn touch_creates_then_advances_single_record() {
        let db = Database::open_in_memory().unwrap();
        let a = fixtures::user(&db, "alice");
        let g = uuid::Uuid::new_v4().to_string();
        db.create_group(NewGroup {
            id: g.clone(),
            title: "t".into(),
            creator_id: a.clone(),
            members: vec![],
            image: None,
        })
        .unwrap();

        assert_eq!(db.get_visit(&a, &g).unwrap(), None);

        let first = db.touch_visit(&a, &g).unwrap();
        let second = db.touch_visit(&a, &g).unwrap();
        assert!(second > first);
        assert_eq!(db.get_visit(&a, &g).unwrap(), Some(second));

        let visits = db.list_visits(&g).unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].user.username, "alice");
        assert_eq!(visits[0].last_active_at, second);
    }
}
