pub mod groups;
pub mod images;
pub mod messages;
pub mod users;
pub mod visits;

use rusqlite::Row;
use rusqlite::types::ToSql;

use crate::models::ProfileRow;

/// Columns selected for a joined user profile, aliased as `u`.
pub(crate) const PROFILE_COLUMNS: &str = "u.id, u.username, u.status, u.image_id";

/// Read the four profile columns starting at `offset`.
pub(crate) fn profile_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(offset)?,
        username: row.get(offset + 1)?,
        status: row.get(offset + 2)?,
        image_id: row.get(offset + 3)?,
    })
}

/// `?1, ?2, ...` for an `IN (...)` clause over `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

pub(crate) fn as_params(ids: &[String]) -> Vec<&dyn ToSql> {
    ids.iter().map(|id| id as &dyn ToSql).collect()
}
