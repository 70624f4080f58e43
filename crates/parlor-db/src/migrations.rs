use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL,
                email       TEXT NOT NULL,
                password    TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT '',
                image_id    TEXT,
                deleted     INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL
            );

            -- Deleted accounts keep their row with blanked fields, so
            -- uniqueness only applies to live accounts.
            CREATE UNIQUE INDEX idx_users_username ON users(username) WHERE deleted = 0;
            CREATE UNIQUE INDEX idx_users_email ON users(email) WHERE deleted = 0;

            CREATE TABLE contacts (
                user_id     TEXT NOT NULL REFERENCES users(id),
                contact_id  TEXT NOT NULL REFERENCES users(id),
                PRIMARY KEY (user_id, contact_id)
            );

            CREATE TABLE images (
                id          TEXT PRIMARY KEY,
                image_type  TEXT NOT NULL,
                data        BLOB NOT NULL
            );

            CREATE TABLE groups (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                image_id    TEXT,
                creator_id  TEXT NOT NULL REFERENCES users(id),
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE group_members (
                group_id    TEXT NOT NULL REFERENCES groups(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                role        TEXT NOT NULL CHECK (role IN ('participant', 'moderator', 'creator')),
                joined_at   INTEGER NOT NULL,
                PRIMARY KEY (group_id, user_id)
            );

            -- User-side membership set, kept in step with group_members.
            CREATE TABLE user_groups (
                user_id     TEXT NOT NULL REFERENCES users(id),
                group_id    TEXT NOT NULL REFERENCES groups(id),
                PRIMARY KEY (user_id, group_id)
            );

            CREATE TABLE messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                group_id    TEXT NOT NULL REFERENCES groups(id),
                sender_id   TEXT NOT NULL REFERENCES users(id),
                kind        TEXT NOT NULL,
                body        TEXT NOT NULL,
                reply_to    TEXT REFERENCES messages(id),
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_group ON messages(group_id, created_at);

            CREATE TABLE message_images (
                message_id  TEXT NOT NULL REFERENCES messages(id),
                position    INTEGER NOT NULL,
                image_id    TEXT NOT NULL REFERENCES images(id),
                PRIMARY KEY (message_id, position)
            );

            CREATE TABLE last_visits (
                user_id         TEXT NOT NULL REFERENCES users(id),
                group_id        TEXT NOT NULL REFERENCES groups(id),
                last_active_at  INTEGER NOT NULL,
                PRIMARY KEY (user_id, group_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
