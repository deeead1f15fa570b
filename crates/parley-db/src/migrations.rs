use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::SQL_NOW;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(&format!(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                display_name    TEXT NOT NULL,
                password_hash   TEXT NOT NULL,
                pin_hash        TEXT NOT NULL,
                public_key      TEXT,
                avatar_path     TEXT,
                is_admin        INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT ({now}),
                updated_at      TEXT NOT NULL DEFAULT ({now}),
                last_active_at  TEXT
            );

            CREATE TABLE invites (
                id          TEXT PRIMARY KEY,
                code        TEXT NOT NULL UNIQUE,
                created_by  TEXT REFERENCES users(id),
                max_uses    INTEGER NOT NULL CHECK (max_uses > 0),
                uses        INTEGER NOT NULL DEFAULT 0,
                active      INTEGER NOT NULL DEFAULT 1,
                expires_at  TEXT,
                created_at  TEXT NOT NULL DEFAULT ({now}),
                CHECK (uses >= 0 AND uses <= max_uses)
            );

            CREATE TABLE chats (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL DEFAULT '',
                is_group    INTEGER NOT NULL DEFAULT 0,
                created_by  TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL DEFAULT ({now})
            );

            CREATE TABLE chat_members (
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id),
                joined_at   TEXT NOT NULL DEFAULT ({now}),
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id),
                ciphertext  TEXT NOT NULL,
                nonce       TEXT NOT NULL DEFAULT '',
                reply_to    TEXT,
                created_at  TEXT NOT NULL DEFAULT ({now}),
                edited_at   TEXT
            );

            CREATE INDEX idx_messages_chat
                ON messages(chat_id, created_at);

            CREATE TABLE attachments (
                id            TEXT PRIMARY KEY,
                message_id    TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                file_path     TEXT NOT NULL,
                content_type  TEXT NOT NULL DEFAULT 'application/octet-stream',
                size_bytes    INTEGER NOT NULL,
                created_at    TEXT NOT NULL DEFAULT ({now})
            );

            CREATE INDEX idx_attachments_message
                ON attachments(message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
            now = SQL_NOW
        ))?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn invite_budget_is_enforced_by_schema() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute(
            "INSERT INTO invites (id, code, max_uses, uses) VALUES ('i1', 'C', 1, 1)",
            [],
        )
        .unwrap();

        let overrun = conn.execute("UPDATE invites SET uses = uses + 1 WHERE id = 'i1'", []);
        assert!(overrun.is_err());
    }
}
