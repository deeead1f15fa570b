use crate::invites::consume_in;
use crate::models::{AttachmentRow, ConsumeOutcome, MessageRow, NewUser, RegistrationOutcome, UserRow};
use crate::{Database, is_unique_violation, parse_sql_time, sql_time};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, TransactionBehavior};

const USER_COLUMNS: &str = "id, username, display_name, password_hash, pin_hash, public_key, \
     avatar_path, is_admin, created_at, updated_at, last_active_at";

impl Database {
    // -- Users --

    /// Insert the user and consume one use of `invite_code` as a single unit.
    ///
    /// The username insert runs first so a duplicate never touches the
    /// invite. The consume is the guarded conditional update, so a
    /// registration racing past a stale read still cannot overrun the budget.
    pub fn create_user_with_invite(
        &self,
        user: &NewUser,
        invite_code: &str,
        now: DateTime<Utc>,
    ) -> Result<RegistrationOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Err(e) = insert_user(&tx, user) {
                if is_unique_violation(&e) {
                    return Ok(RegistrationOutcome::UsernameTaken);
                }
                return Err(e.into());
            }

            let outcome = match consume_in(&tx, invite_code, now)? {
                ConsumeOutcome::Consumed { invite_id } => {
                    tx.commit()?;
                    RegistrationOutcome::Created { invite_id }
                }
                // Dropping the transaction rolls the user insert back.
                ConsumeOutcome::NotFound => RegistrationOutcome::InviteNotFound,
                ConsumeOutcome::NotUsable => RegistrationOutcome::InviteNotUsable,
            };
            Ok(outcome)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
            conn.query_row(&sql, [username], map_user).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            conn.query_row(&sql, [id], map_user).optional()
        })
    }

    /// Unknown users are not admins.
    pub fn is_admin(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let flag: Option<bool> = conn
                .query_row("SELECT is_admin FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(flag.unwrap_or(false))
        })
    }

    pub fn admin_exists(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM users WHERE is_admin = 1", [], |r| r.get(0))?;
            Ok(count > 0)
        })
    }

    /// Replace both secrets at once. Returns false if the user does not exist.
    pub fn update_secrets(
        &self,
        id: &str,
        password_hash: &str,
        pin_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?1, pin_hash = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![password_hash, pin_hash, sql_time(now), id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn set_avatar_path(&self, id: &str, path: &str, now: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET avatar_path = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![path, sql_time(now), id],
            )?;
            Ok(())
        })
    }

    pub fn touch_last_active(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_active_at = ?1 WHERE id = ?2",
                rusqlite::params![sql_time(now), id],
            )?;
            Ok(())
        })
    }

    // -- Chats --

    /// Create a chat with its creator and any listed members that exist.
    /// Unknown member ids are skipped.
    pub fn create_chat(
        &self,
        id: &str,
        title: &str,
        is_group: bool,
        created_by: &str,
        member_ids: &[String],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chats (id, title, is_group, created_by) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, title, is_group, created_by],
            )?;

            {
                let mut add = tx.prepare(
                    "INSERT OR IGNORE INTO chat_members (chat_id, user_id)
                     SELECT ?1, id FROM users WHERE id = ?2",
                )?;
                add.execute([id, created_by])?;
                for member in member_ids {
                    add.execute([id, member.as_str()])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn is_member(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
                [chat_id, user_id],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Delete every message in the chat. Returns the stored file paths of
    /// the attachments that went with them so the caller can unlink them.
    pub fn clear_chat(&self, chat_id: &str) -> Result<Vec<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let paths = {
                let mut stmt = tx.prepare(
                    "SELECT a.file_path FROM attachments a
                     JOIN messages m ON a.message_id = m.id
                     WHERE m.chat_id = ?1",
                )?;
                stmt.query_map([chat_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?
            };
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?;
            tx.commit()?;
            Ok(paths)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        ciphertext: &str,
        nonce: &str,
        reply_to: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, ciphertext, nonce, reply_to)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, chat_id, sender_id, ciphertext, nonce, reply_to],
            )?;
            Ok(())
        })
    }

    pub fn get_message_sender(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT sender_id FROM messages WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn get_message_chat(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT chat_id FROM messages WHERE id = ?1", [id], |row| row.get(0))
                .optional()
        })
    }

    pub fn update_message(
        &self,
        id: &str,
        ciphertext: &str,
        nonce: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET ciphertext = ?1, nonce = ?2, edited_at = ?3 WHERE id = ?4",
                rusqlite::params![ciphertext, nonce, sql_time(now), id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Delete a message and its attachment rows. Returns the attachment
    /// file paths.
    pub fn delete_message(&self, id: &str) -> Result<Vec<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let paths = {
                let mut stmt = tx.prepare("SELECT file_path FROM attachments WHERE message_id = ?1")?;
                stmt.query_map([id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?
            };
            tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(paths)
        })
    }

    /// Newest first. `before` is an exclusive cursor on `created_at`.
    pub fn get_messages(
        &self,
        chat_id: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, chat_id, limit, before))
    }

    // -- Attachments --

    pub fn insert_attachment(&self, row: &AttachmentRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO attachments (id, message_id, file_path, content_type, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.id,
                    row.message_id,
                    row.file_path,
                    row.content_type,
                    row.size_bytes
                ],
            )?;
            Ok(())
        })
    }

    /// Look up an attachment together with the chat its message belongs to.
    pub fn get_attachment(&self, id: &str) -> Result<Option<(AttachmentRow, String)>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT a.id, a.message_id, a.file_path, a.content_type, a.size_bytes, m.chat_id
                 FROM attachments a JOIN messages m ON a.message_id = m.id
                 WHERE a.id = ?1",
                [id],
                |row| Ok((map_attachment(row)?, row.get(5)?)),
            )
            .optional()
        })
    }

    /// Batch-fetch attachments for a set of message IDs.
    pub fn get_attachments_for_messages(&self, message_ids: &[String]) -> Result<Vec<AttachmentRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, file_path, content_type, size_bytes
                 FROM attachments WHERE message_id IN ({})
                 ORDER BY created_at, rowid",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_attachment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn insert_user(conn: &Connection, user: &NewUser) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO users (id, username, display_name, password_hash, pin_hash, public_key, is_admin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            user.id,
            user.username,
            user.display_name,
            user.password_hash,
            user.pin_hash,
            user.public_key,
            user.is_admin
        ],
    )
}

fn query_messages(
    conn: &Connection,
    chat_id: &str,
    limit: u32,
    before: Option<DateTime<Utc>>,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, sender_id, ciphertext, nonce, reply_to, created_at, edited_at
         FROM messages
         WHERE chat_id = ?1 AND (?2 IS NULL OR created_at < ?2)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?3",
    )?;

    let rows = stmt
        .query_map(
            rusqlite::params![chat_id, before.map(sql_time), limit],
            |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    ciphertext: row.get(3)?,
                    nonce: row.get(4)?,
                    reply_to: row.get(5)?,
                    created_at: time_at(row, 6)?,
                    edited_at: opt_time_at(row, 7)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        pin_hash: row.get(4)?,
        public_key: row.get(5)?,
        avatar_path: row.get(6)?,
        is_admin: row.get(7)?,
        created_at: time_at(row, 8)?,
        updated_at: time_at(row, 9)?,
        last_active_at: opt_time_at(row, 10)?,
    })
}

fn map_attachment(row: &Row<'_>) -> rusqlite::Result<AttachmentRow> {
    Ok(AttachmentRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        file_path: row.get(2)?,
        content_type: row.get(3)?,
        size_bytes: row.get(4)?,
    })
}

pub(crate) fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_sql_time(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn opt_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_sql_time(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
