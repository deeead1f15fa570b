use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, TransactionBehavior};

use crate::models::{ConsumeOutcome, InsertOutcome, InviteRow, NewInvite, NewUser, SeedOutcome};
use crate::queries::{OptionalExt, opt_time_at, time_at};
use crate::{Database, is_unique_violation, sql_time};

const INVITE_COLUMNS: &str =
    "id, code, created_by, max_uses, uses, active, expires_at, created_at";

impl Database {
    /// Atomically consume one use of the invite identified by `code`.
    pub fn consume_invite(&self, code: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome> {
        self.with_conn_mut(|conn| consume_in(conn, code, now))
    }

    pub fn get_invite_by_code(&self, code: &str) -> Result<Option<InviteRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {INVITE_COLUMNS} FROM invites WHERE code = ?1");
            conn.query_row(&sql, [code], map_invite).optional()
        })
    }

    pub fn insert_invite(&self, invite: &NewInvite) -> Result<InsertOutcome> {
        self.with_conn_mut(|conn| match insert_invite_row(conn, invite) {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e.into()),
        })
    }

    /// All invites, newest first.
    pub fn list_invites(&self) -> Result<Vec<InviteRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {INVITE_COLUMNS} FROM invites ORDER BY created_at DESC, rowid DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_invite)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Seed the bootstrap admin and invite when their tables have none.
    ///
    /// Each insert carries its own `NOT EXISTS` guard and both run in one
    /// immediate transaction, so concurrent startups seed at most once.
    pub fn seed_defaults(&self, admin: Option<&NewUser>, invite: &NewInvite) -> Result<SeedOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut outcome = SeedOutcome::default();

            if let Some(admin) = admin {
                outcome.admin_created = tx.execute(
                    "INSERT OR IGNORE INTO users
                        (id, username, display_name, password_hash, pin_hash, public_key, is_admin)
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6, 1
                     WHERE NOT EXISTS (SELECT 1 FROM users WHERE is_admin = 1)",
                    rusqlite::params![
                        admin.id,
                        admin.username,
                        admin.display_name,
                        admin.password_hash,
                        admin.pin_hash,
                        admin.public_key
                    ],
                )? == 1;
            }

            outcome.invite_created = tx.execute(
                "INSERT OR IGNORE INTO invites (id, code, created_by, max_uses, uses, active, expires_at)
                 SELECT ?1, ?2, ?3, ?4, 0, 1, ?5
                 WHERE NOT EXISTS (SELECT 1 FROM invites)",
                rusqlite::params![
                    invite.id,
                    invite.code,
                    invite.created_by,
                    invite.max_uses,
                    invite.expires_at.map(sql_time)
                ],
            )? == 1;

            tx.commit()?;
            Ok(outcome)
        })
    }
}

/// Check-and-increment as one statement. The `WHERE` clause is the
/// usability predicate, so the row only changes if it is usable at `now`.
/// A miss is classified afterwards for the caller's benefit only.
pub(crate) fn consume_in(conn: &Connection, code: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome> {
    let consumed: Option<String> = conn
        .query_row(
            "UPDATE invites SET uses = uses + 1
             WHERE code = ?1
               AND active = 1
               AND uses < max_uses
               AND (expires_at IS NULL OR expires_at > ?2)
             RETURNING id",
            rusqlite::params![code, sql_time(now)],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(invite_id) = consumed {
        return Ok(ConsumeOutcome::Consumed { invite_id });
    }

    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM invites WHERE code = ?1",
        [code],
        |r| r.get(0),
    )?;
    Ok(if exists > 0 {
        ConsumeOutcome::NotUsable
    } else {
        ConsumeOutcome::NotFound
    })
}

fn insert_invite_row(conn: &Connection, invite: &NewInvite) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO invites (id, code, created_by, max_uses, uses, active, expires_at)
         VALUES (?1, ?2, ?3, ?4, 0, 1, ?5)",
        rusqlite::params![
            invite.id,
            invite.code,
            invite.created_by,
            invite.max_uses,
            invite.expires_at.map(sql_time)
        ],
    )
}

fn map_invite(row: &Row<'_>) -> rusqlite::Result<InviteRow> {
    Ok(InviteRow {
        id: row.get(0)?,
        code: row.get(1)?,
        created_by: row.get(2)?,
        max_uses: row.get(3)?,
        uses: row.get(4)?,
        active: row.get(5)?,
        expires_at: opt_time_at(row, 6)?,
        created_at: time_at(row, 7)?,
    })
}
