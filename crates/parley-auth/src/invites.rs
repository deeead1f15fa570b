use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::info;
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::{ConsumeOutcome, InsertOutcome, InviteRow, NewInvite};
use parley_types::models::Invite;

use crate::error::{AuthError, Result};
use crate::guard::AccessGuard;

const GENERATED_CODE_LEN: usize = 16;

/// Invite codes: budgeted, optionally expiring capabilities that gate
/// registration.
#[derive(Clone)]
pub struct InviteLedger {
    db: Arc<Database>,
    guard: AccessGuard,
}

impl InviteLedger {
    pub fn new(db: Arc<Database>) -> Self {
        let guard = AccessGuard::new(db.clone());
        Self { db, guard }
    }

    /// Consume one use of `code` if it is usable right now.
    pub fn check_and_consume(&self, code: &str) -> Result<Uuid> {
        match self.db.consume_invite(code, Utc::now())? {
            ConsumeOutcome::Consumed { invite_id } => parse_id(&invite_id),
            ConsumeOutcome::NotFound => Err(AuthError::InviteNotFound),
            ConsumeOutcome::NotUsable => Err(AuthError::InviteNotUsable),
        }
    }

    /// Read-only usability check. Advisory: the consume step re-checks.
    pub fn check_usable(&self, code: &str) -> Result<()> {
        let row = self
            .db
            .get_invite_by_code(code)?
            .ok_or(AuthError::InviteNotFound)?;
        if to_invite(row)?.is_usable_at(Utc::now()) {
            Ok(())
        } else {
            Err(AuthError::InviteNotUsable)
        }
    }

    /// Create an invite on behalf of an administrator. A missing or blank
    /// code is replaced by a random one; a budget of zero becomes one.
    pub fn create(
        &self,
        created_by: Uuid,
        code: Option<&str>,
        max_uses: u32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        self.guard.require_admin(created_by)?;

        let code = match code.map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => generate_code(),
        };

        let invite = NewInvite {
            id: Uuid::new_v4().to_string(),
            code,
            created_by: Some(created_by.to_string()),
            max_uses: max_uses.max(1),
            expires_at,
        };

        match self.db.insert_invite(&invite)? {
            InsertOutcome::Inserted => {
                info!(created_by = %created_by, max_uses = invite.max_uses, "invite created");
                Ok(invite.code)
            }
            InsertOutcome::Duplicate => Err(AuthError::DuplicateCode),
        }
    }

    /// Every invite, newest first. Administrators only.
    pub fn list(&self, admin_id: Uuid) -> Result<Vec<Invite>> {
        self.guard.require_admin(admin_id)?;
        self.db.list_invites()?.into_iter().map(to_invite).collect()
    }
}

fn generate_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_CODE_LEN)
        .map(char::from)
        .collect()
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|e| AuthError::Infrastructure(anyhow!("corrupt id '{raw}': {e}")))
}

fn to_invite(row: InviteRow) -> Result<Invite> {
    Ok(Invite {
        id: parse_id(&row.id)?,
        created_by: row.created_by.as_deref().map(parse_id).transpose()?,
        code: row.code,
        max_uses: row.max_uses,
        uses: row.uses,
        active: row.active,
        expires_at: row.expires_at,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_alphanumeric_and_distinct() {
        let a = generate_code();
        let b = generate_code();
        assert_eq!(a.len(), GENERATED_CODE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
