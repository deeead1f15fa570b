use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use parley_db::Database;

use crate::error::{AuthError, Result};

/// Membership, ownership and admin checks. Every call reads current state;
/// nothing is cached between requests.
#[derive(Clone)]
pub struct AccessGuard {
    db: Arc<Database>,
}

impl AccessGuard {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn is_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self.db.is_member(&chat_id.to_string(), &user_id.to_string())?)
    }

    /// False for messages that do not exist.
    pub fn is_owner(&self, message_id: Uuid, user_id: Uuid) -> Result<bool> {
        let sender = self.db.get_message_sender(&message_id.to_string())?;
        Ok(sender.is_some_and(|s| s == user_id.to_string()))
    }

    pub fn is_admin(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.db.is_admin(&user_id.to_string())?)
    }

    /// Membership in the chat the attachment's message was posted to.
    /// Unknown attachments are denied.
    pub fn authorize_attachment(&self, attachment_id: Uuid, user_id: Uuid) -> Result<bool> {
        match self.db.get_attachment(&attachment_id.to_string())? {
            Some((_, chat_id)) => Ok(self.db.is_member(&chat_id, &user_id.to_string())?),
            None => Ok(false),
        }
    }

    pub fn require_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        deny_unless(self.is_member(chat_id, user_id)?, "chat membership", user_id)
    }

    pub fn require_owner(&self, message_id: Uuid, user_id: Uuid) -> Result<()> {
        deny_unless(self.is_owner(message_id, user_id)?, "message ownership", user_id)
    }

    pub fn require_admin(&self, user_id: Uuid) -> Result<()> {
        deny_unless(self.is_admin(user_id)?, "admin", user_id)
    }

    pub fn require_attachment(&self, attachment_id: Uuid, user_id: Uuid) -> Result<()> {
        deny_unless(
            self.authorize_attachment(attachment_id, user_id)?,
            "attachment access",
            user_id,
        )
    }
}

fn deny_unless(allowed: bool, check: &str, user_id: Uuid) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        warn!(user_id = %user_id, "{} check denied", check);
        Err(AuthError::PermissionDenied)
    }
}
