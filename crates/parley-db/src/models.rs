//! Database row types. These map directly to SQLite rows.
//! Distinct from parley-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub pin_hash: String,
    pub public_key: Option<String>,
    pub avatar_path: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
}

/// Everything needed to insert a user. Secrets arrive already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub pin_hash: String,
    pub public_key: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct InviteRow {
    pub id: String,
    pub code: String,
    pub created_by: Option<String>,
    pub max_uses: u32,
    pub uses: u32,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvite {
    pub id: String,
    pub code: String,
    pub created_by: Option<String>,
    pub max_uses: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub ciphertext: String,
    pub nonce: String,
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

pub struct AttachmentRow {
    pub id: String,
    pub message_id: String,
    pub file_path: String,
    pub content_type: String,
    pub size_bytes: i64,
}

/// Result of the atomic check-and-increment on an invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed { invite_id: String },
    NotFound,
    NotUsable,
}

/// Result of inserting a user and consuming an invite in one transaction.
/// Anything but `Created` leaves both tables untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created { invite_id: String },
    UsernameTaken,
    InviteNotFound,
    InviteNotUsable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    pub admin_created: bool,
    pub invite_created: bool,
}
