use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An invite as seen by administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: Uuid,
    pub code: String,
    pub created_by: Option<Uuid>,
    pub max_uses: u32,
    pub uses: u32,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    /// An invite is usable while it is active, has budget left and has not
    /// reached its expiry instant.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.uses < self.max_uses && self.expires_at.is_none_or(|exp| now < exp)
    }
}
