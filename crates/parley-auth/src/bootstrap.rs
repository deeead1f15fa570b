use tracing::{info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::{NewInvite, NewUser, SeedOutcome};

use crate::error::Result;
use crate::password::SecretHasher;

pub const DEFAULT_INVITE_CODE: &str = "DEFAULT-INVITE-0001";
pub const DEFAULT_INVITE_USES: u32 = 1000;
pub const ADMIN_USERNAME: &str = "admin";

/// Credentials for the administrator seeded on an empty database.
pub struct AdminSeed<'a> {
    pub password: &'a str,
    pub pin: &'a str,
}

/// Seed the first administrator and the default invite if the database has
/// neither. Safe to run on every startup.
pub fn seed_defaults(db: &Database, hasher: &SecretHasher, admin: &AdminSeed<'_>) -> Result<SeedOutcome> {
    // Hashing is only worth doing when an admin might be inserted.
    let new_admin = if db.admin_exists()? {
        None
    } else {
        Some(NewUser {
            id: Uuid::new_v4().to_string(),
            username: ADMIN_USERNAME.to_string(),
            display_name: "Administrator".to_string(),
            password_hash: hasher.hash(admin.password)?,
            pin_hash: hasher.hash(admin.pin)?,
            public_key: None,
            is_admin: true,
        })
    };

    let invite = NewInvite {
        id: Uuid::new_v4().to_string(),
        code: DEFAULT_INVITE_CODE.to_string(),
        created_by: None,
        max_uses: DEFAULT_INVITE_USES,
        expires_at: None,
    };

    let outcome = db.seed_defaults(new_admin.as_ref(), &invite)?;
    if outcome.admin_created {
        info!("Seeded administrator account '{}'", ADMIN_USERNAME);
        if admin.password == "admin" || admin.pin == "0000" {
            warn!("Administrator uses default credentials; change them with PUT /users/me/password");
        }
    } else if new_admin.is_some() {
        warn!("Administrator not seeded: username '{}' is already taken", ADMIN_USERNAME);
    }
    if outcome.invite_created {
        info!(
            "Seeded invite {} ({} uses)",
            DEFAULT_INVITE_CODE, DEFAULT_INVITE_USES
        );
    }
    Ok(outcome)
}
