#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use parley_auth::bootstrap::{self, AdminSeed};
use parley_auth::{AuthService, HashParams, SecretHasher, TokenIssuer};
use parley_db::Database;
use parley_db::models::NewInvite;
use parley_types::api::RegisterRequest;

pub const ADMIN_PASSWORD: &str = "admin-pass";
pub const ADMIN_PIN: &str = "9999";

/// Argon2 costs low enough for a test suite.
pub fn light_hasher() -> SecretHasher {
    SecretHasher::new(HashParams {
        memory_kib: 1024,
        time_cost: 1,
        parallelism: 1,
        output_len: 32,
    })
}

pub struct Fixture {
    pub db: Arc<Database>,
    pub auth: AuthService,
    pub admin_id: Uuid,
}

pub fn fixture() -> Fixture {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let hasher = light_hasher();
    bootstrap::seed_defaults(
        &db,
        &hasher,
        &AdminSeed {
            password: ADMIN_PASSWORD,
            pin: ADMIN_PIN,
        },
    )
    .unwrap();

    let admin_id = db
        .get_user_by_username(bootstrap::ADMIN_USERNAME)
        .unwrap()
        .unwrap()
        .id
        .parse()
        .unwrap();
    let auth = AuthService::new(db.clone(), hasher, TokenIssuer::new(b"fixture-secret"));

    Fixture { db, auth, admin_id }
}

impl Fixture {
    pub fn add_invite(&self, code: &str, max_uses: u32, expires_at: Option<chrono::DateTime<chrono::Utc>>) {
        self.db
            .insert_invite(&NewInvite {
                id: Uuid::new_v4().to_string(),
                code: code.into(),
                created_by: None,
                max_uses,
                expires_at,
            })
            .unwrap();
    }

    pub fn uses(&self, code: &str) -> u32 {
        self.db.get_invite_by_code(code).unwrap().unwrap().uses
    }

    /// Register `username` with password `<username>-pw` and PIN `1234`.
    pub async fn register(&self, code: &str, username: &str) -> parley_auth::Result<Uuid> {
        self.auth
            .register(register_request(code, username))
            .await
            .map(|session| session.user_id)
    }
}

pub fn register_request(code: &str, username: &str) -> RegisterRequest {
    RegisterRequest {
        invite_code: code.into(),
        username: username.into(),
        display_name: username.to_uppercase(),
        password: format!("{username}-pw"),
        pin: "1234".into(),
        public_key: Some(format!("pk-{username}")),
    }
}
