use std::sync::{Arc, OnceLock};

use anyhow::anyhow;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::{NewUser, RegistrationOutcome};
use parley_types::api::{ChangeSecretsRequest, LoginRequest, RegisterRequest, SessionResponse};

use crate::error::{AuthError, Result};
use crate::invites::InviteLedger;
use crate::password::SecretHasher;
use crate::token::{Identity, SESSION_TTL, TokenIssuer};

/// Registration, login and secret changes.
///
/// The async entry points move hashing and datastore work onto the
/// blocking pool so request threads are never stuck behind Argon2.
#[derive(Clone)]
pub struct AuthService {
    db: Arc<Database>,
    hasher: SecretHasher,
    tokens: TokenIssuer,
    invites: InviteLedger,
    /// Hash verified against when the username is unknown, so that path
    /// costs the same Argon2 work as a real account.
    decoy_hash: Arc<OnceLock<String>>,
}

impl AuthService {
    pub fn new(db: Arc<Database>, hasher: SecretHasher, tokens: TokenIssuer) -> Self {
        let invites = InviteLedger::new(db.clone());
        Self {
            db,
            hasher,
            tokens,
            invites,
            decoy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Compute the unknown-user decoy hash ahead of the first login. Blocks.
    pub fn warm_up(&self) -> Result<()> {
        self.decoy_hash().map(|_| ())
    }

    pub fn verify_token(&self, token: &str) -> Result<Identity> {
        self.tokens.verify(token)
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<SessionResponse> {
        let this = self.clone();
        run_blocking(move || this.register_blocking(req)).await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<SessionResponse> {
        let this = self.clone();
        run_blocking(move || this.login_blocking(req)).await
    }

    pub async fn change_secrets(&self, user_id: Uuid, req: ChangeSecretsRequest) -> Result<()> {
        let this = self.clone();
        run_blocking(move || this.change_secrets_blocking(user_id, req)).await
    }

    fn register_blocking(&self, req: RegisterRequest) -> Result<SessionResponse> {
        // Cheap rejections before paying for two Argon2 runs. The
        // transaction below is what actually decides.
        self.invites.check_usable(&req.invite_code)?;
        if self.db.get_user_by_username(&req.username)?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let user = NewUser {
            id: Uuid::new_v4().to_string(),
            username: req.username.clone(),
            display_name: req.display_name,
            password_hash: self.hasher.hash(&req.password)?,
            pin_hash: self.hasher.hash(&req.pin)?,
            public_key: req.public_key,
            is_admin: false,
        };

        match self.db.create_user_with_invite(&user, &req.invite_code, Utc::now())? {
            RegistrationOutcome::Created { invite_id } => {
                info!(username = %user.username, invite_id = %invite_id, "user registered");
            }
            RegistrationOutcome::UsernameTaken => return Err(AuthError::UsernameTaken),
            RegistrationOutcome::InviteNotFound => return Err(AuthError::InviteNotFound),
            RegistrationOutcome::InviteNotUsable => return Err(AuthError::InviteNotUsable),
        }

        let user_id: Uuid = user
            .id
            .parse()
            .map_err(|e| anyhow!("generated user id did not parse: {e}"))?;
        let token = self.tokens.issue(user_id, &user.username, SESSION_TTL)?;
        Ok(SessionResponse { token, user_id })
    }

    fn login_blocking(&self, req: LoginRequest) -> Result<SessionResponse> {
        let Some(user) = self.db.get_user_by_username(&req.username)? else {
            let decoy = self.decoy_hash()?;
            self.secret_matches(decoy, &req.password);
            self.secret_matches(decoy, &req.pin);
            warn!("login for unknown username rejected");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.both_match(&user.password_hash, &req.password, &user.pin_hash, &req.pin) {
            warn!(user_id = %user.id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let user_id: Uuid = user
            .id
            .parse()
            .map_err(|e| anyhow!("corrupt user id '{}': {e}", user.id))?;
        let token = self.tokens.issue(user_id, &user.username, SESSION_TTL)?;
        Ok(SessionResponse { token, user_id })
    }

    fn change_secrets_blocking(&self, user_id: Uuid, req: ChangeSecretsRequest) -> Result<()> {
        let user = self
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.both_match(&user.password_hash, &req.old_password, &user.pin_hash, &req.old_pin) {
            warn!(user_id = %user.id, "secret change rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.hasher.hash(&req.new_password)?;
        let pin_hash = self.hasher.hash(&req.new_pin)?;
        if !self
            .db
            .update_secrets(&user.id, &password_hash, &pin_hash, Utc::now())?
        {
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "secrets changed");
        Ok(())
    }

    /// Hashed on first use with this service's parameters.
    fn decoy_hash(&self) -> Result<&str> {
        if let Some(hash) = self.decoy_hash.get() {
            return Ok(hash);
        }
        let hash = self.hasher.hash("")?;
        Ok(self.decoy_hash.get_or_init(|| hash))
    }

    /// Checks the PIN even when the password is already wrong.
    fn both_match(&self, password_hash: &str, password: &str, pin_hash: &str, pin: &str) -> bool {
        let password_ok = self.secret_matches(password_hash, password);
        let pin_ok = self.secret_matches(pin_hash, pin);
        password_ok && pin_ok
    }

    /// An unreadable stored hash counts as a mismatch so the caller sees
    /// the same rejection as for a wrong secret.
    fn secret_matches(&self, encoded: &str, plaintext: &str) -> bool {
        match self.hasher.verify(encoded, plaintext) {
            Ok(matched) => matched,
            Err(e) => {
                error!("stored secret hash unusable: {}", e);
                false
            }
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        AuthError::Infrastructure(anyhow!("blocking task failed: {e}"))
    })?
}
