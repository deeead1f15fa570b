use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;
use uuid::Uuid;

use parley_types::api::Claims;

use crate::error::{AuthError, Result};

/// Lifetime of tokens minted at registration and login.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Who a verified token says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Mints and checks HS256 session tokens. Stateless: nothing is recorded
/// at issue time, so a token stays valid until `exp`.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, user_id: Uuid, username: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("token signing failed: {e}"))?;
        debug!(user_id = %user_id, exp = claims.exp, "token issued");
        Ok(token)
    }

    /// Signature is checked before expiry; a token is expired once
    /// `now >= exp`, with no leeway.
    pub fn verify(&self, token: &str) -> Result<Identity> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::MalformedToken,
        })?;

        if Utc::now().timestamp() >= data.claims.exp {
            return Err(AuthError::Expired);
        }

        debug!(user_id = %data.claims.sub, "token verified");
        Ok(Identity {
            user_id: data.claims.sub,
            username: data.claims.username,
        })
    }
}
