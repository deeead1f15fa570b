use thiserror::Error;

/// Every rejection the credential core can produce.
///
/// All variants except [`AuthError::Infrastructure`] are expected outcomes
/// of bad input or insufficient rights and are reported to the caller.
/// `Infrastructure` covers storage failures, entropy failures and lost
/// worker tasks; the operation is aborted and nothing about it should be
/// shown to a client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed secret hash")]
    Format,

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Unknown user, wrong password and wrong PIN all collapse here.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("malformed token")]
    MalformedToken,

    #[error("invite not found")]
    InviteNotFound,

    #[error("invite not usable")]
    InviteNotUsable,

    #[error("invite code already exists")]
    DuplicateCode,

    #[error("username already taken")]
    UsernameTaken,

    #[error("permission denied")]
    PermissionDenied,

    #[error("infrastructure failure: {0}")]
    Infrastructure(#[from] anyhow::Error),
}

impl AuthError {
    /// True for failures that are not the caller's fault.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }

    /// True for every token verification failure.
    pub fn is_token_rejection(&self) -> bool {
        matches!(self, Self::InvalidSignature | Self::Expired | Self::MalformedToken)
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
