//! Parley credential core.
//!
//! Establishes who a caller is (invite-gated registration, password + PIN
//! login, signed session tokens) and whether they may touch a chat, message
//! or attachment (membership, ownership, admin flag). All durable state is
//! read from and written to [`parley_db::Database`]; this crate keeps none
//! of its own.

pub mod bootstrap;
pub mod error;
pub mod guard;
pub mod invites;
pub mod password;
pub mod service;
pub mod token;

pub use error::{AuthError, Result};
pub use guard::AccessGuard;
pub use invites::InviteLedger;
pub use password::{HashParams, SecretHasher};
pub use service::AuthService;
pub use token::{Identity, SESSION_TTL, TokenIssuer};
