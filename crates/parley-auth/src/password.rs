//! Password and PIN hashing.
//!
//! Secrets are stretched with Argon2id and stored as one self-describing
//! string:
//!
//! ```text
//! argon2id$v=19$m=65536,t=1,p=4$<salt-hex>$<key-hex>
//! ```
//!
//! Verification reads the parameters back out of the string, so stored
//! hashes stay valid if the defaults change later.

use anyhow::anyhow;
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::{OsRng, RngCore};

use crate::error::{AuthError, Result};

pub const ALGORITHM_ID: &str = "argon2id";
const VERSION: u32 = 19;
const SALT_LEN: usize = 16;

/// Argon2id cost parameters used when hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    /// Derived key length in bytes.
    pub output_len: usize,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            time_cost: 1,
            parallelism: 4,
            output_len: 32,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecretHasher {
    params: HashParams,
    /// Argon2 runs performed by `verify`, shared across clones.
    #[cfg(test)]
    pub(crate) verifications: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl SecretHasher {
    pub fn new(params: HashParams) -> Self {
        Self {
            params,
            #[cfg(test)]
            verifications: Default::default(),
        }
    }

    pub fn params(&self) -> HashParams {
        self.params
    }

    /// Hash `plaintext` under a fresh 16-byte salt.
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| anyhow!("secure random source failed: {e}"))?;

        let HashParams {
            memory_kib,
            time_cost,
            parallelism,
            output_len,
        } = self.params;
        let params = Params::new(memory_kib, time_cost, parallelism, Some(output_len))
            .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;
        let key = derive(plaintext.as_bytes(), &salt, params)
            .map_err(|e| anyhow!("argon2 derivation failed: {e}"))?;

        Ok(format!(
            "{ALGORITHM_ID}$v={VERSION}$m={memory_kib},t={time_cost},p={parallelism}${}${}",
            hex::encode(salt),
            hex::encode(key)
        ))
    }

    /// Check `plaintext` against an encoded hash produced by [`Self::hash`].
    ///
    /// The parameters embedded in `encoded` are used, not this hasher's.
    /// Returns `Ok(false)` on mismatch, including a stored key whose length
    /// Argon2 cannot produce.
    pub fn verify(&self, encoded: &str, plaintext: &str) -> Result<bool> {
        let fields: Vec<&str> = encoded.split('$').collect();
        let [alg, version, params, salt_hex, key_hex] = fields.as_slice() else {
            return Err(AuthError::Format);
        };

        if *alg != ALGORITHM_ID {
            return Err(AuthError::UnsupportedAlgorithm((*alg).to_string()));
        }
        let version: u32 = version
            .strip_prefix("v=")
            .and_then(|v| v.parse().ok())
            .ok_or(AuthError::Format)?;
        if version != VERSION {
            return Err(AuthError::UnsupportedAlgorithm(format!("{alg} v={version}")));
        }

        let (m, t, p) = parse_params(params).ok_or(AuthError::Format)?;
        let salt = hex::decode(salt_hex).map_err(|_| AuthError::Format)?;
        let expected = hex::decode(key_hex).map_err(|_| AuthError::Format)?;

        if !(Params::MIN_OUTPUT_LEN..=Params::MAX_OUTPUT_LEN).contains(&expected.len()) {
            return Ok(false);
        }

        let params = Params::new(m, t, p, Some(expected.len())).map_err(|_| AuthError::Format)?;
        #[cfg(test)]
        self.verifications.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let derived = derive(plaintext.as_bytes(), &salt, params).map_err(|_| AuthError::Format)?;

        Ok(constant_time_eq(&derived, &expected))
    }
}

fn derive(secret: &[u8], salt: &[u8], params: Params) -> std::result::Result<Vec<u8>, argon2::Error> {
    let mut out = vec![0u8; params.output_len().unwrap_or(Params::DEFAULT_OUTPUT_LEN)];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params).hash_password_into(secret, salt, &mut out)?;
    Ok(out)
}

/// Parses `m=<u32>,t=<u32>,p=<u32>` in exactly that order.
fn parse_params(raw: &str) -> Option<(u32, u32, u32)> {
    let mut parts = raw.split(',');
    let m = parts.next()?.strip_prefix("m=")?.parse().ok()?;
    let t = parts.next()?.strip_prefix("t=")?.parse().ok()?;
    let p = parts.next()?.strip_prefix("p=")?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((m, t, p))
}

/// Compares every byte regardless of where the first difference is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
