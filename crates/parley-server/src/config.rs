use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// JWT secrets that MUST NOT be used outside a throwaway checkout.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub admin_password: String,
    pub admin_pin: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("PARLEY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLEY_JWT_SECRET is unset or still a placeholder; set it in your environment or .env file");
        }

        let host = var("PARLEY_HOST", "0.0.0.0");
        let port: u16 = var("PARLEY_PORT", "8081")
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        Ok(Self {
            addr,
            db_path: var("PARLEY_DB_PATH", "parley.db").into(),
            data_dir: var("PARLEY_DATA_DIR", "./data").into(),
            jwt_secret,
            admin_password: var("PARLEY_ADMIN_PASSWORD", "admin"),
            admin_pin: var("PARLEY_ADMIN_PIN", "0000"),
        })
    }
}
