mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::AppStateInner;
use parley_auth::bootstrap::{self, AdminSeed};
use parley_auth::{AuthService, SecretHasher, TokenIssuer};
use parley_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let hasher = SecretHasher::default();

    // Argon2 at production cost; keep it off the runtime threads.
    let seed_db = db.clone();
    let seed_hasher = hasher.clone();
    let (admin_password, admin_pin) = (config.admin_password.clone(), config.admin_pin.clone());
    tokio::task::spawn_blocking(move || {
        bootstrap::seed_defaults(
            &seed_db,
            &seed_hasher,
            &AdminSeed {
                password: &admin_password,
                pin: &admin_pin,
            },
        )
    })
    .await??;

    tokio::fs::create_dir_all(&config.data_dir).await?;

    let auth = AuthService::new(db.clone(), hasher, TokenIssuer::new(config.jwt_secret.as_bytes()));
    let warm = auth.clone();
    tokio::task::spawn_blocking(move || warm.warm_up()).await??;
    let state = Arc::new(AppStateInner::new(db, auth, config.data_dir.clone()));

    let app = parley_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Parley server listening on {}", config.addr);
    info!("Data directory: {}", config.data_dir.display());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
