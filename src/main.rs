use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use account_api::{
    auth::{AuthService, MemoryUserStore, PgUserStore, TokenKeys, TokenService, UserStore},
    config::{Config, StoreBackend},
    create_router, db, AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Account API - Starting...");

    let keys = TokenKeys::from_base64(
        config.token_encryption_key.as_deref(),
        config.token_signing_key.as_deref(),
    )?;
    let tokens = Arc::new(TokenService::new(keys, config.signed_token_ttl_secs));

    let store: Arc<dyn UserStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set for the postgres store")?;

            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgUserStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; accounts are lost on restart");
            Arc::new(MemoryUserStore::new())
        }
    };

    let auth = Arc::new(AuthService::new(store, tokens, config.store_timeout));
    let app = create_router(AppState::new(auth));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Account API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
