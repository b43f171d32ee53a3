use std::time::Duration;

use axum::Router;
use keyturn::core::auth::{TokenCodec, TokenIssuer, auth_api_router};
use keyturn::core::chat::{ChatBridge, chat_bridge_router};
use keyturn::core::config::Config;
use keyturn::core::db::{
    AccountRepository, AccountStore, MemoryAccountStore, MemoryRefreshTokenStore,
    RefreshTokenRepository, RefreshTokenStore, create_pool_with_migrations, health_check,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load application config from environment variables
    let config = Config::from_env()?;

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: database={}, jwt_secret={}, default_role={}",
        config.has_database(),
        config.has_jwt_secret(),
        config.default_role
    );

    if !config.has_jwt_secret() {
        tracing::warn!("JWT_SECRET not set, issued tokens will not survive a restart");
    }

    let codec = TokenCodec::new(&config.signing_secret());

    let hasher = config.password_hasher();
    hasher.warm_up().await?;
    tracing::info!("Password hasher ready (bcrypt cost {})", hasher.cost());

    let app = match &config.db {
        Some(db_config) => {
            let pool = create_pool_with_migrations(db_config).await?;
            health_check(&pool).await?;
            tracing::info!("Database connection verified");

            let issuer = TokenIssuer::new(
                AccountRepository::with_hasher(pool.clone(), hasher),
                RefreshTokenRepository::new(pool),
                codec,
            );
            build_router(issuer, &config)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let issuer = TokenIssuer::new(
                MemoryAccountStore::new(hasher),
                MemoryRefreshTokenStore::new(),
                codec,
            );
            build_router(issuer, &config)
        }
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_router<A, R>(issuer: TokenIssuer<A, R>, config: &Config) -> Router
where
    A: AccountStore,
    R: RefreshTokenStore,
{
    let issuer = issuer
        .with_ttl(config.token_ttl())
        .with_default_role(config.default_role);
    let bridge = ChatBridge::new(issuer.accounts().clone(), issuer.codec().clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(auth_api_router(issuer))
        .merge(chat_bridge_router(bridge))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
