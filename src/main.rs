use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use oidc_portal::ProviderCache;
use oidc_portal::middleware::{AuthConfig, AuthState, auth_routes};
use oidc_portal::store::{PgSessionStore, PgUserStore};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PRUNE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AuthConfig::from_env()?;
    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL is required")?;
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:5000".into())
        .parse()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;
    tracing::info!("database pool connected");

    let sessions = PgSessionStore::new(pool.clone());
    spawn_session_pruning(sessions.clone());

    let provider = ProviderCache::new(config.oidc().clone());
    let state = AuthState::new(config, provider, PgUserStore::new(pool), sessions);

    let app = Router::new()
        .merge(auth_routes(state))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_session_pruning(sessions: PgSessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            match sessions.prune_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "expired sessions pruned"),
                Err(e) => tracing::warn!(error = %e, "session pruning failed"),
            }
        }
    });
}
