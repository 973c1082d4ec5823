use crate::server::{AuthSettings, IndexCache, ServerState};
use blogwerk_common::{pagination::Paginator, util::PositiveDuration};
use blogwerk_db::{
    client::DbClient,
    memory::MemoryStore,
    store::{DbError, SharedStore},
};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroUsize,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("POSTS_PER_PAGE must be greater than zero")]
    ZeroPageSize,
    #[error("AUTH_TOKEN_LIFETIME_DAYS must be greater than zero")]
    ZeroTokenLifetime,
    #[error("AUTH_TOKEN_LIFETIME_DAYS is too large")]
    TokenLifetimeOverflow,
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_posts_per_page() -> usize {
    10
}

fn default_index_cache_ttl_seconds() -> u64 {
    20
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: Option<String>,
    #[serde(default = "default_database_max_connections")]
    database_max_connections: u32,
    #[serde(default = "default_posts_per_page")]
    posts_per_page: usize,
    #[serde(default = "default_index_cache_ttl_seconds")]
    index_cache_ttl_seconds: u64,
    auth_token_lifetime_days: Option<i64>,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "blogwerk_api=debug,\
                blogwerk_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn connect_store(env: &Env) -> Result<SharedStore, InitError> {
    let Some(database_url) = &env.database_url else {
        warn!("DATABASE_URL is not set, keeping all data in memory");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let client = DbClient::connect(database_url, env.database_max_connections).await?;
    client.migrate().await?;
    info!("Connected to database and applied migrations");

    Ok(Arc::new(client))
}

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

fn token_lifetime(days: i64) -> Result<PositiveDuration, InitError> {
    let seconds = days
        .checked_mul(SECONDS_PER_DAY)
        .ok_or(InitError::TokenLifetimeOverflow)?;

    PositiveDuration::new(time::Duration::seconds(seconds)).ok_or(InitError::ZeroTokenLifetime)
}

fn server_state(env: &Env, store: SharedStore) -> Result<ServerState, InitError> {
    let per_page = NonZeroUsize::new(env.posts_per_page).ok_or(InitError::ZeroPageSize)?;

    let token_lifetime = env
        .auth_token_lifetime_days
        .map(token_lifetime)
        .transpose()?;

    Ok(ServerState {
        store,
        paginator: Paginator::new(per_page),
        index_cache: IndexCache::new(Duration::from_secs(env.index_cache_ttl_seconds)),
        auth: AuthSettings { token_lifetime },
    })
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(err) => error!(%err, "Listening for Ctrl-C failed, shutting down"),
        }
        cancel.cancel();
    });

    token
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let store = connect_store(&env).await?;
    let state = server_state(&env, store)?;

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes().layer(tracing_layer).with_state(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    let shutdown = shutdown_on_ctrl_c();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{InitError, token_lifetime};

    #[test]
    fn token_lifetime_is_checked() {
        assert_eq!(token_lifetime(2).unwrap().whole_seconds(), 2 * 24 * 60 * 60);
        assert!(matches!(token_lifetime(0), Err(InitError::ZeroTokenLifetime)));
        assert!(matches!(token_lifetime(-3), Err(InitError::ZeroTokenLifetime)));
        assert!(matches!(
            token_lifetime(i64::MAX),
            Err(InitError::TokenLifetimeOverflow)
        ));
    }
}
