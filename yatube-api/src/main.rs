use crate::server::{ServerState, auth::AuthSettings, cache::IndexCache};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yatube_common::util::PositiveDuration;
use yatube_db::{
    client::{DbClient, DbError},
    media::MediaStorage,
};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("AUTH_TOKEN_LIFETIME_SECONDS must be positive, got {0}")]
    NonPositiveTokenLifetime(i64),
    #[error("Error connecting to database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    #[serde(default = "default_database_max_connections")]
    database_max_connections: u32,
    #[serde(default = "default_media_root")]
    media_root: PathBuf,
    #[serde(default = "default_index_cache_seconds")]
    index_cache_seconds: u64,
    #[serde(default)]
    auth_token_lifetime_seconds: Option<i64>,
}

fn default_database_url() -> String {
    "sqlite://yatube.db".to_owned()
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_index_cache_seconds() -> u64 {
    20
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "yatube_api=debug,yatube_db=debug,yatube_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
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

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(err) => error!(%err, "Could not listen for Ctrl-C, shutting down"),
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let token_lifetime = env
        .auth_token_lifetime_seconds
        .map(|seconds| {
            PositiveDuration::from_seconds(seconds)
                .ok_or(InitError::NonPositiveTokenLifetime(seconds))
        })
        .transpose()?;

    let db_client = DbClient::connect(&env.database_url, env.database_max_connections).await?;
    let state = ServerState {
        db_client: Arc::new(db_client),
        media: Arc::new(MediaStorage::new(env.media_root)),
        index_cache: IndexCache::new(Duration::from_secs(env.index_cache_seconds)),
        auth_settings: AuthSettings { token_lifetime },
    };
    let app = server::app(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
