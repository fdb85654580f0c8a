use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration as StdDuration,
};
use thiserror::Error;
use time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yatube_api::server::{
    self, ServerState,
    auth::SessionSettings,
    cache::{DEFAULT_TIMEOUT, MokaPageCache},
    media::MediaStorage,
};
use yatube_common::util::{NonPositiveDurationError, PositiveDuration};
use yatube_db::{DbClient, DbError, MemoryStore, Store};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid session lifetime: {0}")]
    SessionLifetime(#[from] NonPositiveDurationError),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn default_cache_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_session_lifetime_secs() -> i64 {
    Duration::days(14).whole_seconds()
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: Option<String>,
    #[serde(default = "default_cache_timeout_secs")]
    cache_timeout_secs: u64,
    #[serde(default = "default_media_root")]
    media_root: PathBuf,
    #[serde(default = "default_session_lifetime_secs")]
    session_lifetime_secs: i64,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "yatube_api=debug,\
                yatube_db=debug,\
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

async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn Store>, InitError> {
    match database_url {
        Some(database_url) => {
            let client = DbClient::connect(database_url).await?;
            client.migrate().await?;
            info!("Connected to PostgreSQL");
            Ok(Arc::new(client))
        }
        None => {
            warn!("DATABASE_URL is not set, data is kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn shutdown_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => warn!(error = %err, "Listening for shutdown signal failed"),
        }
        trigger.cancel();
    });

    token
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let state = ServerState {
        store: open_store(env.database_url.as_deref()).await?,
        page_cache: Arc::new(MokaPageCache::new(StdDuration::from_secs(
            env.cache_timeout_secs,
        ))),
        media: MediaStorage::new(env.media_root),
        sessions: SessionSettings {
            lifetime: PositiveDuration::try_from(Duration::seconds(env.session_lifetime_secs))?,
        },
    };

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes().layer(tracing_layer).with_state(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on_signal().cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
