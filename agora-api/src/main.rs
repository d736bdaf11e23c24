use crate::server::ServerState;
use agora_common::snowflake::{ProcessId, WorkerId};
use agora_db::{
    client::DbClient,
    memory::MemoryStore,
    store::{DbError, Store},
};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up the database: {0}")]
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
    /// Without one, everything is kept in memory and lost on shutdown.
    database_url: Option<String>,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agora_api=debug,agora_db=debug,agora_common=debug,\
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

async fn open_store(env: &Env) -> Result<Arc<dyn Store>, InitError> {
    let Some(database_url) = &env.database_url else {
        warn!("DATABASE_URL is not set, keeping all data in memory");
        return Ok(Arc::new(MemoryStore::new(env.worker_id, env.process_id)));
    };

    let client = DbClient::connect(database_url, env.worker_id, env.process_id).await?;
    client.migrate().await?;
    info!("Database migrations applied");

    Ok(Arc::new(client))
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received ctrl-c, shutting down"),
            Err(err) => warn!(error = %err, "Could not listen for ctrl-c, shutting down"),
        }
        trigger.cancel();
    });

    token
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let store = open_store(&env).await?;

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes()
        .layer(tracing_layer)
        .with_state(ServerState { store });

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
