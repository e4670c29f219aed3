use std::net::SocketAddr;

use thiserror::Error;
use tracing::{error, info};

use crate::db::prelude::{MemStore, PgStore, StoreError};
use crate::util::env::{EnvErr, Var};

mod api;
mod clock;
mod constants;
mod db;
mod ledger;
mod rotation;
mod util;

type MainResult<T> = core::result::Result<T, RunnerErr>;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid SERVER_PORT: {0}")]
    Port(#[from] std::num::ParseIntError),

    #[error(transparent)]
    Route(#[from] api::server::RouteError),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> MainResult<()> {
    util::telemetry::build_subscriber();
    info!("starting rostrum");

    let port: u16 = var!(Var::ServerPort).await?.parse()?;
    let (tx_ready, rx_ready) = tokio::sync::oneshot::channel::<SocketAddr>();

    let server_handle = match var!(Var::StoreBackend).await? {
        "memory" => {
            tracing::warn!("using the in-memory store; state will not survive a restart");
            tokio::task::spawn(api::server::serve(MemStore::new(), port, tx_ready))
        }

        _ => {
            let database_url = var!(Var::DatabaseUrl).await?;
            if database_url.is_empty() {
                return Err(EnvErr::MissingValue("DATABASE_URL".into()).into());
            }

            let store = PgStore::connect(database_url).await?;
            store.ensure_schema().await?;
            tokio::task::spawn(api::server::serve(store, port, tx_ready))
        }
    };

    match rx_ready.await {
        Ok(addr) => {
            info!(
                server_url = &format!("http://127.0.0.1:{}", addr.port()),
                "server ready"
            );
        }

        Err(_) => error!("server exited before reporting readiness"),
    }

    server_handle.await??;
    Ok(())
}
