use std::sync::LazyLock;

use thiserror::Error;
use tokio::sync::OnceCell;

use crate::constants::DEFAULT_SERVER_PORT;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = ENV_VARS.get_or_try_init(|| async { Env::new() }).await?;
    Ok(match var {
        Var::DatabaseUrl => &vars.database_url,
        Var::ServerPort => &vars.server_port,
        Var::StoreBackend => &vars.store_backend,
    })
}

/// Process configuration, read once from the environment (with `.env`
/// support via dotenvy) and cached for the life of the process.
#[derive(Debug, Clone)]
pub struct Env {
    pub database_url: String,
    pub server_port: String,
    pub store_backend: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        dotenvy::dotenv().ok();

        // Only required when the postgres backend is selected; main
        // surfaces the missing value in that case.
        let database_url = match dotenvy::var("DATABASE_URL") {
            Ok(url) => url,
            Err(dotenvy::Error::EnvVar(std::env::VarError::NotPresent)) => String::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            database_url,
            server_port: dotenvy::var("SERVER_PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string()),
            store_backend: dotenvy::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".into()),
        })
    }
}

#[derive(Debug)]
pub enum Var {
    DatabaseUrl,
    ServerPort,
    StoreBackend,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("missing required variable '{0}'")]
    MissingValue(String),
}
