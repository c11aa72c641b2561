use std::{future::Future, net::SocketAddr, path::PathBuf, process::ExitCode, sync::Arc};

use axum::Router;
use clap::Parser;
use log::{error, info};
use thiserror::Error;

use config::{Config, ConfigError};
use model::{AppState, Database};

mod auth;
mod config;
mod error;
mod logger;
mod model;
mod pipeline;
mod routes;
mod templates;
mod upload;

#[cfg(test)]
mod testing;

/// Anything that stops the server from coming up.
#[derive(Debug, Error)]
enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create upload directory {0}: {1}")]
    UploadDir(PathBuf, std::io::Error),

    #[error("failed to load templates: {0}")]
    Templates(#[from] tera::Error),

    #[error("failed to open database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, hyper::Error),

    #[error("server error: {0}")]
    Serve(hyper::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let config = Config::parse();

    if let Err(err) = logger::init(config.log_level()) {
        eprintln!("Failed to set up logging: {}", err);
        return ExitCode::FAILURE;
    }

    match run(config, serve).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

/// Validate the config, then bring up everything the app needs. `listen` is
/// only called once the database is open.
async fn run<F, Fut>(config: Config, listen: F) -> Result<(), StartupError>
where
    F: FnOnce(SocketAddr, Router) -> Fut,
    Fut: Future<Output = Result<(), StartupError>>,
{
    let settings = config.validate()?;

    tokio::fs::create_dir_all(&settings.upload_dir)
        .await
        .map_err(|err| StartupError::UploadDir(settings.upload_dir.clone(), err))?;

    let templates = templates::load(&settings.templates)?;

    let database = Database::open(&settings.db_path)?;
    info!("Connected to database {}", settings.db_path);

    let addr = settings.addr;
    let state = Arc::new(AppState::new(database, templates, settings)?);

    listen(addr, routes::app(state)).await
}

async fn serve(addr: SocketAddr, app: Router) -> Result<(), StartupError> {
    let server = axum::Server::try_bind(&addr).map_err(|err| StartupError::Bind(addr, err))?;

    info!("Server running on address http://{}", addr);
    server
        .serve(app.into_make_service())
        .await
        .map_err(StartupError::Serve)
}
