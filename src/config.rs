//! Process configuration.
//!
//! Values come from command-line flags or environment variables (a `.env`
//! file is loaded first if present). [`Config`] is what clap parses;
//! [`Config::validate`] turns it into [`Settings`], which is built once at
//! startup and handed to every component through the app state.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use log::LevelFilter;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_TEMPLATES: &str = "templates/**/*";
pub const DEFAULT_SESSION_TTL: &str = "14days";

/// 10 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Homestay - a small server-rendered home listing site.
#[derive(Parser, Debug, Clone)]
#[command(name = "homestay")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Path of the SQLite database file (`:memory:` for a throwaway one).
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<String>,

    /// Secret used to sign session cookies.
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    /// Directory uploaded photos are written to.
    #[arg(long, default_value = DEFAULT_UPLOAD_DIR, env = "UPLOAD_DIR")]
    pub upload_dir: PathBuf,

    /// Directory of static assets served from `/`.
    #[arg(long, default_value = DEFAULT_PUBLIC_DIR, env = "PUBLIC_DIR")]
    pub public_dir: PathBuf,

    /// Glob of the tera templates.
    #[arg(long, default_value = DEFAULT_TEMPLATES, env = "TEMPLATES")]
    pub templates: String,

    /// How long a session lives after it is issued, e.g. `14days` or `2h`.
    #[arg(long, default_value = DEFAULT_SESSION_TTL, env = "SESSION_TTL", value_parser = humantime::parse_duration)]
    pub session_ttl: Duration,

    /// Largest request body accepted for file uploads, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DB_PATH is not set. Set --db-path or DB_PATH")]
    MissingDbPath,

    #[error("SESSION_SECRET is not set. Set --session-secret or SESSION_SECRET")]
    MissingSessionSecret,

    #[error("SESSION_SECRET can't be used as a signing key")]
    InvalidSessionSecret,

    #[error("max upload size must be greater than 0")]
    ZeroUploadLimit,

    #[error("invalid listen address {0}")]
    Address(String),
}

/// Validated configuration. Required values are no longer optional here.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: String,
    pub session_secret: String,
    pub addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub public_dir: PathBuf,
    pub templates: String,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    /// Check the required values and build the [`Settings`].
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let db_path = self
            .db_path
            .filter(|path| !path.trim().is_empty())
            .ok_or(ConfigError::MissingDbPath)?;
        let session_secret = self
            .session_secret
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::MissingSessionSecret)?;

        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }

        let addr = format!("{}:{}", self.host, self.port);
        let addr = addr.parse().map_err(|_| ConfigError::Address(addr))?;

        Ok(Settings {
            db_path,
            session_secret,
            addr,
            upload_dir: self.upload_dir,
            public_dir: self.public_dir,
            templates: self.templates,
            session_ttl: self.session_ttl,
            max_upload_bytes: self.max_upload_bytes,
        })
    }
}
