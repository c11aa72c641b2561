pub mod booking;
pub mod database;
pub mod home;
pub mod session;
pub mod user;

use std::sync::Arc;

use tera::Tera;
use tokio::sync::Mutex;

use crate::{
    auth::cookie::CookieSigner,
    config::{ConfigError, Settings},
};

pub use booking::Booking;
pub use database::Database;
pub use home::Home;
pub use session::{Session, SessionAuth, SessionStore};
pub use user::User;

/// Everything a handler or pipeline stage needs, built once in `main`.
pub struct AppState {
    pub database: Arc<Mutex<Database>>,
    pub sessions: SessionStore,
    pub cookies: CookieSigner,
    pub templates: Tera,
    pub settings: Settings,
}

impl AppState {
    pub fn new(
        database: Database,
        templates: Tera,
        settings: Settings,
    ) -> Result<AppState, ConfigError> {
        let database = Arc::new(Mutex::new(database));
        let sessions = SessionStore::new(database.clone(), settings.session_ttl);
        let cookies = CookieSigner::new(settings.session_secret.as_bytes())
            .map_err(|_| ConfigError::InvalidSessionSecret)?;

        Ok(AppState {
            database,
            sessions,
            cookies,
            templates,
            settings,
        })
    }
}
