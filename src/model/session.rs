use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::debug;
use rusqlite::Result as SqlResult;
use tokio::sync::Mutex;

use super::{user, Database};
use crate::auth;

pub type Id = String;

/// The document kept in the sessions collection.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub user: Option<user::Id>,
}

impl SessionData {
    pub fn anonymous() -> SessionData {
        SessionData {
            is_logged_in: false,
            user: None,
        }
    }

    pub fn logged_in(user: user::Id) -> SessionData {
        SessionData {
            is_logged_in: true,
            user: Some(user),
        }
    }

    /// A record that claims to be logged in without a user counts as anonymous.
    pub fn auth(&self) -> SessionAuth {
        match (self.is_logged_in, self.user) {
            (true, Some(user)) => SessionAuth::Authenticated(user),
            _ => SessionAuth::Anonymous,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: Id,
    /// Unix seconds
    pub expires: i64,
    pub data: SessionData,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires <= now
    }
}

/// Authentication state of the request's session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionAuth {
    Authenticated(user::Id),
    /// No cookie, a cookie we didn't sign, or a session nobody logged into.
    Anonymous,
    /// A cookie we signed whose session has expired or was destroyed.
    Expired,
}

impl SessionAuth {
    pub fn user(&self) -> Option<user::Id> {
        match self {
            SessionAuth::Authenticated(user) => Some(*user),
            _ => None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.user().is_some()
    }
}

/// Result of [`SessionStore::get`].
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup {
    Found(Session),
    Expired,
    Missing,
}

/// Persists sessions in the `sessions` table, keyed by session id.
///
/// An expired record is deleted when it is read, and every expired record
/// is swept whenever a new session is issued.
#[derive(Clone)]
pub struct SessionStore {
    database: Arc<Mutex<Database>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(database: Arc<Mutex<Database>>, ttl: Duration) -> SessionStore {
        SessionStore { database, ttl }
    }

    pub async fn get(&self, id: &Id) -> SqlResult<Lookup> {
        let database = self.database.lock().await;
        let Some(session) = database.get_session(id)? else {
            return Ok(Lookup::Missing);
        };

        if session.is_expired(unix_now()) {
            debug!("Session {} expired at {}", session.id, session.expires);
            database.delete_session(id)?;
            return Ok(Lookup::Expired);
        }

        Ok(Lookup::Found(session))
    }

    pub async fn put(&self, session: &Session) -> SqlResult<()> {
        self.database.lock().await.put_session(session)
    }

    pub async fn destroy(&self, id: &Id) -> SqlResult<()> {
        self.database.lock().await.delete_session(id)
    }

    /// Create and save a fresh anonymous session.
    pub async fn issue(&self) -> SqlResult<Session> {
        self.issue_with(SessionData::anonymous()).await
    }

    pub async fn issue_with(&self, data: SessionData) -> SqlResult<Session> {
        let session = Session {
            id: auth::token::generate_session_id(),
            expires: unix_now().saturating_add(self.ttl.as_secs() as i64),
            data,
        };
        debug!("Issuing session {}", session.id);
        self.sweep().await?;
        self.put(&session).await?;
        Ok(session)
    }

    /// Drop every expired record, returning how many went.
    pub async fn sweep(&self) -> SqlResult<usize> {
        self.database
            .lock()
            .await
            .delete_expired_sessions(unix_now())
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|now| now.as_secs() as i64)
        .unwrap_or_default()
}
