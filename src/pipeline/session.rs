use std::sync::Arc;

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{header, request::Parts, Request, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use futures::{future::BoxFuture, FutureExt};
use log::{error, trace};

use super::{DeferredHeaders, Flow, Stage};
use crate::{
    error::AppError,
    model::{session::Lookup, user, AppState, Session, SessionAuth},
    routes::LOGIN_PATH,
};

/// The session attached to the current request.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub session: Session,
    /// Snapshot taken when the request came in.
    pub auth: SessionAuth,
}

/// Loads the session named by the request's cookie, issuing a new one when
/// the client has none that is still valid.
pub struct SessionStage {
    state: Arc<AppState>,
}

impl SessionStage {
    pub fn new(state: Arc<AppState>) -> SessionStage {
        SessionStage { state }
    }

    async fn load(&self, request: &mut Request<Body>) -> Result<SessionContext, AppError> {
        let (found, auth) = match self.state.cookies.session_id(request.headers()) {
            Some(id) => match self.state.sessions.get(&id).await? {
                Lookup::Found(session) => {
                    let auth = session.data.auth();
                    (Some(session), auth)
                }
                Lookup::Expired | Lookup::Missing => (None, SessionAuth::Expired),
            },
            None => (None, SessionAuth::Anonymous),
        };

        let session = match found {
            Some(session) => session,
            None => {
                let session = self.state.sessions.issue().await?;
                if let Some(cookie) = self.state.cookies.header(&session.id) {
                    request
                        .extensions_mut()
                        .insert(DeferredHeaders(vec![(header::SET_COOKIE, cookie)]));
                }
                session
            }
        };

        trace!("Request runs in session {} ({:?})", session.id, auth);
        Ok(SessionContext { session, auth })
    }
}

impl Stage for SessionStage {
    fn name(&self) -> &'static str {
        "session"
    }

    fn run(&self, mut request: Request<Body>) -> BoxFuture<'_, Flow> {
        async move {
            match self.load(&mut request).await {
                Ok(context) => {
                    request.extensions_mut().insert(context);
                    Flow::Continue(request)
                }
                Err(err) => Flow::Respond(err.into_response()),
            }
        }
        .boxed()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionContext {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<SessionContext>().cloned().ok_or_else(|| {
            error!("No session attached to {}", parts.uri.path());
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

/// The logged in user. Anyone else is sent to the login page.
#[derive(Clone, Copy, Debug)]
pub struct CurrentUser(pub user::Id);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = SessionContext::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        match context.auth {
            SessionAuth::Authenticated(user) => Ok(CurrentUser(user)),
            SessionAuth::Anonymous | SessionAuth::Expired => {
                Err(Redirect::to(LOGIN_PATH).into_response())
            }
        }
    }
}
