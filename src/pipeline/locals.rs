use std::{convert::Infallible, sync::Arc};

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request},
    response::IntoResponse,
};
use futures::{future::BoxFuture, FutureExt};
use log::warn;
use tera::Context;

use super::{Flow, SessionContext, Stage};
use crate::{
    error::AppError,
    model::{AppState, SessionAuth, User},
};

/// Values every rendered page gets.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct Locals {
    pub is_logged_in: bool,
    pub user: Option<User>,
}

impl Locals {
    /// A template context seeded with the locals.
    pub fn context(&self) -> Context {
        let mut context = Context::new();
        context.insert("is_logged_in", &self.is_logged_in);
        context.insert("user", &self.user);
        context
    }
}

pub struct LocalsStage {
    state: Arc<AppState>,
}

impl LocalsStage {
    pub fn new(state: Arc<AppState>) -> LocalsStage {
        LocalsStage { state }
    }

    async fn resolve(&self, auth: SessionAuth) -> Result<Locals, AppError> {
        let SessionAuth::Authenticated(id) = auth else {
            return Ok(Locals::default());
        };

        let database = self.state.database.lock().await;
        match database.get_user(id)? {
            Some(user) => Ok(Locals {
                is_logged_in: true,
                user: Some(user),
            }),
            None => {
                warn!("Session refers to user {} who no longer exists", id);
                Ok(Locals::default())
            }
        }
    }
}

impl Stage for LocalsStage {
    fn name(&self) -> &'static str {
        "locals"
    }

    fn run(&self, mut request: Request<Body>) -> BoxFuture<'_, Flow> {
        async move {
            let auth = request
                .extensions()
                .get::<SessionContext>()
                .map(|context| context.auth)
                .unwrap_or(SessionAuth::Anonymous);

            match self.resolve(auth).await {
                Ok(locals) => {
                    request.extensions_mut().insert(locals);
                    Flow::Continue(request)
                }
                Err(err) => Flow::Respond(err.into_response()),
            }
        }
        .boxed()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Locals {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Locals>().cloned().unwrap_or_default())
    }
}
