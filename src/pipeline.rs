//! The request pipeline.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Every request is handed
//! to each stage in turn until one of them answers it. Stages pass data
//! along as request extensions ([`SessionContext`], [`Locals`],
//! [`FormBody`]) and may leave [`DeferredHeaders`] for the final response.
//! An uploaded file that no handler kept is deleted before the response
//! leaves the dispatcher.
//!
//! The axum [`Router`] returned by [`router`] is only a shell: its fallback
//! hands every request to [`Pipeline::dispatch`].

mod body;
mod locals;
mod not_found;
mod routes;
mod session;
mod static_files;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures::future::BoxFuture;
use log::{debug, trace, warn};

use crate::upload::UploadedFile;

pub use body::{BodyStage, FormBody};
pub use locals::{Locals, LocalsStage};
pub use not_found::NotFound;
pub use routes::{RouteGroup, Routes};
pub use session::{CurrentUser, SessionContext, SessionStage};
pub use static_files::StaticFiles;

/// What a stage decided to do with a request.
pub enum Flow {
    /// Hand the (possibly modified) request to the next stage.
    Continue(Request<Body>),
    /// Stop here and send this response.
    Respond(Response),
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, request: Request<Body>) -> BoxFuture<'_, Flow>;
}

/// Response headers a stage wants on whatever response ends up being sent.
///
/// A header the answering stage set itself is never overwritten.
#[derive(Clone, Debug, Default)]
pub struct DeferredHeaders(pub Vec<(HeaderName, HeaderValue)>);

#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Pipeline {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let mut deferred = Vec::new();
        let mut upload: Option<UploadedFile> = None;

        let mut request = request;
        for stage in &self.stages {
            match stage.run(request).await {
                Flow::Continue(mut next) => {
                    if let Some(DeferredHeaders(headers)) =
                        next.extensions_mut().remove::<DeferredHeaders>()
                    {
                        deferred.extend(headers);
                    }
                    if upload.is_none() {
                        upload = next
                            .extensions()
                            .get::<FormBody>()
                            .and_then(|form| form.file.clone());
                    }
                    request = next;
                }
                Flow::Respond(response) => {
                    trace!("{} stage answered {} {}", stage.name(), method, path);
                    discard_unused(upload).await;
                    let response = apply_deferred(response, deferred);
                    debug!("{} {} -> {}", method, path, response.status());
                    return response;
                }
            }
        }

        warn!("No stage answered {} {}", method, path);
        discard_unused(upload).await;
        apply_deferred(StatusCode::NOT_FOUND.into_response(), deferred)
    }
}

async fn discard_unused(upload: Option<UploadedFile>) {
    if let Some(file) = upload {
        file.discard_unless_kept().await;
    }
}

fn apply_deferred(mut response: Response, deferred: Vec<(HeaderName, HeaderValue)>) -> Response {
    for (name, value) in deferred {
        if !response.headers().contains_key(&name) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(Arc::new(pipeline))
}

async fn dispatch(State(pipeline): State<Arc<Pipeline>>, request: Request<Body>) -> Response {
    pipeline.dispatch(request).await
}

/// The rest of `path` if it lies under `prefix`, on a segment boundary.
///
/// `under_prefix("/host/add-home", "/host")` is `Some("/add-home")`,
/// `under_prefix("/hosting", "/host")` is `None`.
pub fn under_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }

    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
