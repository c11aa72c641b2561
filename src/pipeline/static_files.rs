use std::path::PathBuf;

use axum::{
    body::{boxed, Body},
    http::{Method, Request, StatusCode},
    response::IntoResponse,
};
use futures::{future::BoxFuture, FutureExt};
use log::{error, trace};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use super::{under_prefix, Flow, Stage};

/// Serves files from `dir` under the `mount` URL prefix. A request for a
/// file that doesn't exist moves on to the next stage.
pub struct StaticFiles {
    mount: &'static str,
    dir: PathBuf,
}

impl StaticFiles {
    pub fn new(mount: &'static str, dir: impl Into<PathBuf>) -> StaticFiles {
        StaticFiles {
            mount,
            dir: dir.into(),
        }
    }
}

impl Stage for StaticFiles {
    fn name(&self) -> &'static str {
        "static"
    }

    fn run(&self, request: Request<Body>) -> BoxFuture<'_, Flow> {
        async move {
            if request.method() != Method::GET && request.method() != Method::HEAD {
                return Flow::Continue(request);
            }
            let Some(rest) = under_prefix(request.uri().path(), self.mount) else {
                return Flow::Continue(request);
            };

            let lookup = Request::builder()
                .method(request.method().clone())
                .uri(rest)
                .body(Body::empty());
            let mut lookup = match lookup {
                Ok(lookup) => lookup,
                Err(err) => {
                    error!("Can't look up {} as a file: {}", rest, err);
                    return Flow::Continue(request);
                }
            };
            *lookup.headers_mut() = request.headers().clone();

            match ServeDir::new(&self.dir).oneshot(lookup).await {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    Flow::Continue(request)
                }
                Ok(response) => {
                    trace!("Serving {} from {}", request.uri().path(), self.dir.display());
                    Flow::Respond(response.map(boxed))
                }
                Err(err) => {
                    error!("Failed to serve {}: {}", request.uri().path(), err);
                    Flow::Respond(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                }
            }
        }
        .boxed()
    }
}
