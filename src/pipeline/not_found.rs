use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
};
use futures::{future::BoxFuture, FutureExt};
use log::debug;

use super::{Flow, Locals, Stage};
use crate::{model::AppState, templates};

/// Last stage: answers everything with the "page not found" page.
pub struct NotFound {
    state: Arc<AppState>,
}

impl NotFound {
    pub fn new(state: Arc<AppState>) -> NotFound {
        NotFound { state }
    }
}

impl Stage for NotFound {
    fn name(&self) -> &'static str {
        "not found"
    }

    fn run(&self, request: Request<Body>) -> BoxFuture<'_, Flow> {
        async move {
            debug!("Page not found: {} {}", request.method(), request.uri().path());

            let locals = request.extensions().get::<Locals>().cloned().unwrap_or_default();
            let mut context = locals.context();
            context.insert("page_title", "Page Not Found");

            let response = match templates::render(&self.state.templates, "404.html", &context) {
                Ok(page) => (StatusCode::NOT_FOUND, page).into_response(),
                Err(err) => {
                    debug!("Falling back to a plain not found page: {}", err);
                    (StatusCode::NOT_FOUND, "Page Not Found").into_response()
                }
            };
            Flow::Respond(response)
        }
        .boxed()
    }
}
