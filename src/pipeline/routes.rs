use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::Request,
    routing::MethodRouter,
    Router,
};
use futures::{future::BoxFuture, FutureExt};
use tower::ServiceExt;

use super::{Flow, Stage};
use crate::model::AppState;

/// A group of handlers mounted under a common prefix.
pub struct RouteGroup {
    name: &'static str,
    prefix: &'static str,
    patterns: Vec<String>,
    router: Router<Arc<AppState>>,
}

impl RouteGroup {
    pub fn new(name: &'static str, prefix: &'static str) -> RouteGroup {
        RouteGroup {
            name,
            prefix: prefix.trim_end_matches('/'),
            patterns: Vec::new(),
            router: Router::new(),
        }
    }

    pub fn route(mut self, path: &str, method_router: MethodRouter<Arc<AppState>>) -> RouteGroup {
        let full = match (self.prefix, path) {
            ("", path) => path.to_string(),
            (prefix, "/") => prefix.to_string(),
            (prefix, path) => format!("{}{}", prefix, path),
        };
        self.router = self.router.route(&full, method_router);
        self.patterns.push(full);
        self
    }

    pub fn with_state(self, state: Arc<AppState>) -> Routes {
        Routes {
            name: self.name,
            patterns: self.patterns,
            router: Mutex::new(self.router.with_state(state)),
        }
    }
}

/// A [`RouteGroup`] ready to run as a pipeline stage. It answers every
/// request whose path matches one of its routes.
pub struct Routes {
    name: &'static str,
    patterns: Vec<String>,
    // `Router` isn't `Sync`; each request runs on its own clone.
    router: Mutex<Router>,
}

impl Routes {
    pub fn claims(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| matches(pattern, path))
    }

    fn router(&self) -> Router {
        match self.router.lock() {
            Ok(router) => router.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Stage for Routes {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, request: Request<Body>) -> BoxFuture<'_, Flow> {
        async move {
            if !self.claims(request.uri().path()) {
                return Flow::Continue(request);
            }

            let router = self.router();
            match router.oneshot(request).await {
                Ok(response) => Flow::Respond(response),
                Err(never) => match never {},
            }
        }
        .boxed()
    }
}

/// Segment-wise match; `:name` matches any one non-empty segment.
fn matches(pattern: &str, path: &str) -> bool {
    let mut pattern = pattern.split('/');
    let mut path = path.split('/');

    loop {
        match (pattern.next(), path.next()) {
            (None, None) => return true,
            (Some(expected), Some(actual)) => {
                let wildcard = expected.starts_with(':') && !actual.is_empty();
                if !wildcard && expected != actual {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::{
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    };

    #[test]
    fn patterns() {
        assert!(matches("/", "/"));
        assert!(matches("/homes", "/homes"));
        assert!(matches("/homes/:id", "/homes/12"));
        assert!(!matches("/homes/:id", "/homes/"));
        assert!(!matches("/homes/:id", "/homes"));
        assert!(!matches("/homes/:id", "/homes/12/edit"));
        assert!(!matches("/homes", "/homes/"));
        assert!(!matches("/", "/homes"));
    }

    #[test]
    fn route_groups_can_be_shared_between_threads() {
        fn shared<T: Stage + Send + Sync + 'static>(_: &T) {}
        let routes = RouteGroup::new("store", "")
            .route("/", get(|| async { "index" }))
            .with_state(testing::state());
        shared(&routes);
    }

    #[tokio::test]
    async fn claims_prefixed_paths_and_answers_wrong_methods() {
        let routes = RouteGroup::new("host", "/host")
            .route("/", get(|| async { "home" }))
            .route("/add-home", post(|| async { StatusCode::CREATED.into_response() }))
            .with_state(testing::state());

        assert!(routes.claims("/host"));
        assert!(routes.claims("/host/add-home"));
        assert!(!routes.claims("/add-home"));

        let request = Request::builder()
            .uri("/host/add-home")
            .body(Body::empty())
            .unwrap();
        match routes.run(request).await {
            Flow::Respond(response) => {
                assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED)
            }
            Flow::Continue(_) => panic!("claimed path was passed on"),
        }
    }
}
