use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Redirect},
};
use futures::{future::BoxFuture, FutureExt};
use log::debug;

use crate::{
    model::SessionAuth,
    pipeline::{under_prefix, Flow, SessionContext, Stage},
};

/// Lets only logged in sessions through to paths under `prefix`; everyone
/// else is redirected to the login page.
pub struct AuthGate {
    prefix: &'static str,
    login: &'static str,
}

impl AuthGate {
    pub fn new(prefix: &'static str, login: &'static str) -> AuthGate {
        AuthGate { prefix, login }
    }

    /// Decide on the session snapshot alone.
    pub fn allows(auth: SessionAuth) -> bool {
        match auth {
            SessionAuth::Authenticated(_) => true,
            SessionAuth::Anonymous | SessionAuth::Expired => false,
        }
    }
}

impl Stage for AuthGate {
    fn name(&self) -> &'static str {
        "auth gate"
    }

    fn run(&self, request: Request<Body>) -> BoxFuture<'_, Flow> {
        async move {
            if under_prefix(request.uri().path(), self.prefix).is_none() {
                return Flow::Continue(request);
            }

            let auth = request
                .extensions()
                .get::<SessionContext>()
                .map(|context| context.auth)
                .unwrap_or(SessionAuth::Anonymous);

            if AuthGate::allows(auth) {
                Flow::Continue(request)
            } else {
                debug!("{:?} session turned away from {}", auth, request.uri().path());
                Flow::Respond(Redirect::to(self.login).into_response())
            }
        }
        .boxed()
    }
}
