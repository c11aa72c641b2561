pub mod auth;
pub mod host;
pub mod store;

use std::sync::Arc;

use axum::Router;

use crate::{
    auth::gate::AuthGate,
    model::AppState,
    pipeline::{self, BodyStage, LocalsStage, NotFound, Pipeline, SessionStage, StaticFiles},
    upload::Uploads,
};

pub const LOGIN_PATH: &str = "/login";
pub const HOST_PREFIX: &str = "/host";

/// Wire up the full request pipeline.
pub fn pipeline(state: Arc<AppState>) -> Pipeline {
    let settings = &state.settings;
    let uploads = Uploads::new(&settings.upload_dir);

    Pipeline::new()
        .stage(SessionStage::new(state.clone()))
        .stage(LocalsStage::new(state.clone()))
        .stage(BodyStage::new(uploads.clone(), settings.max_upload_bytes))
        .stage(StaticFiles::new("/", &settings.public_dir))
        .stage(StaticFiles::new("/uploads", uploads.dir()))
        .stage(StaticFiles::new("/host/uploads", uploads.dir()))
        .stage(StaticFiles::new("/homes/uploads", uploads.dir()))
        .stage(auth::routes().with_state(state.clone()))
        .stage(store::routes().with_state(state.clone()))
        .stage(AuthGate::new(HOST_PREFIX, LOGIN_PATH))
        .stage(host::routes().with_state(state.clone()))
        .stage(NotFound::new(state))
}

pub fn app(state: Arc<AppState>) -> Router {
    pipeline::router(pipeline(state))
}
