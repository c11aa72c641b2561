use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::{error, warn};
use thiserror::Error;

/// Errors raised while turning a request body into a [`FormBody`](crate::pipeline::FormBody).
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request body exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("malformed form body: {0}")]
    Malformed(String),

    #[error("unexpected file field `{0}`")]
    UnexpectedFile(String),

    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Malformed(_) | UploadError::UnexpectedFile(_) => StatusCode::BAD_REQUEST,
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<multer::Error> for UploadError {
    fn from(err: multer::Error) -> Self {
        match exceeded_limit(&err) {
            Some(limit) => UploadError::TooLarge {
                limit: limit as usize,
            },
            None => UploadError::Malformed(err.to_string()),
        }
    }
}

/// The size limit a multer error reports, even when it surfaces wrapped in
/// a read failure of the field that was being parsed.
fn exceeded_limit(err: &multer::Error) -> Option<u64> {
    match err {
        multer::Error::StreamSizeExceeded { limit } => Some(*limit),
        multer::Error::StreamReadFailed(inner) => inner
            .downcast_ref::<multer::Error>()
            .and_then(exceeded_limit),
        _ => None,
    }
}

/// Handler level failures.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("missing form field `{0}`")]
    MissingField(&'static str),

    #[error("invalid form field `{0}`")]
    InvalidField(&'static str),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Template(_) | AppError::Hash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::MissingField(_) | AppError::InvalidField(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Upload(err) => err.status(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
            return (status, "Something went wrong").into_response();
        }

        warn!("Rejected request: {}", self);
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
