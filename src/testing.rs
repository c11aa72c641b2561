//! Helpers shared by the unit tests.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
};

use crate::{
    auth::token::random_name,
    config::Settings,
    model::{
        home::{self, NewHome},
        session::SessionData,
        user::{self, NewUser, UserType},
        AppState, Database,
    },
    templates,
};

pub const TEMPLATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*");
pub const BOUNDARY: &str = "homestay-test-boundary";

/// A fresh, empty directory for uploads.
pub fn upload_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("homestay-uploads-{}", random_name(12)));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn state() -> Arc<AppState> {
    let settings = Settings {
        db_path: ":memory:".to_string(),
        session_secret: "test secret".to_string(),
        addr: "127.0.0.1:0".parse().unwrap(),
        upload_dir: upload_dir(),
        public_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/public")),
        templates: TEMPLATES.to_string(),
        session_ttl: Duration::from_secs(60 * 60),
        max_upload_bytes: 1024 * 1024,
    };
    let database = Database::open_in_memory().unwrap();
    let templates = templates::load(TEMPLATES).unwrap();

    Arc::new(AppState::new(database, templates, settings).unwrap())
}

/// Register a host and log them in. Returns their id and a `Cookie` header value.
pub async fn login(state: &AppState) -> (user::Id, String) {
    let user = NewUser {
        first_name: "Test".to_string(),
        last_name: "Host".to_string(),
        email: format!("{}@example.com", random_name(8)),
        password: "not a real hash".to_string(),
        user_type: UserType::Host,
    };
    let id = state.database.lock().await.add_user(&user).unwrap();
    let session = state
        .sessions
        .issue_with(SessionData::logged_in(id))
        .await
        .unwrap();

    (id, format!("sid={}", state.cookies.sign(&session.id)))
}

pub async fn add_home(state: &AppState, host: user::Id, name: &str) -> home::Id {
    let home = NewHome {
        host,
        name: name.to_string(),
        price: 100.0,
        location: "Somewhere".to_string(),
        rating: 4.0,
        photo: None,
        description: String::new(),
    };
    state.database.lock().await.add_home(&home).unwrap()
}

pub fn get(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    request.body(Body::empty()).unwrap()
}

pub fn form_post(path: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    request.body(Body::from(body.to_string())).unwrap()
}

/// A multipart body with text `fields` and an optional `(file name, type, bytes)`
/// under the photo field. Returns the content type and the body.
pub fn multipart(
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> (String, Body) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, mime_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: {}\r\n\r\n",
                BOUNDARY,
                crate::upload::FIELD,
                file_name,
                mime_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (
        format!("multipart/form-data; boundary={}", BOUNDARY),
        Body::from(body),
    )
}

pub fn multipart_post(
    path: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
    cookie: &str,
) -> Request<Body> {
    let (content_type, body) = multipart(fields, file);
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::COOKIE, cookie)
        .body(body)
        .unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// The `sid=...` pair from a response's `Set-Cookie` header.
pub fn session_cookie(response: &Response) -> Option<String> {
    let value = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    value.split(';').next().map(str::to_string)
}
