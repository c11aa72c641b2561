use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    routing::{get, post},
};
use axum_macros::debug_handler;
use log::{debug, info};

use crate::{
    error::AppError,
    model::{
        home::{self, NewHome},
        user, AppState, Home,
    },
    pipeline::{CurrentUser, FormBody, Locals, RouteGroup},
    templates,
    upload::Uploads,
};

use super::HOST_PREFIX;

pub fn routes() -> RouteGroup {
    RouteGroup::new("host", HOST_PREFIX)
        .route("/host-home-list", get(host_homes))
        .route("/add-home", get(get_add_home).post(post_add_home))
        .route("/edit-home/:id", get(get_edit_home))
        .route("/edit-home", post(post_edit_home))
        .route("/delete-home/:id", post(delete_home))
}

const HOME_LIST: &str = "/host/host-home-list";

/// The editable fields of a home, as submitted by the host.
struct HomeFields {
    name: String,
    price: f64,
    location: String,
    rating: f64,
    description: String,
}

impl HomeFields {
    fn parse(form: &FormBody) -> Result<HomeFields, AppError> {
        let price: f64 = form.parse("price")?;
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::InvalidField("price"));
        }
        let rating: f64 = form.parse("rating")?;
        if !(0.0..=5.0).contains(&rating) {
            return Err(AppError::InvalidField("rating"));
        }

        Ok(HomeFields {
            name: form.require("name")?.to_string(),
            price,
            location: form.require("location")?.to_string(),
            rating,
            description: form.get("description").unwrap_or_default().trim().to_string(),
        })
    }
}

/// A home, provided it belongs to `host`.
fn owned(home: Option<Home>, host: user::Id) -> Result<Home, AppError> {
    match home {
        Some(home) if home.host == host => Ok(home),
        Some(home) => {
            debug!("Host {} tried to touch home {} of host {}", host, home.id, home.host);
            Err(AppError::NotFound)
        }
        None => Err(AppError::NotFound),
    }
}

fn uploads(state: &AppState) -> Uploads {
    Uploads::new(&state.settings.upload_dir)
}

#[debug_handler]
async fn host_homes(
    State(state): State<Arc<AppState>>,
    CurrentUser(host): CurrentUser,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let homes = state.database.lock().await.get_homes_by_host(host)?;

    let mut context = locals.context();
    context.insert("page_title", "Host Homes List");
    context.insert("homes", &homes);
    templates::render(&state.templates, "host/host-home-list.html", &context)
}

#[debug_handler]
async fn get_add_home(
    State(state): State<Arc<AppState>>,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let mut context = locals.context();
    context.insert("page_title", "Add Home to airbnb");
    context.insert("editing", &false);
    templates::render(&state.templates, "host/edit-home.html", &context)
}

#[debug_handler]
async fn post_add_home(
    State(state): State<Arc<AppState>>,
    CurrentUser(host): CurrentUser,
    form: FormBody,
) -> Result<Redirect, AppError> {
    let fields = HomeFields::parse(&form)?;

    let home = NewHome {
        host,
        name: fields.name,
        price: fields.price,
        location: fields.location,
        rating: fields.rating,
        photo: form.file.as_ref().map(|file| file.public_path()),
        description: fields.description,
    };
    let id = state.database.lock().await.add_home(&home)?;
    if let Some(file) = &form.file {
        file.keep();
    }
    info!("Host {} added home {}", host, id);

    Ok(Redirect::to(HOME_LIST))
}

#[debug_handler]
async fn get_edit_home(
    State(state): State<Arc<AppState>>,
    CurrentUser(host): CurrentUser,
    Path(id): Path<home::Id>,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let home = owned(state.database.lock().await.get_home(id)?, host)?;

    let mut context = locals.context();
    context.insert("page_title", "Edit your Home");
    context.insert("editing", &true);
    context.insert("home", &home);
    templates::render(&state.templates, "host/edit-home.html", &context)
}

#[debug_handler]
async fn post_edit_home(
    State(state): State<Arc<AppState>>,
    CurrentUser(host): CurrentUser,
    form: FormBody,
) -> Result<Redirect, AppError> {
    if let Some(old_photo) = edit_home(&state, host, &form).await? {
        uploads(&state).remove(&old_photo).await;
    }
    Ok(Redirect::to(HOME_LIST))
}

/// Apply an edit. Returns the photo the edit replaced, if any.
async fn edit_home(
    state: &AppState,
    host: user::Id,
    form: &FormBody,
) -> Result<Option<String>, AppError> {
    let id: home::Id = form.parse("id")?;
    let fields = HomeFields::parse(form)?;

    let database = state.database.lock().await;
    let mut home = owned(database.get_home(id)?, host)?;

    home.name = fields.name;
    home.price = fields.price;
    home.location = fields.location;
    home.rating = fields.rating;
    home.description = fields.description;

    let mut replaced = None;
    if let Some(file) = &form.file {
        replaced = home.photo.replace(file.public_path());
    }

    if !database.update_home(&home)? {
        return Err(AppError::NotFound);
    }
    if let Some(file) = &form.file {
        file.keep();
    }
    info!("Host {} updated home {}", host, home.id);

    Ok(replaced)
}

#[debug_handler]
async fn delete_home(
    State(state): State<Arc<AppState>>,
    CurrentUser(host): CurrentUser,
    Path(id): Path<home::Id>,
) -> Result<Redirect, AppError> {
    let home = {
        let database = state.database.lock().await;
        let home = owned(database.get_home(id)?, host)?;
        database.delete_home(home.id)?;
        home
    };
    info!("Host {} deleted home {}", host, home.id);

    if let Some(photo) = &home.photo {
        uploads(&state).remove(photo).await;
    }

    Ok(Redirect::to(HOME_LIST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        routes::app,
        testing::{self, body_text, get, multipart_post},
        upload,
    };
    use axum::http::{header, StatusCode};
    use tower::ServiceExt;

    const FIELDS: [(&str, &str); 5] = [
        ("name", "Lakeside Cottage"),
        ("price", "120"),
        ("location", "Lakeside"),
        ("rating", "4.5"),
        ("description", "Quiet"),
    ];

    fn uploaded_files(state: &AppState) -> Vec<String> {
        std::fs::read_dir(&state.settings.upload_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect()
    }

    fn is_stored_name(name: &str, original: &str) -> bool {
        let (prefix, rest) = name.split_at(upload::NAME_LENGTH);
        prefix.chars().all(|c| c.is_ascii_lowercase()) && rest == format!("-{}", original)
    }

    #[tokio::test]
    async fn adding_a_home_with_a_photo() {
        let state = testing::state();
        let (host, cookie) = testing::login(&state).await;

        for mime in ["image/png", "image/jpg", "image/jpeg"] {
            let response = app(state.clone())
                .oneshot(multipart_post(
                    "/host/add-home",
                    &FIELDS,
                    Some(("house.png", mime, &b"image bytes"[..])),
                    &cookie,
                ))
                .await
                .unwrap();
            assert_eq!(response.headers()[header::LOCATION], HOME_LIST);
        }

        let files = uploaded_files(&state);
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|name| is_stored_name(name, "house.png")));

        let homes = state.database.lock().await.get_homes_by_host(host).unwrap();
        assert_eq!(homes.len(), 3);
        for home in homes {
            let photo = home.photo.unwrap();
            let name = photo.strip_prefix(upload::PUBLIC_PREFIX).unwrap();
            assert!(files.iter().any(|file| file == name));
        }
    }

    #[tokio::test]
    async fn other_file_types_are_dropped() {
        let state = testing::state();
        let (host, cookie) = testing::login(&state).await;

        let response = app(state.clone())
            .oneshot(multipart_post(
                "/host/add-home",
                &FIELDS,
                Some(("house.gif", "image/gif", &b"GIF89a"[..])),
                &cookie,
            ))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], HOME_LIST);

        assert!(uploaded_files(&state).is_empty());
        let homes = state.database.lock().await.get_homes_by_host(host).unwrap();
        assert_eq!(homes[0].photo, None);
    }

    #[tokio::test]
    async fn anonymous_uploads_never_reach_the_handler() {
        let state = testing::state();
        let response = app(state.clone())
            .oneshot(multipart_post(
                "/host/add-home",
                &FIELDS,
                Some(("house.png", "image/png", &b"png"[..])),
                "theme=dark",
            ))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert!(state.database.lock().await.get_homes().unwrap().is_empty());
        assert!(uploaded_files(&state).is_empty());
    }

    #[tokio::test]
    async fn failed_edits_leave_no_photo_behind() {
        let state = testing::state();
        let (other, _) = testing::login(&state).await;
        let id = testing::add_home(&state, other, "Not Yours").await.to_string();
        let (_, cookie) = testing::login(&state).await;

        let mut fields = FIELDS.to_vec();
        fields.push(("id", id.as_str()));
        let response = app(state.clone())
            .oneshot(multipart_post(
                "/host/edit-home",
                &fields,
                Some(("new.png", "image/png", &b"png"[..])),
                &cookie,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(uploaded_files(&state).is_empty());
    }

    #[tokio::test]
    async fn invalid_homes_leave_no_photo_behind() {
        let state = testing::state();
        let (_, cookie) = testing::login(&state).await;

        let response = app(state.clone())
            .oneshot(multipart_post(
                "/host/add-home",
                &[("name", "Cottage"), ("price", "free")],
                Some(("house.png", "image/png", &b"png"[..])),
                &cookie,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(uploaded_files(&state).is_empty());
    }

    #[tokio::test]
    async fn editing_replaces_the_photo() {
        let state = testing::state();
        let (host, cookie) = testing::login(&state).await;
        let app = app(state.clone());

        app.clone()
            .oneshot(multipart_post(
                "/host/add-home",
                &FIELDS,
                Some(("old.png", "image/png", &b"old"[..])),
                &cookie,
            ))
            .await
            .unwrap();
        let id = state.database.lock().await.get_homes_by_host(host).unwrap()[0].id;

        let response = app
            .clone()
            .oneshot(get(&format!("/host/edit-home/{}", id), Some(&cookie)))
            .await
            .unwrap();
        assert!(body_text(response).await.contains("Lakeside Cottage"));

        let id = id.to_string();
        let mut fields = FIELDS.to_vec();
        fields.push(("id", id.as_str()));
        fields[0] = ("name", "Hilltop Cottage");
        let response = app
            .oneshot(multipart_post(
                "/host/edit-home",
                &fields,
                Some(("new.jpg", "image/jpeg", &b"new"[..])),
                &cookie,
            ))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], HOME_LIST);

        let files = uploaded_files(&state);
        assert_eq!(files.len(), 1);
        assert!(is_stored_name(&files[0], "new.jpg"));

        let home = &state.database.lock().await.get_homes_by_host(host).unwrap()[0];
        assert_eq!(home.name, "Hilltop Cottage");
        assert_eq!(home.photo.as_deref(), Some(format!("/uploads/{}", files[0]).as_str()));
    }

    #[tokio::test]
    async fn hosts_cannot_touch_each_others_homes() {
        let state = testing::state();
        let (other, _) = testing::login(&state).await;
        let id = testing::add_home(&state, other, "Not Yours").await;
        let (_, cookie) = testing::login(&state).await;
        let app = app(state.clone());

        let response = app
            .clone()
            .oneshot(get(&format!("/host/edit-home/{}", id), Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(testing::form_post(
                &format!("/host/delete-home/{}", id),
                "",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(state.database.lock().await.get_home(id).unwrap().is_some());
    }

    #[tokio::test]
    async fn deleting_a_home_removes_its_photo() {
        let state = testing::state();
        let (host, cookie) = testing::login(&state).await;
        let app = app(state.clone());

        app.clone()
            .oneshot(multipart_post(
                "/host/add-home",
                &FIELDS,
                Some(("house.png", "image/png", &b"png"[..])),
                &cookie,
            ))
            .await
            .unwrap();
        let id = state.database.lock().await.get_homes_by_host(host).unwrap()[0].id;
        assert_eq!(uploaded_files(&state).len(), 1);

        let response = app
            .oneshot(testing::form_post(
                &format!("/host/delete-home/{}", id),
                "",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], HOME_LIST);
        assert!(uploaded_files(&state).is_empty());
        assert!(state.database.lock().await.get_home(id).unwrap().is_none());
    }
}
