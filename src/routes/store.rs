use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    routing::{get, post},
};
use axum_macros::debug_handler;
use log::debug;

use crate::{
    error::AppError,
    model::{home, session::unix_now, AppState},
    pipeline::{CurrentUser, FormBody, Locals, RouteGroup},
    templates,
};

pub fn routes() -> RouteGroup {
    RouteGroup::new("store", "")
        .route("/", get(index))
        .route("/homes", get(homes))
        .route("/homes/:id", get(home_details))
        .route("/favourites", get(favourites).post(add_favourite))
        .route("/favourites/delete/:id", post(remove_favourite))
        .route("/bookings", get(bookings).post(book))
}

#[debug_handler]
async fn index(
    State(state): State<Arc<AppState>>,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let homes = state.database.lock().await.get_homes()?;

    let mut context = locals.context();
    context.insert("page_title", "Homestay");
    context.insert("homes", &homes);
    templates::render(&state.templates, "store/index.html", &context)
}

#[debug_handler]
async fn homes(
    State(state): State<Arc<AppState>>,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let homes = state.database.lock().await.get_homes()?;

    let mut context = locals.context();
    context.insert("page_title", "Homes List");
    context.insert("homes", &homes);
    templates::render(&state.templates, "store/home-list.html", &context)
}

#[debug_handler]
async fn home_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<home::Id>,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let home = state
        .database
        .lock()
        .await
        .get_home(id)?
        .ok_or(AppError::NotFound)?;

    let mut context = locals.context();
    context.insert("page_title", &home.name);
    context.insert("home", &home);
    templates::render(&state.templates, "store/home-detail.html", &context)
}

#[debug_handler]
async fn favourites(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let homes = state.database.lock().await.get_favourites(user)?;

    let mut context = locals.context();
    context.insert("page_title", "My Favourites");
    context.insert("homes", &homes);
    templates::render(&state.templates, "store/favourite-list.html", &context)
}

#[debug_handler]
async fn add_favourite(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    form: FormBody,
) -> Result<Redirect, AppError> {
    let id: home::Id = form.parse("id")?;

    let database = state.database.lock().await;
    if database.get_home(id)?.is_none() {
        return Err(AppError::NotFound);
    }
    database.add_favourite(user, id)?;

    Ok(Redirect::to("/favourites"))
}

#[debug_handler]
async fn remove_favourite(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<home::Id>,
) -> Result<Redirect, AppError> {
    state.database.lock().await.remove_favourite(user, id)?;
    Ok(Redirect::to("/favourites"))
}

#[debug_handler]
async fn bookings(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let bookings = state.database.lock().await.get_bookings(user)?;

    let mut context = locals.context();
    context.insert("page_title", "My Bookings");
    context.insert("bookings", &bookings);
    templates::render(&state.templates, "store/bookings.html", &context)
}

#[debug_handler]
async fn book(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    form: FormBody,
) -> Result<Redirect, AppError> {
    let id: home::Id = form.parse("id")?;

    let database = state.database.lock().await;
    if database.get_home(id)?.is_none() {
        return Err(AppError::NotFound);
    }
    let booking = database.add_booking(user, id, unix_now())?;
    debug!("Booking {} created", booking);

    Ok(Redirect::to("/bookings"))
}
