use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_macros::debug_handler;
use log::{debug, info};

use crate::{
    auth::hash,
    error::AppError,
    model::{
        session::SessionData,
        user::{NewUser, UserType},
        AppState,
    },
    pipeline::{FormBody, Locals, RouteGroup, SessionContext},
    templates,
};

pub fn routes() -> RouteGroup {
    RouteGroup::new("auth", "")
        .route("/login", get(get_login).post(post_login))
        .route("/signup", get(get_signup).post(post_signup))
        .route("/logout", post(logout))
}

const MIN_PASSWORD_LENGTH: usize = 8;

#[debug_handler]
async fn get_login(
    State(state): State<Arc<AppState>>,
    locals: Locals,
) -> Result<Response, AppError> {
    render_login(&state, &locals, "", &[], StatusCode::OK)
}

#[debug_handler]
async fn post_login(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    locals: Locals,
    form: FormBody,
) -> Result<Response, AppError> {
    let email = form.get("email").unwrap_or_default().trim();
    let password = form.get("password").unwrap_or_default();
    debug!("Got login request for {}", email);

    let user = state.database.lock().await.get_user_by_email(email)?;
    let user = match user {
        Some(user) if hash::check_passwords(password, &user.password) => user,
        _ => {
            debug!("Login failed for {}", email);
            return render_login(
                &state,
                &locals,
                email,
                &["Invalid email or password"],
                StatusCode::UNPROCESSABLE_ENTITY,
            );
        }
    };

    // A fresh id on login, so an id handed out before can't ride along
    state.sessions.destroy(&session.session.id).await?;
    let session = state
        .sessions
        .issue_with(SessionData::logged_in(user.id))
        .await?;
    info!("User {} logged in", user.id);

    let mut response = Redirect::to("/").into_response();
    if let Some(cookie) = state.cookies.header(&session.id) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

#[debug_handler]
async fn logout(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Redirect, AppError> {
    debug!("Logging out session {}", session.session.id);
    state.sessions.destroy(&session.session.id).await?;
    Ok(Redirect::to("/login"))
}

#[debug_handler]
async fn get_signup(
    State(state): State<Arc<AppState>>,
    locals: Locals,
) -> Result<Response, AppError> {
    render_signup(&state, &locals, &Signup::default(), &[], StatusCode::OK)
}

#[debug_handler]
async fn post_signup(
    State(state): State<Arc<AppState>>,
    locals: Locals,
    form: FormBody,
) -> Result<Response, AppError> {
    let signup = Signup::from_form(&form);
    let errors = signup.validate();
    if !errors.is_empty() {
        debug!("Signup rejected: {:?}", errors);
        return render_signup(
            &state,
            &locals,
            &signup,
            &errors,
            StatusCode::UNPROCESSABLE_ENTITY,
        );
    }

    let Some(user_type) = signup.user_type else {
        return Err(AppError::InvalidField("userType"));
    };

    let taken = state
        .database
        .lock()
        .await
        .get_user_by_email(&signup.email)?
        .is_some();
    if taken {
        return render_signup(
            &state,
            &locals,
            &signup,
            &["An account with this email already exists"],
            StatusCode::UNPROCESSABLE_ENTITY,
        );
    }

    // Hashing is slow; the database stays free for other requests meanwhile
    let user = signup.new_user(user_type).await?;

    let id = match state.database.lock().await.add_user(&user) {
        Ok(id) => id,
        Err(err) if is_unique_violation(&err) => {
            debug!("{} registered concurrently", user.email);
            return render_signup(
                &state,
                &locals,
                &signup,
                &["An account with this email already exists"],
                StatusCode::UNPROCESSABLE_ENTITY,
            );
        }
        Err(err) => return Err(err.into()),
    };
    info!("Registered {} {} as user {}", user.user_type, user.email, id);

    Ok(Redirect::to("/login").into_response())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn render_login(
    state: &AppState,
    locals: &Locals,
    email: &str,
    errors: &[&str],
    status: StatusCode,
) -> Result<Response, AppError> {
    let mut context = locals.context();
    context.insert("page_title", "Login");
    context.insert("email", email);
    context.insert("errors", errors);
    let page = templates::render(&state.templates, "auth/login.html", &context)?;
    Ok((status, page).into_response())
}

fn render_signup(
    state: &AppState,
    locals: &Locals,
    signup: &Signup,
    errors: &[&str],
    status: StatusCode,
) -> Result<Response, AppError> {
    let mut context = locals.context();
    context.insert("page_title", "Signup");
    context.insert("old", signup);
    context.insert("errors", errors);
    let page = templates::render(&state.templates, "auth/signup.html", &context)?;
    Ok((status, page).into_response())
}

#[derive(Debug, Default, serde::Serialize)]
struct Signup {
    first_name: String,
    last_name: String,
    email: String,
    #[serde(skip)]
    password: String,
    #[serde(skip)]
    confirm_password: String,
    user_type: Option<UserType>,
    #[serde(skip)]
    terms: bool,
}

impl Signup {
    fn from_form(form: &FormBody) -> Signup {
        let text = |name: &str| form.get(name).unwrap_or_default().trim().to_string();
        Signup {
            first_name: text("firstName"),
            last_name: text("lastName"),
            email: text("email").to_lowercase(),
            password: form.get("password").unwrap_or_default().to_string(),
            confirm_password: form.get("confirmPassword").unwrap_or_default().to_string(),
            user_type: form.get("userType").and_then(|value| value.parse().ok()),
            terms: form.checked("terms"),
        }
    }

    /// Hash the password on the blocking pool and build the record to store.
    async fn new_user(&self, user_type: UserType) -> Result<NewUser, AppError> {
        let password = self.password.clone();
        let hashed = tokio::task::spawn_blocking(move || hash::hash_password(&password))
            .await
            .map_err(|err| AppError::Hash(err.to_string()))??;

        Ok(NewUser {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            password: hashed,
            user_type,
        })
    }

    fn validate(&self) -> Vec<&'static str> {
        let mut errors = Vec::new();

        if self.first_name.is_empty() {
            errors.push("First name is required");
        } else if !self.first_name.chars().all(|c| c.is_alphabetic() || c == ' ') {
            errors.push("First name can only contain letters");
        }
        if !looks_like_email(&self.email) {
            errors.push("Please enter a valid email");
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push("Password must be at least 8 characters long");
        }
        if self.password != self.confirm_password {
            errors.push("Passwords do not match");
        }
        if self.user_type.is_none() {
            errors.push("Please select a user type");
        }
        if !self.terms {
            errors.push("Please accept the terms and conditions");
        }

        errors
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(name, tld)| !name.is_empty() && !tld.is_empty())
        && !email.contains(char::is_whitespace)
}
