//! Page and form handlers
//!
//! Access control has already run by the time these are called, so the
//! handlers for protected pages can rely on the session being present.

use crate::auth::{csrf, removal_cookie, session_cookie, CurrentSession, SESSION_COOKIE};
use crate::templates::{
    AdminTemplate, ErrorTemplate, JoinTemplate, LoginTemplate, MainTemplate, MyTemplate,
};
use crate::{AppState, WebResult};
use askama::Template;
use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use portcullis_core::{AuthError, Credentials, SessionContext};
use serde::Deserialize;
use tracing::{info, warn};

/// Body of the login and registration forms
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "_csrf", default)]
    pub csrf: String,
}

impl CredentialsForm {
    fn credentials(&self) -> Credentials {
        Credentials::new(self.username.as_str(), self.password.as_str())
    }
}

/// `?error=` on the form pages
#[derive(Debug, Default, Deserialize)]
pub struct FormQuery {
    pub error: Option<String>,
}

/// GET /
pub async fn main_page(CurrentSession(context): CurrentSession) -> WebResult<Html<String>> {
    Ok(Html(MainTemplate::new(&context).render()?))
}

/// GET /login
pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<FormQuery>,
) -> WebResult<(CookieJar, Html<String>)> {
    let (jar, token) = csrf::issue(jar, state.config.secure_cookies);
    let page = LoginTemplate::new(token, query.error.as_deref()).render()?;
    Ok((jar, Html(page)))
}

/// POST /loginProc
pub async fn login_proc(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> WebResult<Response> {
    csrf::verify(&jar, &form.csrf)?;

    let previous = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let result = state
        .sessions
        .authenticate(&form.credentials(), previous.as_deref())
        .await;

    match result {
        Ok(session) => {
            let secure = state.config.secure_cookies;
            let jar = csrf::rotate(jar.add(session_cookie(session.id, secure)), secure);
            Ok((jar, Redirect::to("/")).into_response())
        }
        Err(e) if e.is_client_error() => {
            Ok(Redirect::to(&format!("/login?error={}", e.code())).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /join
pub async fn join_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<FormQuery>,
) -> WebResult<(CookieJar, Html<String>)> {
    let (jar, token) = csrf::issue(jar, state.config.secure_cookies);
    let page = JoinTemplate::new(token, query.error.as_deref()).render()?;
    Ok((jar, Html(page)))
}

/// POST /joinProc
///
/// A taken username ends on the login page like a successful registration
/// unless `surface_duplicate_registration` is enabled.
pub async fn join_proc(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> WebResult<Redirect> {
    csrf::verify(&jar, &form.csrf)?;

    match state.registration.register(&form.credentials()).await {
        Ok(_) => Ok(Redirect::to("/login")),
        Err(AuthError::AlreadyExists(username)) => {
            info!(username = %username, "Duplicate registration attempt");
            if state.settings.registration.surface_duplicate_registration {
                Ok(Redirect::to("/join?error=exists"))
            } else {
                Ok(Redirect::to("/login"))
            }
        }
        Err(AuthError::MissingCredentials) => Ok(Redirect::to("/join?error=missing")),
        Err(e) => Err(e.into()),
    }
}

/// GET or POST /logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.logout(cookie.value()).await.is_none() {
            warn!("Logout for a session that was already closed");
        }
    }

    (jar.remove(removal_cookie()), Redirect::to("/"))
}

fn signed_in(context: &SessionContext) -> WebResult<(&str, String)> {
    match &context.session {
        Some(session) => Ok((session.username.as_str(), session.role.to_string())),
        None => Err(AuthError::Unauthenticated.into()),
    }
}

/// GET /my/**
pub async fn my_page(CurrentSession(context): CurrentSession) -> WebResult<Html<String>> {
    let (username, role) = signed_in(&context)?;
    Ok(Html(MyTemplate::new(username, &role).render()?))
}

/// GET /admin
pub async fn admin_page(CurrentSession(context): CurrentSession) -> WebResult<Html<String>> {
    let (username, _) = signed_in(&context)?;
    Ok(Html(AdminTemplate::new(username).render()?))
}

/// Anything without a route
pub async fn not_found() -> WebResult<(StatusCode, Html<String>)> {
    let page = ErrorTemplate::new(404, "Page not found.".to_string()).render()?;
    Ok((StatusCode::NOT_FOUND, Html(page)))
}
