//! Session cookies and access control
//!
//! The access control middleware resolves the `SESSION` cookie, asks the
//! [`AccessPolicy`](portcullis_core::AccessPolicy) for a decision and either
//! forwards the request with a [`SessionContext`] in its extensions or answers
//! it directly with a redirect or a 403 page.

pub mod csrf;
#[cfg(feature = "sqlite")]
pub mod database;

use crate::{AppState, WebError};
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use portcullis_core::{AuthError, Decision, SessionContext};
use std::convert::Infallible;
use tracing::{debug, warn};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "SESSION";

/// Build the session cookie for a freshly issued token
pub fn session_cookie(id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Cookie that clears the session cookie on the client
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// Look up the session named by the request's `SESSION` cookie
pub async fn resolve_session(state: &AppState, jar: &CookieJar) -> SessionContext {
    match jar.get(SESSION_COOKIE) {
        Some(cookie) => match state.sessions.resolve(cookie.value()).await {
            Some(session) => SessionContext::authenticated(session),
            None => {
                debug!("Session cookie does not name a live session");
                SessionContext::anonymous()
            }
        },
        None => SessionContext::anonymous(),
    }
}

/// Authorize every request against the access policy
pub async fn access_control(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let context = resolve_session(&state, &jar).await;
    let path = request.uri().path().to_string();

    match state.policy.authorize(&path, &context) {
        Decision::Permit => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Decision::Redirect(target) => {
            debug!(path = %path, "Unauthenticated request redirected to login");
            Redirect::to(&target).into_response()
        }
        Decision::Deny => {
            warn!(
                path = %path,
                user = ?context.username(),
                role = ?context.role(),
                "Access denied"
            );
            WebError::Auth(AuthError::Forbidden).into_response()
        }
    }
}

/// Session state of the current request
///
/// Taken from the request extensions when the access control middleware ran,
/// resolved from the cookie otherwise.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionContext);

impl<S> FromRequestParts<S> for CurrentSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<SessionContext>() {
            return Ok(CurrentSession(context.clone()));
        }

        let app_state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(CurrentSession(resolve_session(&app_state, &jar).await))
    }
}
