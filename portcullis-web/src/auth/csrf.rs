//! Double-submit CSRF tokens
//!
//! Form pages set an `XSRF-TOKEN` cookie and embed the same value in a hidden
//! `_csrf` field. A state-changing POST is accepted only when both are present
//! and equal.

use crate::WebError;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Cookie carrying the token
pub const CSRF_COOKIE: &str = "XSRF-TOKEN";

/// Form field carrying the token
pub const CSRF_FIELD: &str = "_csrf";

fn generate_token() -> String {
    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Return the browser's current token, minting and setting one if absent
pub fn issue(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    if let Some(existing) = jar.get(CSRF_COOKIE).map(|c| c.value().to_string()) {
        if !existing.is_empty() {
            return (jar, existing);
        }
    }

    mint(jar, secure)
}

/// Replace the browser's token with a fresh one.
///
/// Called when the session changes hands so a token planted before login is
/// dead afterwards.
pub fn rotate(jar: CookieJar, secure: bool) -> CookieJar {
    mint(jar, secure).0
}

fn mint(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    let token = generate_token();
    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();
    (jar.add(cookie), token)
}

/// Check a submitted token against the cookie in constant time
pub fn verify(jar: &CookieJar, submitted: &str) -> Result<(), WebError> {
    let expected = jar.get(CSRF_COOKIE).map(|c| c.value()).unwrap_or("");

    if expected.is_empty() || submitted.is_empty() {
        warn!("CSRF check failed: token missing");
        return Err(WebError::Csrf);
    }

    if bool::from(expected.as_bytes().ct_eq(submitted.as_bytes())) {
        Ok(())
    } else {
        warn!("CSRF check failed: token mismatch");
        Err(WebError::Csrf)
    }
}
