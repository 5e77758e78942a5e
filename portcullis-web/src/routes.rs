//! Route definitions
//!
//! Access rules live in the core [`AccessPolicy`](portcullis_core::AccessPolicy);
//! this table only maps paths to handlers.

use crate::{handlers, AppState};
use axum::{
    routing::{get, post},
    Router,
};

/// Pages and form endpoints
pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::main_page))
        .route("/login", get(handlers::login_page))
        .route("/loginProc", post(handlers::login_proc))
        .route("/join", get(handlers::join_page))
        .route("/joinProc", post(handlers::join_proc))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route("/my", get(handlers::my_page))
        .route("/my/{*rest}", get(handlers::my_page))
        .route("/admin", get(handlers::admin_page))
}
