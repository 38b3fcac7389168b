use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Admin Gateway Router Module
///
/// The two admin endpoints that must be reachable without a valid access token:
/// they are how a session is started and kept alive.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /admin/login
        // Checks username/password and sets the access-token and refresh-token cookies.
        .route("/login", post(handlers::login))
        // POST /admin/refresh
        // Mints a new access-token cookie from a valid refresh-token cookie.
        .route("/refresh", post(handlers::refresh))
}
