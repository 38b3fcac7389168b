use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Admin Router Module
///
/// Every handler here takes an `AuthUser`, which only the admin gate layered on
/// this router can provide. A request without a valid access or refresh cookie
/// is answered with 401 before any handler runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /admin/data
        // All courses, without text blocks or tests.
        .route("/data", get(handlers::get_admin_data))
        // GET /admin/user
        // The account behind the current session.
        .route("/user", get(handlers::get_admin_user))
}
