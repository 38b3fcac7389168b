use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints that need no session. The course endpoints validate their input
/// in the handlers and the course service before touching storage.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers and monitoring.
        .route("/health", get(|| async { "ok" }))
        // GET /courses?id=... | ?theme=...&readingTime=...&hasTests=...
        // One hydrated course by id (or null), or a filtered hydrated list.
        // POST /courses
        // Creates the course aggregate in one transaction.
        // DELETE /courses?id=...
        // Cascading, idempotent delete.
        .route(
            "/courses",
            get(handlers::get_courses)
                .post(handlers::create_course)
                .delete(handlers::delete_course),
        )
}
