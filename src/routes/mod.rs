//! Router Module Index
//!
//! Routing split by access level. The admin gate is applied as a layer on the
//! `authenticated` router in `create_router`, so no protected endpoint can be
//! registered without it by accident.

/// Routes open to everyone: health check and the courses API.
pub mod public;

/// Admin gateway routes that establish a session (login, refresh).
/// Mounted under `/admin`, not behind the gate.
pub mod admin;

/// Admin routes behind the access/refresh cookie gate. Mounted under `/admin`.
pub mod authenticated;
