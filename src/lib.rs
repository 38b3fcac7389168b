use axum::{
    Json, Router,
    extract::{FromRef, Request, State},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use utoipa::OpenApi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod courses;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

// Routing segregation (Public, Admin gateway, Authenticated admin).
pub mod routes;
use routes::{admin, authenticated, public};

use auth::{ACCESS_COOKIE, AuthService, REFRESH_COOKIE, TokenError, TokenIssuer, token_cookie};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use courses::CourseService;
pub use error::ApiError;
pub use repository::{RepositoryState, SqliteRepository};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_courses, handlers::create_course, handlers::delete_course,
        handlers::login, handlers::refresh, handlers::get_admin_data, handlers::get_admin_user
    ),
    components(
        schemas(
            models::Course, models::TextBlock, models::Test, models::Answer,
            models::CourseDetails, models::TestDetails, models::UserProfile,
            models::CreateCourseRequest, models::NewTextBlock, models::NewTest, models::NewAnswer,
            models::LoginRequest, error::ErrorBody, error::ValidationIssue,
        )
    ),
    tags(
        (name = "courses", description = "Courses API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single, immutable container shared by every request. Both services hold
/// the same storage handle, injected once at startup.
#[derive(Clone)]
pub struct AppState {
    /// Course aggregate service (create, read, cascading delete).
    pub courses: CourseService,
    /// Login, token gate, principal lookup.
    pub auth: AuthService,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// new
    ///
    /// Wires both services to `repo`. Fails if the signing secret is empty.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Result<Self, TokenError> {
        let tokens = TokenIssuer::new(&config.jwt_secret)?;
        Ok(Self {
            courses: CourseService::new(repo.clone()),
            auth: AuthService::new(repo, tokens),
            config,
        })
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for CourseService {
    fn from_ref(app_state: &AppState) -> CourseService {
        app_state.courses.clone()
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(app_state: &AppState) -> AuthService {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// The admin gate. Resolves the principal from the `access-token` cookie, or
/// from the `refresh-token` cookie when the access token is missing or invalid.
/// In the latter case the freshly minted access token is attached to the response
/// as a new cookie. On failure the request is rejected with 401 and the handler
/// never runs.
async fn auth_middleware(
    State(auth): State<AuthService>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let cookie_value = |name: &str| jar.get(name).map(Cookie::value).filter(|v| !v.is_empty());

    let outcome = auth
        .authenticate(cookie_value(ACCESS_COOKIE), cookie_value(REFRESH_COOKIE))
        .await?;

    request.extensions_mut().insert(outcome.user);
    let response = next.run(request).await;

    Ok(match outcome.refreshed_access {
        Some(access) => (CookieJar::new().add(token_cookie(&access)), response).into_response(),
        None => response,
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// cors_layer
///
/// With `CORS_ORIGIN_URL` set, only that origin may call the API and cookies are
/// allowed. Without it any origin may call, without credentials.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let permissive = || {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any)
    };

    match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE]),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "CORS_ORIGIN_URL is not a valid header value; allowing any origin");
            permissive()
        }
        None => permissive(),
    }
}

/// create_router
///
/// Assembles the routing structure, the admin gate, and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // Admin: login/refresh are open, the rest sits behind the gate.
    let admin_router = admin::admin_routes().merge(
        authenticated::authenticated_routes()
            .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
    );

    let base_router = Router::new()
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(public::public_routes())
        .nest("/admin", admin_router)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span: method, URI and the `x-request-id` so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
