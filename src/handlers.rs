use crate::{
    AppState,
    auth::{AuthUser, REFRESH_COOKIE, token_cookie},
    courses::{self, CourseLookup, CourseLookupResult},
    error::{ApiError, ErrorBody},
    models::{Course, CourseDetails, CourseFilter, CreateCourseRequest, LoginRequest, UserProfile},
};
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;

// --- Query Structs ---

/// CourseQuery
///
/// Query parameters of `GET /courses`. With `id` set the other filters are ignored.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CourseQuery {
    /// Course id; returns a single course (or null).
    pub id: Option<String>,
    /// Case-insensitive substring of the theme.
    pub theme: Option<String>,
    /// Case-insensitive substring of the reading time.
    pub reading_time: Option<String>,
    /// `true` or `false`.
    pub has_tests: Option<String>,
}

impl CourseQuery {
    /// Turns raw query strings into a typed lookup. Empty values count as absent.
    pub fn into_lookup(self) -> Result<CourseLookup, ApiError> {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());

        if let Some(id) = present(self.id) {
            return Ok(CourseLookup::ById(courses::parse_course_id(&id)?));
        }

        let has_tests = present(self.has_tests)
            .map(|raw| courses::parse_has_tests(&raw))
            .transpose()?;

        Ok(CourseLookup::Filter(CourseFilter {
            theme: present(self.theme),
            reading_time: present(self.reading_time),
            has_tests,
        }))
    }
}

/// DeleteCourseQuery
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteCourseQuery {
    /// Id of the course to delete.
    pub id: Option<String>,
}

impl IntoResponse for CourseLookupResult {
    fn into_response(self) -> Response {
        match self {
            CourseLookupResult::One(course) => Json(course).into_response(),
            CourseLookupResult::Many(courses) => Json(courses).into_response(),
        }
    }
}

// --- Course Handlers ---

/// get_courses
///
/// [Public Route] With `?id=` returns one hydrated course, or `null` when it does
/// not exist. Otherwise lists hydrated courses matching the optional filters.
#[utoipa::path(
    get,
    path = "/courses",
    params(CourseQuery),
    responses(
        (status = 200, description = "One course (or null) when `id` is given, otherwise a list", body = [CourseDetails]),
        (status = 400, description = "Malformed query string, id or hasTests", body = ErrorBody)
    )
)]
pub async fn get_courses(
    State(state): State<AppState>,
    query: Result<Query<CourseQuery>, QueryRejection>,
) -> Result<CourseLookupResult, ApiError> {
    let Query(query) = query?;
    let lookup = query.into_lookup()?;
    state.courses.get(lookup).await
}

/// create_course
///
/// [Public Route] Creates a course with its text blocks, tests and answers in one
/// transaction. Every validation problem is reported before anything is written.
#[utoipa::path(
    post,
    path = "/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Created", body = CourseDetails),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
pub async fn create_course(
    State(state): State<AppState>,
    payload: Result<Json<CreateCourseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CourseDetails>), ApiError> {
    let Json(req) = payload?;
    let course = state.courses.create(req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// delete_course
///
/// [Public Route] Cascading delete. Unknown ids succeed as a no-op.
#[utoipa::path(
    delete,
    path = "/courses",
    params(DeleteCourseQuery),
    responses(
        (status = 204, description = "Deleted (or already absent)"),
        (status = 400, description = "Invalid course id", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody)
    )
)]
pub async fn delete_course(
    State(state): State<AppState>,
    query: Result<Query<DeleteCourseQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let Query(query) = query?;
    let raw = query
        .id
        .ok_or_else(|| ApiError::InvalidInput("missing course id".to_string()))?;
    let id = courses::parse_course_id(&raw)?;
    state.courses.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Admin Handlers ---

/// login
///
/// [Admin Gateway] Checks the credentials and sets the `access-token` and
/// `refresh-token` cookies. Nothing is set on failure.
#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = UserProfile),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<UserProfile>), ApiError> {
    let Json(req) = payload?;
    let outcome = state.auth.login(&req.username, &req.password).await?;

    let jar = CookieJar::new()
        .add(token_cookie(&outcome.access))
        .add(token_cookie(&outcome.refresh));
    Ok((jar, Json(outcome.user)))
}

/// refresh
///
/// [Admin Gateway] Mints a new access token from the refresh cookie.
/// The refresh token itself is kept as-is.
#[utoipa::path(
    post,
    path = "/admin/refresh",
    responses(
        (status = 204, description = "New access-token cookie set"),
        (status = 401, description = "Missing or invalid refresh token", body = ErrorBody)
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    let refresh_token = jar.get(REFRESH_COOKIE).map(Cookie::value);
    let (user, access) = state.auth.refresh(refresh_token).await?;
    tracing::debug!(user_id = user.id, "access token refreshed");

    Ok((CookieJar::new().add(token_cookie(&access)), StatusCode::NO_CONTENT))
}

/// get_admin_data
///
/// [Admin Route] Lists every course without children.
#[utoipa::path(
    get,
    path = "/admin/data",
    responses(
        (status = 200, description = "All courses", body = [Course]),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    )
)]
pub async fn get_admin_data(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.courses.list_summaries().await?))
}

/// get_admin_user
///
/// [Admin Route] Returns the account behind the current session.
#[utoipa::path(
    get,
    path = "/admin/user",
    responses(
        (status = 200, description = "Current admin", body = UserProfile),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody)
    )
)]
pub async fn get_admin_user(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.auth.profile(&user).await?))
}
