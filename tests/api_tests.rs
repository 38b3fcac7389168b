use courses_backend::{
    AppConfig, AppState, create_router,
    auth::{Claims, TokenKind},
    models::{Course, CourseDetails, UserProfile},
    repository::{self, RepositoryState, SqliteRepository},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use reqwest::{StatusCode, header};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;

const ADMIN_USER: &str = "admin";
const ADMIN_PASSWORD: &str = "correct horse battery staple";

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
    pub pool: sqlx::SqlitePool,
    pub jwt_secret: String,
}

/// Boots the full router on an ephemeral port over a fresh in-memory database,
/// with one admin account already provisioned.
async fn spawn_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database in tests");
    repository::migrate(&pool).await.expect("Failed to migrate");

    let repo = Arc::new(SqliteRepository::new(pool.clone())) as RepositoryState;
    let config = AppConfig::default();
    let jwt_secret = config.jwt_secret.clone();

    let state = AppState::new(repo, config).expect("valid secret");
    state
        .auth
        .ensure_admin(ADMIN_USER, ADMIN_PASSWORD)
        .await
        .expect("Failed to seed admin");

    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        pool,
        jwt_secret,
    }
}

/// `name=value` pairs from every Set-Cookie header of the response.
fn cookies_of(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    cookies_of(response)
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
}

async fn login(app: &TestApp, client: &reqwest::Client) -> (String, String) {
    let response = client
        .post(format!("{}/admin/login", app.address))
        .json(&json!({ "username": ADMIN_USER, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::OK);

    let access = cookie_value(&response, "access-token").expect("access cookie");
    let refresh = cookie_value(&response, "refresh-token").expect("refresh cookie");
    (access, refresh)
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_course_lifecycle() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // 1. Create
    let created: CourseDetails = {
        let response = client
            .post(format!("{}/courses", app.address))
            .json(&json!({
                "theme": "Borrowing",
                "readingTime": "12 min",
                "hasTests": true,
                "textBlocks": [
                    { "name": "intro", "text": "hello" },
                    { "name": "rules", "text": "one &mut or many &" }
                ],
                "tests": [
                    { "question": "Can two &mut coexist?", "answers": [
                        { "text": "yes", "right": false },
                        { "text": "no", "right": true }
                    ]}
                ]
            }))
            .send()
            .await
            .expect("req fail");
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    };
    assert_eq!(created.text_blocks.len(), 2);
    assert_eq!(created.tests[0].answers.len(), 2);

    // 2. Read by id, and via filters
    let fetched: Option<CourseDetails> = client
        .get(format!("{}/courses?id={}", app.address, created.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.as_ref(), Some(&created));

    let listed: Vec<CourseDetails> = client
        .get(format!("{}/courses?theme=BORROW&hasTests=true", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, vec![created.clone()]);

    // 3. Delete, twice
    for _ in 0..2 {
        let response = client
            .delete(format!("{}/courses?id={}", app.address, created.id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    // 4. Gone, children included
    let response = client
        .get(format!("{}/courses?id={}", app.address, created.id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "null");

    let orphans: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM text_blocks) + (SELECT COUNT(*) FROM tests) + (SELECT COUNT(*) FROM answers)",
    )
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn test_invalid_course_is_rejected_and_not_stored() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/courses", app.address))
        .json(&json!({
            "theme": "x",
            "readingTime": "1",
            "hasTests": true,
            "textBlocks": [{ "name": "a", "text": "b" }],
            "tests": [{ "question": "q", "answers": [
                { "text": "a", "right": true },
                { "text": "b", "right": true }
            ]}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["issues"][0]["path"], json!(["tests", "0", "answers"]));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_admin_session_flow() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Seed one course so /admin/data has something to list.
    client
        .post(format!("{}/courses", app.address))
        .json(&json!({
            "theme": "intro",
            "readingTime": "5",
            "hasTests": false,
            "textBlocks": [{ "name": "intro", "text": "hello" }]
        }))
        .send()
        .await
        .unwrap();

    let (access, _refresh) = login(&app, &client).await;

    let data: Vec<Course> = client
        .get(format!("{}/admin/data", app.address))
        .header(header::COOKIE, format!("access-token={access}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].theme, "intro");

    let me: UserProfile = client
        .get(format!("{}/admin/user", app.address))
        .header(header::COOKIE, format!("access-token={access}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me.username, ADMIN_USER);
}

#[tokio::test]
async fn test_admin_routes_require_cookies() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    for path in ["/admin/data", "/admin/user"] {
        let response = client
            .get(format!("{}{}", app.address, path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
async fn test_wrong_password_sets_no_cookies() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/admin/login", app.address))
        .json(&json!({ "username": ADMIN_USER, "password": "wrong" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(cookies_of(&response).is_empty());
}

#[tokio::test]
async fn test_expired_access_is_renewed_from_refresh_cookie() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (_access, refresh) = login(&app, &client).await;

    let now = chrono::Utc::now().timestamp();
    let stale_access = encode(
        &Header::default(),
        &Claims {
            sub: 1,
            kind: TokenKind::Access,
            iat: now - 3600,
            exp: now - 600,
        },
        &EncodingKey::from_secret(app.jwt_secret.as_bytes()),
    )
    .unwrap();

    let response = client
        .get(format!("{}/admin/user", app.address))
        .header(
            header::COOKIE,
            format!("access-token={stale_access}; refresh-token={refresh}"),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let renewed = cookie_value(&response, "access-token").expect("renewed access cookie");
    assert_ne!(renewed, stale_access);
    // The refresh token is not rotated.
    assert!(cookie_value(&response, "refresh-token").is_none());
}

#[tokio::test]
async fn test_refresh_endpoint() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/admin/refresh", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (_access, refresh) = login(&app, &client).await;

    let response = client
        .post(format!("{}/admin/refresh", app.address))
        .header(header::COOKIE, format!("refresh-token={refresh}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let access = cookie_value(&response, "access-token").expect("new access cookie");

    let response = client
        .get(format!("{}/admin/user", app.address))
        .header(header::COOKIE, format!("access-token={access}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
