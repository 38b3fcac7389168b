use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Application Schemas (Mapped to Database) ---

/// Course
///
/// A single row of the `courses` table. This is the root of the course aggregate:
/// text blocks and tests reference it through their `course_id` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Course {
    pub id: i64,
    pub theme: String,
    pub reading_time: String,
    // When true the course carries at least one test, otherwise none.
    pub has_tests: bool,
}

/// TextBlock
///
/// A named chunk of reading material. Exclusively owned by one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TextBlock {
    pub id: i64,
    pub course_id: i64,
    pub name: String,
    pub text: String,
}

/// Test
///
/// A quiz question attached to a course. Its answers live in the `answers` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Test {
    pub id: i64,
    pub course_id: i64,
    pub question: String,
}

/// Answer
///
/// One possible answer of a test. Exactly one answer per test is marked `right`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Answer {
    pub id: i64,
    pub test_id: i64,
    pub text: String,
    pub right: bool,
}

/// User
///
/// An admin account from the `users` table. Only used for the admin login flow.
///
/// The password hash is never serialized: responses go through `UserProfile`.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Maps SQL column "password" to the Argon2 PHC string it actually stores.
    #[sqlx(rename = "password")]
    pub hashed_password: String,
}

// --- Hydrated Read Models (Output Schemas) ---

/// TestDetails
///
/// A test together with all of its answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TestDetails {
    pub id: i64,
    pub course_id: i64,
    pub question: String,
    pub answers: Vec<Answer>,
}

impl TestDetails {
    pub fn new(test: Test, answers: Vec<Answer>) -> Self {
        Self {
            id: test.id,
            course_id: test.course_id,
            question: test.question,
            answers,
        }
    }
}

/// CourseDetails
///
/// The fully hydrated course aggregate returned by `GET /courses` and `POST /courses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CourseDetails {
    pub id: i64,
    pub theme: String,
    pub reading_time: String,
    pub has_tests: bool,
    pub text_blocks: Vec<TextBlock>,
    pub tests: Vec<TestDetails>,
}

impl CourseDetails {
    pub fn new(course: Course, text_blocks: Vec<TextBlock>, tests: Vec<TestDetails>) -> Self {
        Self {
            id: course.id,
            theme: course.theme,
            reading_time: course.reading_time,
            has_tests: course.has_tests,
            text_blocks,
            tests,
        }
    }
}

/// UserProfile
///
/// The public view of an admin account, returned by login and `GET /admin/user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// NewTextBlock
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NewTextBlock {
    #[schema(example = "intro")]
    pub name: String,
    #[schema(example = "hello")]
    pub text: String,
}

/// NewAnswer
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NewAnswer {
    pub text: String,
    pub right: bool,
}

/// NewTest
///
/// A test to be created together with its course. Needs at least one answer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NewTest {
    pub question: String,
    pub answers: Vec<NewAnswer>,
}

/// CreateCourseRequest
///
/// Input payload for `POST /courses`. The whole aggregate (course, text blocks,
/// tests, answers) is submitted at once and persisted in a single transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCourseRequest {
    #[schema(example = "Ownership and borrowing")]
    pub theme: String,
    #[schema(example = "10 min")]
    pub reading_time: String,
    pub has_tests: bool,
    pub text_blocks: Vec<NewTextBlock>,
    #[serde(default)]
    pub tests: Option<Vec<NewTest>>,
}

/// CourseFilter
///
/// Already-parsed filters for the course listing. `theme` and `reading_time` are
/// case-insensitive substring matches, `has_tests` is exact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseFilter {
    pub theme: Option<String>,
    pub reading_time: Option<String>,
    pub has_tests: Option<bool>,
}

/// LoginRequest
///
/// Input payload for `POST /admin/login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub username: String,
    pub password: String,
}
