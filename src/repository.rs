use crate::models::{
    Answer, Course, CourseDetails, CourseFilter, CreateCourseRequest, Test, TestDetails,
    TextBlock, User,
};
use async_trait::async_trait;
use sqlx::{
    QueryBuilder, Sqlite, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{collections::HashMap, str::FromStr, sync::Arc};
use tokio::sync::Mutex;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations. Handlers and
/// services only ever see `Arc<dyn Repository>`, so tests can swap the SQLite
/// implementation for an in-memory database or a mock.
///
/// Every multi-statement write runs in a single transaction inside the
/// implementation: callers never observe a half-written or half-deleted aggregate.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Course Aggregate ---
    // Inserts the course, its text blocks, tests and answers atomically.
    // The request is expected to be validated already.
    async fn create_course(&self, req: &CreateCourseRequest) -> Result<CourseDetails, sqlx::Error>;
    // Fully hydrated lookup. `Ok(None)` when the id does not exist.
    async fn get_course(&self, id: i64) -> Result<Option<CourseDetails>, sqlx::Error>;
    // Fully hydrated listing, insertion order.
    async fn find_courses(&self, filter: &CourseFilter) -> Result<Vec<CourseDetails>, sqlx::Error>;
    // Bare course rows, no children.
    async fn list_courses(&self) -> Result<Vec<Course>, sqlx::Error>;
    // Cascading delete: answers, tests, text blocks, then the course.
    // Deleting an unknown id is a successful no-op.
    async fn delete_course(&self, id: i64) -> Result<(), sqlx::Error>;

    // --- Users ---
    async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error>;
    async fn create_user(&self, username: &str, hashed_password: &str) -> Result<User, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// connect
///
/// Opens a SQLite pool for `db_url`, creating the database file if needed.
/// WAL mode lets readers proceed while a course transaction is writing.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// migrate
///
/// Applies the embedded migrations from `./migrations`.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// SqliteRepository
///
/// The concrete implementation of the `Repository` trait, backed by SQLite.
pub struct SqliteRepository {
    pool: SqlitePool,
    // SQLite admits a single writer. Write transactions take this guard so a
    // deferred transaction never loses its read-to-write upgrade to a peer.
    write_guard: Mutex<()>,
}

impl SqliteRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_guard: Mutex::new(()),
        }
    }
}

const COURSE_COLUMNS: &str = "SELECT id, theme, reading_time, has_tests FROM courses";

// Ids bound per `IN (...)` query. SQLite caps bound parameters per statement
// (32766 on current builds, 999 on older ones).
const ID_CHUNK: usize = 500;

/// Appends `(?, ?, ...)` binding every id, for `IN` clauses.
fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// Runs `select ... IN (ids) ORDER BY id` once per chunk of `ids`.
/// `ids` must be ascending so the concatenated rows stay in id order.
async fn fetch_by_ids<T>(
    conn: &mut SqliteConnection,
    select: &str,
    ids: &[i64],
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
{
    let mut rows = Vec::new();
    for chunk in ids.chunks(ID_CHUNK) {
        let mut builder = QueryBuilder::<Sqlite>::new(select);
        push_id_list(&mut builder, chunk);
        builder.push(" ORDER BY id");
        rows.extend(builder.build_query_as::<T>().fetch_all(&mut *conn).await?);
    }
    Ok(rows)
}

/// Unicode-aware, case-insensitive substring test. SQLite's own `LIKE` and
/// `lower()` only fold ASCII, so text filters are applied here.
fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// hydrate
///
/// Loads text blocks, tests and answers for `courses` in batched `IN` queries
/// (chunked by `ID_CHUNK`) and stitches them back onto their parents. Order
/// follows ascending ids.
async fn hydrate(
    conn: &mut SqliteConnection,
    courses: Vec<Course>,
) -> Result<Vec<CourseDetails>, sqlx::Error> {
    if courses.is_empty() {
        return Ok(vec![]);
    }
    let course_ids: Vec<i64> = courses.iter().map(|c| c.id).collect();

    let blocks: Vec<TextBlock> = fetch_by_ids(
        conn,
        "SELECT id, course_id, name, text FROM text_blocks WHERE course_id IN ",
        &course_ids,
    )
    .await?;
    let tests: Vec<Test> = fetch_by_ids(
        conn,
        "SELECT id, course_id, question FROM tests WHERE course_id IN ",
        &course_ids,
    )
    .await?;

    let test_ids: Vec<i64> = tests.iter().map(|t| t.id).collect();
    let answers: Vec<Answer> = fetch_by_ids(
        conn,
        r#"SELECT id, test_id, text, "right" FROM answers WHERE test_id IN "#,
        &test_ids,
    )
    .await?;

    let mut answers_by_test: HashMap<i64, Vec<Answer>> = HashMap::new();
    for answer in answers {
        answers_by_test.entry(answer.test_id).or_default().push(answer);
    }

    let mut tests_by_course: HashMap<i64, Vec<TestDetails>> = HashMap::new();
    for test in tests {
        let answers = answers_by_test.remove(&test.id).unwrap_or_default();
        tests_by_course
            .entry(test.course_id)
            .or_default()
            .push(TestDetails::new(test, answers));
    }

    let mut blocks_by_course: HashMap<i64, Vec<TextBlock>> = HashMap::new();
    for block in blocks {
        blocks_by_course.entry(block.course_id).or_default().push(block);
    }

    Ok(courses
        .into_iter()
        .map(|course| {
            let blocks = blocks_by_course.remove(&course.id).unwrap_or_default();
            let tests = tests_by_course.remove(&course.id).unwrap_or_default();
            CourseDetails::new(course, blocks, tests)
        })
        .collect())
}

#[async_trait]
impl Repository for SqliteRepository {
    /// create_course
    ///
    /// Inserts the whole aggregate inside one transaction. If any insert fails the
    /// transaction is dropped without commit, which rolls every row back.
    async fn create_course(&self, req: &CreateCourseRequest) -> Result<CourseDetails, sqlx::Error> {
        let _writer = self.write_guard.lock().await;
        let mut tx = self.pool.begin().await?;

        let course_id = sqlx::query("INSERT INTO courses (theme, reading_time, has_tests) VALUES (?, ?, ?)")
            .bind(&req.theme)
            .bind(&req.reading_time)
            .bind(req.has_tests)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        let mut text_blocks = Vec::with_capacity(req.text_blocks.len());
        for block in &req.text_blocks {
            let id = sqlx::query("INSERT INTO text_blocks (course_id, name, text) VALUES (?, ?, ?)")
                .bind(course_id)
                .bind(&block.name)
                .bind(&block.text)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
            text_blocks.push(TextBlock {
                id,
                course_id,
                name: block.name.clone(),
                text: block.text.clone(),
            });
        }

        let mut tests = Vec::new();
        for test in req.tests.iter().flatten() {
            let test_id = sqlx::query("INSERT INTO tests (course_id, question) VALUES (?, ?)")
                .bind(course_id)
                .bind(&test.question)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

            let mut answers = Vec::with_capacity(test.answers.len());
            for answer in &test.answers {
                let id = sqlx::query(r#"INSERT INTO answers (test_id, text, "right") VALUES (?, ?, ?)"#)
                    .bind(test_id)
                    .bind(&answer.text)
                    .bind(answer.right)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
                answers.push(Answer {
                    id,
                    test_id,
                    text: answer.text.clone(),
                    right: answer.right,
                });
            }

            tests.push(TestDetails {
                id: test_id,
                course_id,
                question: test.question.clone(),
                answers,
            });
        }

        tx.commit().await?;

        tracing::debug!(course_id, text_blocks = text_blocks.len(), tests = tests.len(), "course aggregate created");

        Ok(CourseDetails {
            id: course_id,
            theme: req.theme.clone(),
            reading_time: req.reading_time.clone(),
            has_tests: req.has_tests,
            text_blocks,
            tests,
        })
    }

    /// get_course
    ///
    /// Reads the course and its children inside one read transaction so the
    /// aggregate is a consistent snapshot.
    async fn get_course(&self, id: i64) -> Result<Option<CourseDetails>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let course = sqlx::query_as::<_, Course>(&format!("{COURSE_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(course) = course else {
            return Ok(None);
        };

        let mut hydrated = hydrate(&mut *tx, vec![course]).await?;
        tx.commit().await?;
        Ok(hydrated.pop())
    }

    /// find_courses
    ///
    /// `has_tests` is matched in SQL; the text filters are case-folded
    /// substring matches applied to the fetched rows.
    async fn find_courses(&self, filter: &CourseFilter) -> Result<Vec<CourseDetails>, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(COURSE_COLUMNS);
        if let Some(has_tests) = filter.has_tests {
            builder.push(" WHERE has_tests = ");
            builder.push_bind(has_tests);
        }
        builder.push(" ORDER BY id");

        let mut tx = self.pool.begin().await?;
        let courses: Vec<Course> = builder
            .build_query_as::<Course>()
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .filter(|course| {
                filter.theme.as_deref().is_none_or(|t| contains_folded(&course.theme, t))
                    && filter
                        .reading_time
                        .as_deref()
                        .is_none_or(|r| contains_folded(&course.reading_time, r))
            })
            .collect();
        let hydrated = hydrate(&mut *tx, courses).await?;
        tx.commit().await?;
        Ok(hydrated)
    }

    async fn list_courses(&self) -> Result<Vec<Course>, sqlx::Error> {
        sqlx::query_as::<_, Course>(&format!("{COURSE_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await
    }

    /// delete_course
    ///
    /// Children go before parents: answers of the course's tests, the tests, the
    /// text blocks, and finally the course row. All inside one transaction.
    /// The answers step selects its tests by subquery, so no id list is bound.
    async fn delete_course(&self, id: i64) -> Result<(), sqlx::Error> {
        let _writer = self.write_guard.lock().await;
        let mut tx = self.pool.begin().await?;

        let tests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tests WHERE course_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        if tests > 0 {
            sqlx::query("DELETE FROM answers WHERE test_id IN (SELECT id FROM tests WHERE course_id = ?)")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM tests WHERE course_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM text_blocks WHERE course_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::debug!(course_id = id, removed, tests, "course delete committed");
        Ok(())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, password FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_user(&self, username: &str, hashed_password: &str) -> Result<User, sqlx::Error> {
        let _writer = self.write_guard.lock().await;
        let id = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(hashed_password)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(User {
            id,
            username: username.to_string(),
            hashed_password: hashed_password.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::contains_folded;

    #[test]
    fn text_filter_folds_unicode_case() {
        assert!(contains_folded("Rust Basics", "rust"));
        assert!(contains_folded("Курс по Rust", "курс"));
        assert!(contains_folded("Émile", "émile"));
        assert!(contains_folded("100% safe", "%"));
        assert!(!contains_folded("plain", "%"));
        assert!(!contains_folded("a_b", "ab"));
    }
}
