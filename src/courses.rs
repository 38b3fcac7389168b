use crate::{
    error::{ApiError, ValidationIssue},
    models::{Course, CourseDetails, CourseFilter, CreateCourseRequest},
    repository::RepositoryState,
};

/// CourseLookup
///
/// What a `GET /courses` request asks for: one course by id, or a filtered listing.
#[derive(Debug, Clone, PartialEq)]
pub enum CourseLookup {
    ById(i64),
    Filter(CourseFilter),
}

/// CourseLookupResult
///
/// A lookup by id yields at most one course (absence is not an error),
/// a filtered lookup yields a list.
#[derive(Debug, Clone, PartialEq)]
pub enum CourseLookupResult {
    One(Option<CourseDetails>),
    Many(Vec<CourseDetails>),
}

/// parse_course_id
///
/// Accepts only a non-empty run of ASCII digits that fits in an `i64`.
pub fn parse_course_id(raw: &str) -> Result<i64, ApiError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::InvalidInput(format!("invalid course id: {raw:?}")));
    }
    raw.parse::<i64>()
        .map_err(|_| ApiError::InvalidInput(format!("invalid course id: {raw:?}")))
}

/// parse_has_tests
pub fn parse_has_tests(raw: &str) -> Result<bool, ApiError> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ApiError::InvalidInput(format!(
            "hasTests must be \"true\" or \"false\", got {other:?}"
        ))),
    }
}

/// validate_course
///
/// Checks every aggregate rule of a create request and reports all violations
/// at once. Nothing is written unless this returns `Ok`.
pub fn validate_course(req: &CreateCourseRequest) -> Result<(), ApiError> {
    let mut issues = Vec::new();

    if req.theme.is_empty() {
        issues.push(ValidationIssue::new(["theme"], "Theme must not be empty"));
    }
    if req.reading_time.is_empty() {
        issues.push(ValidationIssue::new(["readingTime"], "Reading time must not be empty"));
    }
    if req.text_blocks.is_empty() {
        issues.push(ValidationIssue::new(["textBlocks"], "At least one text block is required"));
    }

    let tests = req.tests.as_deref().unwrap_or_default();
    if req.has_tests && tests.is_empty() {
        issues.push(ValidationIssue::new(["tests"], "Tests should be provided if hasTests is true"));
    }
    if !req.has_tests && !tests.is_empty() {
        issues.push(ValidationIssue::new(["tests"], "Tests should not be provided if hasTests is false"));
    }

    for (index, test) in tests.iter().enumerate() {
        let index = index.to_string();
        if test.answers.is_empty() {
            issues.push(ValidationIssue::new(
                ["tests", index.as_str(), "answers"],
                "At least one answer is required",
            ));
            continue;
        }
        match test.answers.iter().filter(|a| a.right).count() {
            1 => {}
            0 => issues.push(ValidationIssue::new(
                ["tests", index.as_str(), "answers"],
                "At least one answer should be marked as right",
            )),
            _ => issues.push(ValidationIssue::new(
                ["tests", index.as_str(), "answers"],
                "At most one answer should be marked as right",
            )),
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(issues))
    }
}

/// CourseService
///
/// The course aggregate service. Owns the create/read/delete rules of a course
/// and its nested text blocks, tests and answers; storage access goes through the
/// injected repository handle.
#[derive(Clone)]
pub struct CourseService {
    repo: RepositoryState,
}

impl CourseService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// create
    ///
    /// Validates the request, then persists the aggregate in one transaction.
    pub async fn create(&self, req: CreateCourseRequest) -> Result<CourseDetails, ApiError> {
        validate_course(&req)?;

        let course = self.repo.create_course(&req).await?;
        tracing::info!(course_id = course.id, theme = %course.theme, "course created");
        Ok(course)
    }

    /// get
    ///
    /// Resolves a lookup to one hydrated course (or none) or to a hydrated list.
    pub async fn get(&self, lookup: CourseLookup) -> Result<CourseLookupResult, ApiError> {
        match lookup {
            CourseLookup::ById(id) => Ok(CourseLookupResult::One(self.repo.get_course(id).await?)),
            CourseLookup::Filter(filter) => {
                Ok(CourseLookupResult::Many(self.repo.find_courses(&filter).await?))
            }
        }
    }

    /// list_summaries
    ///
    /// Bare course rows for the admin area.
    pub async fn list_summaries(&self) -> Result<Vec<Course>, ApiError> {
        Ok(self.repo.list_courses().await?)
    }

    /// delete
    ///
    /// Cascading, idempotent delete. An unknown id succeeds without touching anything.
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.repo.delete_course(id).await?;
        tracing::info!(course_id = id, "course deleted");
        Ok(())
    }
}
