use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// immutable afterwards; handlers reach it through the shared state via FromRef.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // SQLite connection string, e.g. `sqlite://data.db`.
    pub db_url: String,
    // Runtime environment marker. Selects the log format and which settings are mandatory.
    pub env: Env,
    // Secret used to sign and verify access and refresh tokens.
    pub jwt_secret: String,
    // Browser origin allowed to call the API with credentials (cookies).
    pub cors_origin: Option<String>,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // Optional admin account created at startup if it does not exist yet.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

/// Env
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Non-panicking configuration for tests: in-memory database, fixed secret.
    fn default() -> Self {
        Self {
            db_url: "sqlite::memory:".to_string(),
            env: Env::Local,
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            cors_origin: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            admin_username: None,
            admin_password: None,
        }
    }
}

/// Reads a variable, treating an empty value the same as an unset one.
fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the environment and fails fast.
    ///
    /// # Panics
    /// Panics if `JWT_SECRET` is missing (in any environment), or if
    /// `DATABASE_URL` is missing in production.
    pub fn load() -> Self {
        let env = match optional_var("APP_ENV").as_deref() {
            Some("production") => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = optional_var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set.");

        let db_url = match env {
            Env::Production => {
                optional_var("DATABASE_URL").expect("FATAL: DATABASE_URL required in production")
            }
            Env::Local => optional_var("DATABASE_URL").unwrap_or_else(|| "sqlite://data.db".to_string()),
        };

        Self {
            db_url,
            env,
            jwt_secret,
            cors_origin: optional_var("CORS_ORIGIN_URL"),
            bind_addr: optional_var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            admin_username: optional_var("ADMIN_USERNAME"),
            admin_password: optional_var("ADMIN_PASSWORD"),
        }
    }

    /// The bootstrap admin credentials, when both halves are configured.
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (&self.admin_username, &self.admin_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}
