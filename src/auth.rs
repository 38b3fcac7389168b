use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::Cookie;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{error::ApiError, models::UserProfile, repository::RepositoryState};

/// Cookie carrying the short-lived access token.
pub const ACCESS_COOKIE: &str = "access-token";
/// Cookie carrying the long-lived refresh token.
pub const REFRESH_COOKIE: &str = "refresh-token";

/// Access tokens live for one minute.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 60;
/// Refresh tokens live for one hour.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 60 * 60;

/// TokenKind
///
/// Which slot a token was minted for. Verification rejects a token presented
/// in the other slot, so an access token can never stand in for a refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn ttl_secs(self) -> i64 {
        match self {
            TokenKind::Access => ACCESS_TOKEN_TTL_SECS,
            TokenKind::Refresh => REFRESH_TOKEN_TTL_SECS,
        }
    }

    pub fn cookie_name(self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_COOKIE,
            TokenKind::Refresh => REFRESH_COOKIE,
        }
    }
}

/// Claims
///
/// The JWT payload shared by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the id of the admin user.
    pub sub: i64,
    pub kind: TokenKind,
    /// Issued At (iat), seconds since the epoch.
    pub iat: i64,
    /// Expiration Time (exp), seconds since the epoch. Validated with zero leeway.
    pub exp: i64,
}

/// IssuedToken
///
/// A freshly signed token plus what is needed to deliver it as a cookie.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub kind: TokenKind,
    pub value: String,
    pub expires_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing secret is empty")]
    MissingSecret,
    #[error("token kind mismatch: expected {expected:?}")]
    WrongKind { expected: TokenKind },
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// TokenIssuer
///
/// Signs and verifies HS256 tokens with the configured secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn issue(&self, user_id: i64, kind: TokenKind) -> Result<IssuedToken, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            kind,
            iat: now,
            exp: now + kind.ttl_secs(),
        };
        let value = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken {
            kind,
            value,
            expires_at: claims.exp,
        })
    }

    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.kind != expected {
            return Err(TokenError::WrongKind { expected });
        }
        Ok(claims)
    }
}

/// token_cookie
///
/// Wraps a token in an http-only cookie whose lifetime matches the token's.
pub fn token_cookie(token: &IssuedToken) -> Cookie<'static> {
    let ttl = Duration::seconds(token.kind.ttl_secs());
    Cookie::build((token.kind.cookie_name(), token.value.clone()))
        .path("/")
        .http_only(true)
        .max_age(ttl)
        .expires(OffsetDateTime::now_utc() + ttl)
        .build()
}

/// hash_password
///
/// Argon2id with a random salt, encoded as a PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// verify_password
///
/// A hash that does not parse never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// AuthUser
///
/// The principal of an admin request. The auth gate middleware resolves it from
/// the cookies and stores it in the request extensions; handlers behind the gate
/// take it as an argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
    }
}

/// LoginOutcome
pub struct LoginOutcome {
    pub user: UserProfile,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// AuthOutcome
///
/// Result of the admin gate. `refreshed_access` is set when the access token was
/// missing or invalid and a new one was minted from the refresh token; the caller
/// must deliver it as the new `access-token` cookie.
pub struct AuthOutcome {
    pub user: AuthUser,
    pub refreshed_access: Option<IssuedToken>,
}

/// AuthService
///
/// Login, the access/refresh gate, and principal lookup.
///
/// Per request the gate moves through these states:
/// - valid access token: authenticated as-is;
/// - access token missing or invalid, refresh token valid: a new access token is
///   minted and the request proceeds (the refresh token itself is not rotated);
/// - otherwise: rejected with 401 before the protected handler runs.
#[derive(Clone)]
pub struct AuthService {
    repo: RepositoryState,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(repo: RepositoryState, tokens: TokenIssuer) -> Self {
        Self { repo, tokens }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// login
    ///
    /// Unknown user and wrong password are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        let Some(user) = self.repo.get_user_by_username(username).await? else {
            tracing::warn!(username, "login rejected: unknown user");
            return Err(ApiError::InvalidCredentials);
        };

        // Argon2 is deliberately slow; keep it off the async workers.
        let password = password.to_string();
        let hash = user.hashed_password.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| ApiError::Internal(format!("password check failed: {e}")))?;

        if !matches {
            tracing::warn!(username, "login rejected: wrong password");
            return Err(ApiError::InvalidCredentials);
        }

        let access = self.mint(user.id, TokenKind::Access)?;
        let refresh = self.mint(user.id, TokenKind::Refresh)?;
        tracing::info!(user_id = user.id, "admin logged in");

        Ok(LoginOutcome {
            user: user.into(),
            access,
            refresh,
        })
    }

    /// authenticate
    ///
    /// The admin gate. Tries the access token first and falls back to the refresh token.
    pub async fn authenticate(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<AuthOutcome, ApiError> {
        if let Some(claims) = access_token.and_then(|t| self.tokens.verify(t, TokenKind::Access).ok()) {
            return Ok(AuthOutcome {
                user: AuthUser { id: claims.sub },
                refreshed_access: None,
            });
        }

        let (user, access) = self.refresh(refresh_token).await?;
        tracing::debug!(user_id = user.id, "access token re-issued from refresh token");
        Ok(AuthOutcome {
            user,
            refreshed_access: Some(access),
        })
    }

    /// refresh
    ///
    /// Verifies the refresh token and mints a new access token for the same user.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<(AuthUser, IssuedToken), ApiError> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("no valid access or refresh token".to_string()))?;

        let claims = self.tokens.verify(token, TokenKind::Refresh).map_err(|e| {
            tracing::debug!(error = %e, "refresh token rejected");
            ApiError::Unauthorized("invalid refresh token".to_string())
        })?;

        let access = self.mint(claims.sub, TokenKind::Access)?;
        Ok((AuthUser { id: claims.sub }, access))
    }

    /// profile
    ///
    /// Resolves the principal to its stored account.
    pub async fn profile(&self, user: &AuthUser) -> Result<UserProfile, ApiError> {
        self.repo
            .get_user(user.id)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| ApiError::NotFound(format!("user {} not found", user.id)))
    }

    /// ensure_admin
    ///
    /// Creates the account if no user with that name exists. Returns whether a
    /// user was created; an existing account is left untouched.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> Result<bool, ApiError> {
        if self.repo.get_user_by_username(username).await?.is_some() {
            return Ok(false);
        }
        let hash = hash_password(password)
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;
        let user = self.repo.create_user(username, &hash).await?;
        tracing::info!(user_id = user.id, username, "admin account created");
        Ok(true)
    }

    fn mint(&self, user_id: i64, kind: TokenKind) -> Result<IssuedToken, ApiError> {
        self.tokens
            .issue(user_id, kind)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }
}
