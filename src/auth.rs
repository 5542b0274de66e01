use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, BootstrapAdmin},
    error::{AppError, AuthError},
    models::{AdminUser, NewAdminUser},
    repository::RepositoryState,
};

// --- Tokens ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// The signed payload of both access and refresh tokens. Carries no role claims;
/// authorization re-reads the account on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the administrator's id.
    pub sub: i64,
    /// Issued At (iat).
    pub iat: usize,
    /// Expiration Time (exp). Validated on every decode.
    pub exp: usize,
    /// Unique token id.
    pub jti: String,
    /// Distinguishes access from refresh tokens so one cannot stand in for the other.
    pub typ: TokenKind,
}

/// TokenIssuer
///
/// Holds the HS256 keys and lifetimes. Built once from `AppConfig` at startup and
/// shared through the application state.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, config.access_ttl_secs, config.refresh_ttl_secs)
    }

    pub fn issue(&self, admin_id: i64, kind: TokenKind) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            sub: admin_id,
            iat: now as usize,
            exp: (now + ttl) as usize,
            jti: Uuid::new_v4().to_string(),
            typ: kind,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Unexpected(format!("failed to sign token: {e}")))
    }

    /// verify
    ///
    /// Checks signature, expiry, and token kind. Expiry is reported separately so
    /// clients know a refresh will help.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid,
        })?;

        if data.claims.typ != expected {
            return Err(AuthError::Invalid);
        }
        Ok(data.claims)
    }
}

// --- Passwords ---

/// Hashes a plaintext password with Argon2id and a fresh random salt (PHC string).
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Unexpected(format!("failed to hash password: {e}")))
}

/// Constant-time check of a plaintext password against a stored PHC string.
/// A malformed stored hash verifies as `false`.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// bootstrap_admin
///
/// Creates the first administrator (role `superadmin`) when the credential store is
/// empty. Returns `None` when accounts already exist, leaving them untouched.
pub async fn bootstrap_admin(
    repo: &RepositoryState,
    credentials: &BootstrapAdmin,
) -> Result<Option<AdminUser>, AppError> {
    if repo.count_admins().await? > 0 {
        return Ok(None);
    }
    let admin = repo
        .create_admin(NewAdminUser {
            username: credentials.username.clone(),
            email: credentials.email.clone(),
            password_hash: hash_password(&credentials.password)?,
            full_name: Some("Administrator".to_string()),
            role: "superadmin".to_string(),
        })
        .await?;
    Ok(Some(admin))
}

// --- Extractors ---

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Missing)
}

/// Verified claims of an access token. Does not touch the database.
#[derive(Debug, Clone)]
pub struct AccessClaims(pub Claims);

/// Verified claims of a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshClaims(pub Claims);

impl<S> FromRequestParts<S> for AccessClaims
where
    S: Send + Sync,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = TokenIssuer::from_ref(state);
        let claims = issuer.verify(bearer_token(parts)?, TokenKind::Access)?;
        Ok(AccessClaims(claims))
    }
}

impl<S> FromRequestParts<S> for RefreshClaims
where
    S: Send + Sync,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = TokenIssuer::from_ref(state);
        let claims = issuer.verify(bearer_token(parts)?, TokenKind::Refresh)?;
        Ok(RefreshClaims(claims))
    }
}

/// AuthAdmin
///
/// The resolved, currently active administrator behind a request.
///
/// Resolution:
/// 1. Reuse the identity already placed in the request extensions by the admin
///    route-group middleware, if any.
/// 2. Verify the bearer access token (401 with `token_expired` / `invalid_token` /
///    `authorization_required` on failure).
/// 3. Load the account. A deleted or deactivated account is refused with 403
///    `admin_access_required`, even though its token is still cryptographically valid.
#[derive(Debug, Clone)]
pub struct AuthAdmin(pub AdminUser);

impl<S> FromRequestParts<S> for AuthAdmin
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(admin) = parts.extensions.get::<AuthAdmin>() {
            return Ok(admin.clone());
        }

        let AccessClaims(claims) = AccessClaims::from_request_parts(parts, state).await?;
        let repo = RepositoryState::from_ref(state);

        match repo.get_admin(claims.sub).await? {
            Some(admin) if admin.is_active => Ok(AuthAdmin(admin)),
            _ => {
                tracing::warn!(admin_id = claims.sub, "token for missing or inactive admin refused");
                Err(AppError::Forbidden)
            }
        }
    }
}
