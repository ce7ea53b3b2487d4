//! Password hashing, token issuing and the request extractors that guard routes.
//!
//! Access and refresh tokens are HS256 JWTs whose subject is the user id.
//! Role checks always read the user row, so a deleted or demoted account
//! loses access as soon as the change is committed.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::{User, UserType};
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

const ACCESS_DENIED: &str = "Access denied: insufficient privileges";

pub async fn hash_password(password: String) -> Result<String> {
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST)).await??;
    Ok(hash)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool> {
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(valid)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::minutes(config.access_token_minutes),
            Duration::days(config.refresh_token_days),
        )
    }

    pub fn issue(&self, user_id: i32, kind: TokenKind) -> Result<String> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Decode a token and check it is of the expected kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> ApiResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)).map_err(|e| {
            debug!("rejected token: {e}");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::unauthorized("Token has expired"),
                _ => ApiError::unauthorized("Invalid token"),
            }
        })?;

        if data.claims.kind != expected {
            return Err(match expected {
                TokenKind::Access => ApiError::unauthorized("Only access tokens are allowed"),
                TokenKind::Refresh => ApiError::unauthorized("Only refresh tokens are allowed"),
            });
        }

        Ok(data.claims)
    }
}

fn bearer_token(parts: &Parts) -> ApiResult<&str> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization Header"))?;

    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization Header"))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing 'Bearer' type in 'Authorization' header"))
}

fn authenticate(parts: &Parts, state: &AppState, kind: TokenKind) -> ApiResult<i32> {
    let token = bearer_token(parts)?;
    let claims = state.jwt.verify(token, kind)?;
    claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid token subject"))
}

/// Caller identified by a valid access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i32,
}

impl AuthUser {
    /// Load the caller's row; a token for a deleted account is rejected
    pub async fn load(&self, state: &AppState) -> ApiResult<User> {
        state
            .db
            .get_user(self.user_id)
            .await?
            .ok_or_else(|| ApiError::unauthorized(ACCESS_DENIED))
    }

    /// Load the caller and require one of the given roles
    pub async fn require(&self, state: &AppState, roles: &[UserType]) -> ApiResult<User> {
        let user = self.load(state).await?;
        ensure_role(&user, roles)?;
        Ok(user)
    }
}

pub fn ensure_role(user: &User, roles: &[UserType]) -> ApiResult<()> {
    match user.role() {
        Some(role) if roles.contains(&role) => Ok(()),
        _ => Err(ApiError::unauthorized(ACCESS_DENIED)),
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user_id = authenticate(parts, state, TokenKind::Access)?;
        Ok(AuthUser { user_id })
    }
}

/// Caller identified by a valid refresh token
#[derive(Debug, Clone, Copy)]
pub struct RefreshUser {
    pub user_id: i32,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RefreshUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user_id = authenticate(parts, state, TokenKind::Refresh)?;
        Ok(RefreshUser { user_id })
    }
}

/// Access token when one is supplied and valid, otherwise anonymous
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user = authenticate(parts, state, TokenKind::Access)
            .ok()
            .map(|user_id| AuthUser { user_id });
        Ok(MaybeAuthUser(user))
    }
}
