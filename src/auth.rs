//! Authentication service: password hashing (bcrypt) and JWT (HS256), plus the
//! session-cookie plumbing. Hashing is CPU-bound and runs under
//! `spawn_blocking` so it never stalls the async runtime.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::http::HeaderMap;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::task;
use uuid::Uuid;

use crate::models::AppError;

/// Name of the HTTP-only session cookie.
pub const SESSION_COOKIE: &str = "jwt";
/// Fixed session-cookie lifetime.
pub const SESSION_COOKIE_DAYS: i64 = 10;

/// JWT claims payload. `sub` is the user id, `biz` the business-account flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub biz: bool,
    /// Issued at (seconds since epoch).
    pub iat: usize,
    /// Expiration (seconds since epoch).
    pub exp: usize,
}

/// The identity attached to a request after successful token validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub biz: bool,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn hash_password(&self, password: String) -> Result<String, AppError>;
    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AppError>;
    async fn generate_token(&self, user_id: Uuid, biz: bool) -> Result<String, AppError>;
    async fn validate_token(&self, token: &str) -> Result<Claims, AppError>;
    async fn principal_from_token(&self, token: &str) -> Result<Principal, AppError> {
        let claims = self.validate_token(token).await?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("invalid token subject".into()))?;
        Ok(Principal { user_id, biz: claims.biz })
    }
}

/// Concrete JWT/bcrypt implementation.
#[derive(Clone)]
pub struct JwtAuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_hours: i64,
}

impl JwtAuthService {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    fn now_secs() -> usize {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as usize
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hashed = task::spawn_blocking(move || hash(password, DEFAULT_COST))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;
        Ok(hashed)
    }

    async fn verify_password(&self, password: String, hash_value: String) -> Result<bool, AppError> {
        let ok = task::spawn_blocking(move || verify(password, &hash_value))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;
        Ok(ok)
    }

    async fn generate_token(&self, user_id: Uuid, biz: bool) -> Result<String, AppError> {
        let iat = Self::now_secs();
        let exp = (Utc::now() + Duration::hours(self.expiry_hours)).timestamp() as usize;
        let claims = Claims { sub: user_id.to_string(), biz, iat, exp };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AppError::Unauthorized("invalid or expired token".into()))?;
        Ok(data.claims)
    }
}

/// Extract the session credential: `Authorization: Bearer` first, the `jwt`
/// cookie as fallback.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|c| cookie_value(c, SESSION_COOKIE))
}

fn cookie_value(cookie_header: &str, name: &str) -> Option<String> {
    for part in cookie_header.split(';') {
        if let Some((k, v)) = part.trim().split_once('=') {
            if k.trim() == name {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

/// Session cookie set on login. HTTP-only, ten-day window.
pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax",
        SESSION_COOKIE,
        token,
        SESSION_COOKIE_DAYS * 24 * 60 * 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn token_round_trip_preserves_identity() {
        let svc = JwtAuthService::new("secret", 1);
        let uid = Uuid::new_v4();
        let token = svc.generate_token(uid, true).await.unwrap();
        let claims = svc.validate_token(&token).await.unwrap();
        assert_eq!(claims.sub, uid.to_string());
        assert!(claims.biz);
        let principal = svc.principal_from_token(&token).await.unwrap();
        assert_eq!(principal.user_id, uid);
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        // Negative expiry puts `exp` well past the validation leeway.
        let svc = JwtAuthService::new("secret", -1);
        let token = svc.generate_token(Uuid::new_v4(), false).await.unwrap();
        assert!(matches!(svc.validate_token(&token).await, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn tampered_token_rejected() {
        let svc = JwtAuthService::new("secret", 1);
        let other = JwtAuthService::new("a different secret entirely", 1);
        let token = other.generate_token(Uuid::new_v4(), false).await.unwrap();
        assert!(svc.validate_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn password_hash_verify() {
        let svc = JwtAuthService::new("secret", 1);
        let hash = svc.hash_password("Password1".into()).await.unwrap();
        assert!(svc.verify_password("Password1".into(), hash.clone()).await.unwrap());
        assert!(!svc.verify_password("Password2".into(), hash).await.unwrap());
    }

    #[test]
    fn bearer_header_preferred_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer header-token"));
        headers.insert("cookie", HeaderValue::from_static("jwt=cookie-token"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn cookie_fallback_parses_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("theme=dark; jwt=abc123; lang=en"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn session_cookie_is_http_only_with_ten_day_window() {
        let cookie = session_cookie("tok");
        assert!(cookie.starts_with("jwt=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains(&format!("Max-Age={}", 10 * 24 * 60 * 60)));
    }
}
