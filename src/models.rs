//! Domain models, DTOs, and error/response types for the bcard API.
//! Validation is explicit: each request type exposes a `validate` method that
//! collects field-level violations instead of relying on the storage layer.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stock photo used when a card is created without one.
pub const DEFAULT_COMPANY_PHOTO: &str =
    "https://cdn.pixabay.com/photo/2015/10/05/22/37/blank-profile-picture-973460_960_720.png";

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?(\d{1,2})?[\s.-]?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}$").expect("valid phone pattern")
});

/// Core user domain model as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// bcrypt hash; never serialized to clients (responses use [`UserResponse`]).
    pub password_hash: String,
    /// Business-account flag; carried into issued tokens.
    pub biz: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A company profile record owned by a user. Ownership is informational in
/// storage (no foreign-key constraint); handlers enforce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub company_name: String,
    pub company_description: Option<String>,
    pub company_address: Option<String>,
    pub company_phone: Option<String>,
    pub company_photo: String,
    /// Random six-digit number with a uniqueness constraint; collisions are
    /// surfaced as Conflict, not retried.
    pub card_number: i32,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

/// Collected validation failures for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl Violations {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(Violation { field: field.to_string(), message: message.into() });
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut v = Self::default();
        v.push(field, message);
        v
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ok when no violations were collected, otherwise a Validation error.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", joined)
    }
}

fn check_email(email: &str, out: &mut Violations) {
    let has_at = email.contains('@');
    let has_dot = email.contains('.');
    let ok_len = email.len() <= 254 && email.len() >= 3;
    if !(has_at && has_dot && ok_len) {
        out.push("email", "invalid email format");
    }
}

fn check_password_policy(password: &str, out: &mut Violations) {
    if password.len() < 8 {
        out.push("password", "password too short (min 8)");
        return;
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        out.push("password", "password must include at least one letter and one number");
    }
}

fn check_user_name(name: &str, out: &mut Violations) {
    if name.len() < 2 || name.len() > 100 {
        out.push("name", "name must be between 2 and 100 characters");
    }
}

/// Application-wide error taxonomy; every variant maps to exactly one status
/// code and a client-safe message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(Violations),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message sent to clients. Internal details stay in the logs.
    fn client_message(&self) -> String {
        match self {
            AppError::Validation(v) => v.to_string(),
            AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m) => m.clone(),
            AppError::Internal(_) => "internal error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!(%detail, "request failed");
        }
        let status = self.status_code();
        let body = match &self {
            AppError::Validation(v) => serde_json::json!({
                "status": "fail",
                "message": self.client_message(),
                "data": v.0,
            }),
            _ => serde_json::json!({
                "status": "fail",
                "message": self.client_message(),
            }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(e.to_string())
    }
}

/// Response envelope used by every route: `{status, data?, results?, message?}`.
/// Absent fields are omitted from the JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self { status: "success", data: Some(data), results: None, message: None }
    }
}

impl<T: Serialize> Envelope<Vec<T>> {
    /// Success envelope for list endpoints; `results` mirrors the item count.
    pub fn list(items: Vec<T>) -> Self {
        let results = items.len();
        Self { status: "success", data: Some(items), results: Some(results), message: None }
    }
}

impl Envelope<()> {
    pub fn msg(message: impl Into<String>) -> Self {
        Self { status: "success", data: None, results: None, message: Some(message.into()) }
    }

    pub fn with_results(mut self, results: usize) -> Self {
        self.results = Some(results);
        self
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, axum::Json(self)).into_response()
    }
}

// --- Requests and responses ---

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
    #[serde(default)]
    pub biz: bool,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut v = Violations::default();
        check_user_name(&self.name, &mut v);
        check_email(&self.email, &mut v);
        check_password_policy(&self.password, &mut v);
        if self.password != self.confirm_password {
            v.push("confirmPassword", "passwords do not match");
        }
        v.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut v = Violations::default();
        if self.email.trim().is_empty() {
            v.push("email", "email is required");
        }
        if self.password.is_empty() {
            v.push("password", "password is required");
        }
        v.into_result()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub biz: Option<bool>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut v = Violations::default();
        if let Some(name) = &self.name {
            check_user_name(name, &mut v);
        }
        if let Some(email) = &self.email {
            check_email(email, &mut v);
        }
        v.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

impl ResetPasswordRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut v = Violations::default();
        check_password_policy(&self.password, &mut v);
        if self.password != self.confirm_password {
            v.push("confirmPassword", "passwords do not match");
        }
        v.into_result()
    }
}

/// User record as exposed to clients; the password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub biz: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self { id: u.id, name: u.name, email: u.email, biz: u.biz, created_at: u.created_at }
    }
}

/// Client-supplied card fields, used for both create and full update. Any
/// `user_id` in the request body is ignored; ownership always comes from the
/// session principal.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDraft {
    pub company_name: String,
    pub company_description: Option<String>,
    pub company_address: Option<String>,
    pub company_phone: Option<String>,
    pub company_photo: Option<String>,
}

impl CardDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut v = Violations::default();
        if self.company_name.len() < 2 || self.company_name.len() > 30 {
            v.push("company_name", "name must be between 2 and 30 characters");
        }
        if let Some(desc) = &self.company_description {
            if desc.len() > 3000 {
                v.push("company_description", "max 3000 characters allowed");
            }
        }
        if let Some(addr) = &self.company_address {
            if addr.len() > 250 {
                v.push("company_address", "max 250 characters allowed");
            }
        }
        if let Some(phone) = &self.company_phone {
            if phone.len() < 6 || phone.len() > 250 || !PHONE_RE.is_match(phone) {
                v.push("company_phone", "enter a valid phone number");
            }
        }
        v.into_result()
    }
}

/// Bundled reseed fixture: `{"cards": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedFile {
    pub cards: Vec<CardSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardSeed {
    pub company_name: String,
    pub company_description: Option<String>,
    pub company_address: Option<String>,
    pub company_phone: Option<String>,
    pub company_photo: Option<String>,
    pub card_number: Option<i32>,
    pub user_id: Option<Uuid>,
}

impl CardSeed {
    pub fn into_card(self) -> Card {
        Card {
            id: Uuid::new_v4(),
            company_name: self.company_name,
            company_description: self.company_description,
            company_address: self.company_address,
            company_phone: self.company_phone,
            company_photo: photo_or_default(self.company_photo),
            card_number: self.card_number.unwrap_or_else(generate_card_number),
            user_id: self.user_id,
            created_at: now(),
        }
    }
}

/// Random six-digit card number; uniqueness is the storage layer's concern.
pub fn generate_card_number() -> i32 {
    rand::thread_rng().gen_range(100_000..=999_999)
}

pub fn photo_or_default(photo: Option<String>) -> String {
    photo
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_COMPANY_PHOTO.to_string())
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> CardDraft {
        CardDraft {
            company_name: name.to_string(),
            company_description: None,
            company_address: None,
            company_phone: None,
            company_photo: None,
        }
    }

    #[test]
    fn register_validation_collects_all_violations() {
        let req = RegisterRequest {
            name: "x".into(),
            email: "invalid".into(),
            password: "short".into(),
            confirm_password: "other".into(),
            biz: false,
        };
        let err = req.validate().unwrap_err();
        match err {
            AppError::Validation(v) => {
                let fields: Vec<&str> = v.0.iter().map(|x| x.field.as_str()).collect();
                assert!(fields.contains(&"name"));
                assert!(fields.contains(&"email"));
                assert!(fields.contains(&"password"));
                assert!(fields.contains(&"confirmPassword"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn register_validation_accepts_good_input() {
        let req = RegisterRequest {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            password: "Password1".into(),
            confirm_password: "Password1".into(),
            biz: true,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn card_name_bounds_enforced() {
        assert!(draft("a").validate().is_err());
        assert!(draft("ab").validate().is_ok());
        assert!(draft(&"x".repeat(31)).validate().is_err());
    }

    #[test]
    fn card_phone_pattern_enforced() {
        let mut d = draft("Acme");
        d.company_phone = Some("+1 (212) 555-0134".into());
        assert!(d.validate().is_ok());
        d.company_phone = Some("212-555-0134".into());
        assert!(d.validate().is_ok());
        d.company_phone = Some("not a phone".into());
        assert!(d.validate().is_err());
        d.company_phone = Some("12345".into());
        assert!(d.validate().is_err());
    }

    #[test]
    fn card_description_limit_enforced() {
        let mut d = draft("Acme");
        d.company_description = Some("x".repeat(3001));
        assert!(d.validate().is_err());
    }

    #[test]
    fn photo_defaults_when_blank_or_absent() {
        assert_eq!(photo_or_default(None), DEFAULT_COMPANY_PHOTO);
        assert_eq!(photo_or_default(Some("  ".into())), DEFAULT_COMPANY_PHOTO);
        assert_eq!(photo_or_default(Some("https://example.com/x.png".into())), "https://example.com/x.png");
    }

    #[test]
    fn violations_display_joins_fields() {
        let mut v = Violations::default();
        v.push("email", "invalid email format");
        v.push("password", "password too short (min 8)");
        assert_eq!(
            v.to_string(),
            "email: invalid email format; password: password too short (min 8)"
        );
    }

    #[test]
    fn card_numbers_are_six_digits() {
        for _ in 0..100 {
            let n = generate_card_number();
            assert!((100_000..=999_999).contains(&n));
        }
    }
}
