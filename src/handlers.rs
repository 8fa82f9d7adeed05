//! HTTP surface: application state, router wiring under `/api`, and the user
//! and card route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use futures::future::join_all;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::{
    auth::{self, AuthService, Principal},
    config::SeedConfig,
    mailer::{Email, Mailer},
    models::{
        now, photo_or_default, AppError, Card, CardDraft, Envelope, LoginRequest, RegisterRequest,
        ResetPasswordRequest, SeedFile, UpdateUserRequest, User, UserResponse, Violations,
    },
    repository::{CardRepository, UserRepository},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub cards: Arc<dyn CardRepository>,
    pub auth: Arc<dyn AuthService>,
    pub mailer: Arc<dyn Mailer>,
    pub seed: SeedConfig,
}

pub fn app(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/myUser", get(my_user))
        .route("/updateMyUser", patch(update_my_user))
        .route("/resetPassword", patch(reset_password));

    let mut card_routes = Router::new()
        .route("/", get(list_cards).post(create_card))
        .route("/mycard", get(my_cards))
        .route("/:id", get(get_card).put(update_card).delete(delete_card));
    // Destructive reseed is a development-only affordance; in production
    // config the route does not exist.
    if state.seed.enabled {
        card_routes = card_routes.route("/init", put(init_cards));
    }

    Router::new()
        .nest("/api/users", user_routes)
        .nest("/api/cards", card_routes)
        .route("/healthz", get(health))
        .with_state(state)
}

/// Session gate: extracts the bearer/cookie credential and validates it.
/// Answers only "is this a valid session"; resource ownership is checked per
/// handler.
async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Principal, AppError> {
    let token = auth::token_from_headers(headers)
        .ok_or_else(|| AppError::Unauthorized("missing session token".into()))?;
    state.auth.principal_from_token(&token).await
}

fn parse_card_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(Violations::single("id", "invalid card id")))
}

// --- User handlers ---

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let email = payload.email.to_lowercase();
    match state.users.find_by_email(&email).await {
        Ok(_) => return Err(AppError::Conflict("email already exists".into())),
        Err(AppError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }
    let password_hash = state.auth.hash_password(payload.password).await?;
    let created = now();
    let user = User {
        id: Uuid::new_v4(),
        name: payload.name,
        email,
        password_hash,
        biz: payload.biz,
        created_at: created,
        updated_at: created,
    };
    let user = state.users.create(user).await?;

    // Welcome mail is best-effort; a delivery failure must not fail registration.
    let mail = Email {
        to: user.email.clone(),
        subject: "Thank you for registering.".into(),
        body: "Here is a special discount code to help get started!".into(),
    };
    if let Err(e) = state.mailer.send(mail).await {
        tracing::warn!(error = %e, user_id = %user.id, "welcome email failed");
    }

    Ok((StatusCode::CREATED, Envelope::success(UserResponse::from(user))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user = state
        .users
        .find_by_email(&payload.email)
        .await
        .map_err(|_| AppError::Unauthorized("invalid credentials".into()))?;
    let ok = state.auth.verify_password(payload.password, user.password_hash.clone()).await?;
    if !ok {
        return Err(AppError::Unauthorized("invalid credentials".into()));
    }
    let token = state.auth.generate_token(user.id, user.biz).await?;

    let mut headers = HeaderMap::new();
    let cookie = HeaderValue::from_str(&auth::session_cookie(&token))
        .map_err(|e| AppError::Internal(e.to_string()))?;
    headers.insert(header::SET_COOKIE, cookie);

    Ok((headers, Envelope::success(serde_json::json!({ "token": token }))))
}

pub async fn my_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let principal = require_session(&state, &headers).await?;
    let user = state.users.find_by_id(principal.user_id).await?;
    Ok(Envelope::success(UserResponse::from(user)))
}

pub async fn update_my_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let principal = require_session(&state, &headers).await?;
    payload.validate()?;
    let mut user = state.users.find_by_id(principal.user_id).await?;

    if let Some(email) = payload.email {
        let email = email.to_lowercase();
        // Collision check ignores the caller's own record so re-submitting the
        // current email is a no-op, not a Conflict.
        match state.users.find_by_email(&email).await {
            Ok(existing) if existing.id != user.id => {
                return Err(AppError::Conflict("email already exists".into()))
            }
            Ok(_) | Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        user.email = email;
    }
    if let Some(name) = payload.name {
        user.name = name;
    }
    if let Some(biz) = payload.biz {
        user.biz = biz;
    }
    user.updated_at = now();
    let user = state.users.update(user).await?;
    Ok(Envelope::success(UserResponse::from(user)))
}

pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let principal = require_session(&state, &headers).await?;
    payload.validate()?;
    let mut user = state.users.find_by_id(principal.user_id).await?;

    let same = state
        .auth
        .verify_password(payload.password.clone(), user.password_hash.clone())
        .await?;
    if same {
        return Err(AppError::Validation(Violations::single(
            "password",
            "new password must differ from the current password",
        )));
    }

    user.password_hash = state.auth.hash_password(payload.password).await?;
    user.updated_at = now();
    state.users.update(user).await?;
    Ok(Envelope::msg("password updated"))
}

// --- Card handlers ---

pub async fn my_cards(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let principal = require_session(&state, &headers).await?;
    let cards = state.cards.find_by_user(principal.user_id).await?;
    Ok(Envelope::list(cards))
}

pub async fn list_cards(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_session(&state, &headers).await?;
    let cards = state.cards.list().await?;
    Ok(Envelope::list(cards))
}

pub async fn get_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    require_session(&state, &headers).await?;
    let id = parse_card_id(&raw_id)?;
    let card = state.cards.find_by_id(id).await?;
    Ok(Envelope::success(card))
}

pub async fn create_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CardDraft>,
) -> Result<impl IntoResponse, AppError> {
    let principal = require_session(&state, &headers).await?;
    payload.validate()?;
    if state.cards.find_by_company_name(&payload.company_name).await?.is_some() {
        return Err(AppError::Conflict("company already exists".into()));
    }
    let card = Card {
        id: Uuid::new_v4(),
        company_name: payload.company_name,
        company_description: payload.company_description,
        company_address: payload.company_address,
        company_phone: payload.company_phone,
        company_photo: photo_or_default(payload.company_photo),
        card_number: crate::models::generate_card_number(),
        // Owner always comes from the session, never the request body.
        user_id: Some(principal.user_id),
        created_at: now(),
    };
    let card = state.cards.create(card).await?;
    Ok((StatusCode::CREATED, Envelope::success(card)))
}

pub async fn update_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Json(payload): Json<CardDraft>,
) -> Result<impl IntoResponse, AppError> {
    let principal = require_session(&state, &headers).await?;
    let id = parse_card_id(&raw_id)?;
    payload.validate()?;

    let mut card = state.cards.find_by_id(id).await?;
    if card.user_id != Some(principal.user_id) {
        return Err(AppError::Forbidden("not the card owner".into()));
    }
    if let Some(existing) = state.cards.find_by_company_name(&payload.company_name).await? {
        if existing.id != card.id {
            return Err(AppError::Conflict("company already exists".into()));
        }
    }

    card.company_name = payload.company_name;
    card.company_description = payload.company_description;
    card.company_address = payload.company_address;
    card.company_phone = payload.company_phone;
    if let Some(photo) = payload.company_photo.filter(|p| !p.trim().is_empty()) {
        card.company_photo = photo;
    }
    let card = state.cards.update(card).await?;
    Ok(Envelope::success(card))
}

pub async fn delete_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let principal = require_session(&state, &headers).await?;
    let id = parse_card_id(&raw_id)?;
    let card = state.cards.find_by_id(id).await?;
    if card.user_id != Some(principal.user_id) {
        return Err(AppError::Forbidden("not the card owner".into()));
    }
    state.cards.delete(id).await?;
    Ok(Envelope::msg("card deleted"))
}

/// Drops the entire card collection and reloads it from the bundled fixture,
/// with bounded concurrent inserts.
pub async fn init_cards(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let raw = tokio::fs::read_to_string(&state.seed.fixture_path)
        .await
        .map_err(|e| AppError::Internal(format!("seed fixture unreadable: {e}")))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .map_err(|e| AppError::Internal(format!("seed fixture malformed: {e}")))?;

    state.cards.clear().await?;

    let semaphore = Arc::new(Semaphore::new(state.seed.batch_limit.max(1)));
    let inserts = seed.cards.into_iter().map(|entry| {
        let cards = state.cards.clone();
        let semaphore = semaphore.clone();
        async move {
            let _permit =
                semaphore.acquire().await.map_err(|e| AppError::Internal(e.to_string()))?;
            cards.create(entry.into_card()).await
        }
    });
    let results = join_all(inserts).await;

    let mut inserted = 0usize;
    let mut failed = 0usize;
    for r in results {
        match r {
            Ok(_) => inserted += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, "seed card rejected");
            }
        }
    }
    if failed > 0 {
        tracing::warn!(inserted, failed, "reseed finished with rejected cards");
    }
    Ok(Envelope::msg("cards reseeded").with_results(inserted))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
