use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::redis::rate_limit_key;
use crate::core::security;
use crate::core::state::AppState;
use crate::db::models::UserProfile;
use crate::schemas::auth::TokenResponse;
use crate::schemas::user::{AdminSignupRequest, LoginRequest, SignupRequest, UserResponse};
use crate::services::accounts;

/// Max attempts per window for auth endpoints (login/signup).
pub(crate) const AUTH_RATE_LIMIT: u64 = 10;
/// Rate limit window in seconds.
pub(crate) const AUTH_RATE_WINDOW_SECONDS: u64 = 60;

const SIGNUP_LIMITED: &str = "Too many signup attempts, try again later";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/admin-signup", post(admin_signup))
        .route("/login", post(login))
        .route("/me", get(me))
}

async fn enforce_rate_limit(
    state: &AppState,
    scope: &str,
    subject: &str,
    message: &'static str,
) -> Result<(), ApiError> {
    let allowed = state
        .redis()
        .rate_limit(&rate_limit_key(scope, subject), AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);
    if allowed {
        Ok(())
    } else {
        Err(ApiError::TooManyRequests(message))
    }
}

fn issue_token(state: &AppState, profile: UserProfile) -> Result<TokenResponse, ApiError> {
    let token = security::create_access_token(&profile.uid, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;
    Ok(TokenResponse::bearer(token, UserResponse::from_profile(profile)))
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    enforce_rate_limit(&state, "signup", &payload.email, SIGNUP_LIMITED).await?;

    let profile = accounts::register(
        state.store().as_ref(),
        state.identity().as_ref(),
        payload.into_registration(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(issue_token(&state, profile)?)))
}

async fn admin_signup(
    State(state): State<AppState>,
    Json(payload): Json<AdminSignupRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    enforce_rate_limit(&state, "admin-signup", &payload.email, SIGNUP_LIMITED).await?;

    let profile = accounts::register_admin(
        state.store().as_ref(),
        state.identity().as_ref(),
        state.settings().admin(),
        &payload.admin_secret,
        payload.name,
        payload.email,
        payload.password,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(issue_token(&state, profile)?)))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    enforce_rate_limit(&state, "login", &payload.email, "Too many login attempts, try again later")
        .await?;

    let identity = state.identity().as_ref();
    let account = accounts::authenticate(identity, &payload.email, &payload.password)
        .await?
        .ok_or(ApiError::Unauthorized("Incorrect email or password"))?;

    let profile = accounts::get_profile(state.store().as_ref(), &account.uid)
        .await
        .map_err(|_| ApiError::Unauthorized("Incorrect email or password"))?;

    Ok(Json(issue_token(&state, profile)?))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_profile(user))
}
