use std::future::Future;

use axum::{extract::State, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::core::redis::{rate_limit_key, AttemptLimiter};
use crate::core::state::AppState;
use crate::schemas::admin::{ClaimsRequest, PurgeRequest};
use crate::schemas::ActionResponse;
use crate::services::accounts;
use crate::services::bulk_delete::{self, Exclusion, PurgeOutcome};

/// Wrong-secret purge attempts allowed per admin and window.
const PURGE_FAILURE_LIMIT: u64 = 5;
const PURGE_FAILURE_WINDOW_SECONDS: u64 = 300;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/purge", post(purge)).route("/claims", post(set_claims))
}

/// Runs `purge` unless `key` is locked out. Only rejected secrets count towards the lockout.
async fn limit_secret_failures<F>(
    limiter: &dyn AttemptLimiter,
    key: &str,
    purge: F,
) -> Result<PurgeOutcome, ApiError>
where
    F: Future<Output = PurgeOutcome>,
{
    if limiter.exhausted(key, PURGE_FAILURE_LIMIT).await {
        return Err(ApiError::TooManyRequests("Too many purge attempts, try again later"));
    }

    let outcome = purge.await;
    if outcome.secret_rejected() {
        limiter.record_failure(key, PURGE_FAILURE_WINDOW_SECONDS).await;
    }
    Ok(outcome)
}

async fn purge(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<PurgeRequest>,
) -> Result<Json<PurgeOutcome>, ApiError> {
    tracing::warn!(
        admin = %admin.uid,
        target = payload.target.as_str(),
        "Bulk purge requested"
    );
    let outcome = limit_secret_failures(
        state.redis(),
        &rate_limit_key("purge", &admin.uid),
        bulk_delete::purge(
            state.store().as_ref(),
            state.identity().as_ref(),
            state.settings().admin(),
            payload.target,
            &payload.admin_secret,
            Exclusion::Uid(&admin.uid),
        ),
    )
    .await?;

    Ok(Json(outcome))
}

async fn set_claims(
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ClaimsRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    accounts::set_custom_claims(state.identity().as_ref(), &caller, &payload.uid, payload.claims)
        .await?;

    Ok(Json(ActionResponse::ok(format!("Custom claims set for user {}", payload.uid))))
}
