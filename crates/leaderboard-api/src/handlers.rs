//! # Request Handlers
//!
//! Translate HTTP requests into repository calls.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiResult;
use leaderboard_domain::{DEFAULT_LIMIT, LeaderboardRow, ScoreSubmission};

/// `POST /scores`
///
/// Adds the submitted score to the member's running total and records its
/// display name.
pub async fn submit_score(
    State(state): State<AppState>,
    payload: Result<Json<ScoreSubmission>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(submission) = payload?;
    submission.validate()?;

    tracing::info!(
        uid = %submission.member_id,
        score = submission.score,
        "Recording score"
    );

    state
        .leaderboard
        .submit_score(
            &submission.member_id,
            &submission.display_name,
            submission.score,
        )
        .await?;

    Ok(StatusCode::CREATED)
}

/// `GET /totals/{window}`
pub async fn top_totals(
    State(state): State<AppState>,
    Path(window): Path<String>,
) -> ApiResult<Json<Vec<LeaderboardRow>>> {
    let rows = state.leaderboard.query_top(&window, DEFAULT_LIMIT).await?;
    Ok(Json(rows))
}

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let pool = state.pool_status();
    Json(json!({
        "status": "ok",
        "pool": {
            "capacity": pool.capacity,
            "idle": pool.idle,
            "in_use": pool.in_use,
        }
    }))
}
