use axum::extract::State;
use serde_json::{json, Value};

use crate::api::{ApiResponse, ApiResult};

use super::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "status": "ok",
        "environment": state.config.environment,
        "now": state.clock.now().timestamp_millis(),
    })))
}
