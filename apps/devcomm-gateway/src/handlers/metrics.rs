//! 路由指标快照
//!
//! - GET /metrics

use crate::AppState;
use api_contract::ApiResponse;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let snapshot = state.router.metrics().snapshot();
    (StatusCode::OK, Json(ApiResponse::success(snapshot))).into_response()
}
