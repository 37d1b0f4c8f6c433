//! 健康检查
//!
//! - GET /health：适配器注册表健康状态，任一适配器为 Error 时返回 503

use crate::AppState;
use api_contract::ApiResponse;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use devcomm_protocol::AdapterStatus;

pub async fn health(State(state): State<AppState>) -> Response {
    let health = state.router.registry().health();
    let status = if health.status == AdapterStatus::Error {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(ApiResponse::success(health))).into_response()
}
