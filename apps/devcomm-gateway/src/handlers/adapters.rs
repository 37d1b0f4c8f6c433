//! 适配器管理
//!
//! - POST /api/adapters/reload：按启用协议集合整体重建注册表
//! - DELETE /api/adapters/{protocol}：注销单个协议适配器

use crate::AppState;
use crate::utils::{bad_request_error, not_found_error};
use api_contract::{ApiResponse, ReloadResultDto, UnregisterResultDto};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::ProtocolType;
use tracing::info;

#[derive(serde::Deserialize)]
pub struct ProtocolPath {
    protocol: String,
}

/// 热加载适配器
pub async fn reload_adapters(State(state): State<AppState>) -> Response {
    let registry = state.router.registry();
    let registered = registry.reload();
    let protocols = registry
        .protocol_types()
        .into_iter()
        .map(|protocol| protocol.code().to_string())
        .collect();
    info!(registered, "adapters reloaded via api");
    (
        StatusCode::OK,
        Json(ApiResponse::success(ReloadResultDto {
            registered,
            protocols,
        })),
    )
        .into_response()
}

/// 注销适配器
pub async fn unregister_adapter(
    State(state): State<AppState>,
    Path(path): Path<ProtocolPath>,
) -> Response {
    let protocol: ProtocolType = match path.protocol.parse() {
        Ok(protocol) => protocol,
        Err(err) => return bad_request_error(format!("{err}")),
    };
    if !state.router.registry().unregister(protocol) {
        return not_found_error(format!("no adapter registered for {protocol}"));
    }
    (
        StatusCode::OK,
        Json(ApiResponse::success(UnregisterResultDto {
            protocol: protocol.code().to_string(),
            removed: true,
        })),
    )
        .into_response()
}
