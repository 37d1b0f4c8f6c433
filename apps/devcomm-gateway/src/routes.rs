//! 路由定义
//!
//! - 健康检查：/health
//! - 路由指标：/metrics
//! - 报文推送：/api/device/push
//! - 适配器管理：/api/adapters/reload, /api/adapters/:protocol

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{delete, get, post},
};

/// 创建 API 路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/api/device/push", post(push_frame))
        .route("/api/adapters/reload", post(reload_adapters))
        .route("/api/adapters/:protocol", delete(unregister_adapter))
}
