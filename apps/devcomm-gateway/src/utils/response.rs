//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：bad_request_error, not_found_error, route_error_response
//! - DTO 转换：routed_to_dto

use api_contract::{ApiResponse, RoutedMessageDto, error_codes};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use devcomm_protocol::{RouteError, RoutedMessage, bytes_to_hex};
use domain::DeviceConfidence;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            error_codes::INVALID_REQUEST,
            message.into(),
        )),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error(message: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(error_codes::NOT_FOUND, message.into())),
    )
        .into_response()
}

/// 路由失败映射为 HTTP 状态码与错误码
pub fn route_error_response(err: &RouteError) -> Response {
    let (status, code) = match err {
        RouteError::Unidentified { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, error_codes::UNIDENTIFIED)
        }
        RouteError::HandlerNotFound(_) => (StatusCode::NOT_FOUND, error_codes::HANDLER_NOT_FOUND),
        RouteError::InvalidHex(_) => (StatusCode::BAD_REQUEST, error_codes::INVALID_HEX),
        RouteError::Parse { .. } => (StatusCode::UNPROCESSABLE_ENTITY, error_codes::PARSE_ERROR),
        RouteError::Process { .. } => (StatusCode::BAD_GATEWAY, error_codes::PROCESS_ERROR),
        RouteError::Backpressure => (StatusCode::SERVICE_UNAVAILABLE, error_codes::BACKPRESSURE),
        RouteError::ShutDown => (StatusCode::SERVICE_UNAVAILABLE, error_codes::SHUTDOWN),
        RouteError::Aborted(_) => (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL),
    };
    (
        status,
        Json(ApiResponse::<()>::error(code, err.to_string())),
    )
        .into_response()
}

fn confidence_name(confidence: DeviceConfidence) -> &'static str {
    match confidence {
        DeviceConfidence::Extracted => "EXTRACTED",
        DeviceConfidence::Directory => "DIRECTORY",
        DeviceConfidence::Sentinel => "SENTINEL",
    }
}

/// RoutedMessage 转 RoutedMessageDto
pub fn routed_to_dto(routed: RoutedMessage) -> RoutedMessageDto {
    let message = routed.message;
    RoutedMessageDto {
        protocol_type: message.protocol_type.code().to_string(),
        message_type: message.message_type,
        device_id: message.device_id,
        confidence: confidence_name(message.confidence).to_string(),
        duration_ms: routed.duration.as_millis() as u64,
        fields: message.fields,
        response_hex: routed.response.as_deref().map(bytes_to_hex),
    }
}
