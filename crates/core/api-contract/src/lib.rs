//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};

/// 路由失败对外错误码。
pub mod error_codes {
    pub const UNIDENTIFIED: &str = "ROUTE.UNIDENTIFIED";
    pub const HANDLER_NOT_FOUND: &str = "ROUTE.HANDLER_NOT_FOUND";
    pub const PARSE_ERROR: &str = "ROUTE.PARSE_ERROR";
    pub const PROCESS_ERROR: &str = "ROUTE.PROCESS_ERROR";
    pub const BACKPRESSURE: &str = "ROUTE.BACKPRESSURE";
    pub const INVALID_HEX: &str = "ROUTE.INVALID_HEX";
    pub const SHUTDOWN: &str = "ROUTE.SHUTDOWN";
    pub const INVALID_REQUEST: &str = "INVALID.REQUEST";
    pub const NOT_FOUND: &str = "RESOURCE.NOT_FOUND";
    pub const INTERNAL: &str = "INTERNAL.ERROR";
}

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 十六进制报文推送请求体。
///
/// `protocol` / `deviceModel` / `deviceSn` 为可选线索，按此顺序取第一个非空值。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePushRequest {
    pub hex: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default, alias = "device_model")]
    pub device_model: Option<String>,
    #[serde(default, alias = "device_sn")]
    pub device_sn: Option<String>,
}

/// 路由成功后的规范化消息。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedMessageDto {
    pub protocol_type: String,
    pub message_type: String,
    pub device_id: i64,
    pub confidence: String,
    pub duration_ms: u64,
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// 适配器生成的设备应答帧（十六进制），无应答时省略
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_hex: Option<String>,
}

/// 适配器热加载结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResultDto {
    pub registered: usize,
    pub protocols: Vec<String>,
}

/// 适配器注销结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterResultDto {
    pub protocol: String,
    pub removed: bool,
}
