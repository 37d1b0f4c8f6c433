//! 十六进制报文推送
//!
//! - POST /api/device/push：`{ hex, protocol?, deviceModel?, deviceSn? }`
//!
//! 与 TCP 接入走同一条路由流程，区别在于等待路由结果并同步返回。

use crate::AppState;
use crate::utils::{bad_request_error, route_error_response, routed_to_dto};
use api_contract::{ApiResponse, DevicePushRequest};
use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use devcomm_protocol::ProtocolHint;
use domain::ProtocolType;
use std::net::SocketAddr;

pub async fn push_frame(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<DevicePushRequest>,
) -> Response {
    let hint = match resolve_hint(&req) {
        Ok(hint) => hint,
        Err(message) => return bad_request_error(message),
    };
    let peer = connect_info
        .map(|ConnectInfo(addr)| addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    match state.router.route_hex(&req.hex, peer, hint).await {
        Ok(routed) => (StatusCode::OK, Json(ApiResponse::success(routed_to_dto(routed))))
            .into_response(),
        Err(err) => route_error_response(&err),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

/// 协议编码 > 设备型号 > 设备序列号
fn resolve_hint(req: &DevicePushRequest) -> Result<ProtocolHint, String> {
    if let Some(code) = non_empty(&req.protocol) {
        let protocol: ProtocolType = code.parse().map_err(|e| format!("{e}"))?;
        return Ok(ProtocolHint::Type(protocol));
    }
    if let Some(model) = non_empty(&req.device_model) {
        return Ok(ProtocolHint::DeviceModel(model.to_string()));
    }
    if let Some(serial) = non_empty(&req.device_sn) {
        return Ok(ProtocolHint::DeviceSn(serial.to_string()));
    }
    Ok(ProtocolHint::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{json_body, state};

    fn request(hex: &str) -> DevicePushRequest {
        DevicePushRequest {
            hex: hex.to_string(),
            protocol: None,
            device_model: None,
            device_sn: None,
        }
    }

    #[test]
    fn hint_priority() {
        let mut req = request("00");
        req.device_model = Some(" K40 ".to_string());
        req.device_sn = Some("1".to_string());
        assert_eq!(
            resolve_hint(&req).unwrap(),
            ProtocolHint::DeviceModel("K40".to_string())
        );

        req.protocol = Some("consume_zkteco_v1_0".to_string());
        assert_eq!(
            resolve_hint(&req).unwrap(),
            ProtocolHint::Type(ProtocolType::ConsumeV1_0)
        );

        req.protocol = Some("MODBUS".to_string());
        assert!(resolve_hint(&req).is_err());

        assert_eq!(resolve_hint(&request("00")).unwrap(), ProtocolHint::None);
    }

    #[tokio::test]
    async fn push_routes_attendance_frame() {
        // 55 AA | 设备 12345 | 0x01 | 工号 1001 | 时间 | 状态 0 | 验证 2
        let hex = "55 AA 39 30 00 00 01 E9 03 00 00 00 F1 53 65 00 02";
        let response = push_frame(State(state()), None, Json(request(hex))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["protocolType"], "ATTENDANCE_ENTROPY_V4_0");
        assert_eq!(body["data"]["messageType"], "ATTENDANCE_RECORD");
        assert_eq!(body["data"]["deviceId"], 12345);
        assert_eq!(body["data"]["confidence"], "EXTRACTED");
        assert_eq!(body["data"]["fields"]["pin"], 1001);
    }

    #[tokio::test]
    async fn push_reports_route_errors() {
        let response = push_frame(State(state()), None, Json(request("0102"))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "ROUTE.UNIDENTIFIED");

        let response = push_frame(State(state()), None, Json(request("55AAGG"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "ROUTE.INVALID_HEX");

        let response = push_frame(State(state()), None, Json(request("7E810100000009"))).await;
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "ROUTE.PARSE_ERROR");
    }
}
