use serde::Serialize;
use std::net::SocketAddr;

use crate::ProtocolType;

/// 设备无法定位时使用的占位设备 ID。
pub const SENTINEL_DEVICE_ID: i64 = 0;

/// 单次读取得到的原始帧。
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub peer_addr: SocketAddr,
    pub received_at_ms: i64,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(peer_addr: SocketAddr, payload: Vec<u8>) -> Self {
        Self {
            peer_addr,
            received_at_ms: now_epoch_ms(),
            payload,
        }
    }
}

/// 设备 ID 的来源可信度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceConfidence {
    /// 从报文中直接解析
    Extracted,
    /// 通过对端 IP 查询设备目录
    Directory,
    /// 占位 ID，帧需隔离处理
    Sentinel,
}

impl DeviceConfidence {
    pub fn is_low(self) -> bool {
        matches!(self, Self::Sentinel)
    }
}

/// 适配器解析后的规范化消息。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMessage {
    pub message_type: String,
    pub device_id: i64,
    pub protocol_type: ProtocolType,
    pub confidence: DeviceConfidence,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl NormalizedMessage {
    /// 构造尚未绑定设备的消息（设备 ID 由路由器在定位后回填）。
    pub fn new(protocol_type: ProtocolType, message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            device_id: SENTINEL_DEVICE_ID,
            protocol_type,
            confidence: DeviceConfidence::Sentinel,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(|value| value.as_u64())
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|value| value.as_str())
    }
}

/// 当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
