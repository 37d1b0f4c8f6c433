//! 内置厂商适配器
//!
//! 三个参考实现均为小端二进制格式：`协议头(2) | 设备ID | 消息类型(1) | 消息体`。
//! 业务动作交给下游 `MessageSink`，本层只做结构解析与状态跟踪。
//!
//! 应答帧沿用请求的协议头与设备 ID 编码：
//!
//! ```text
//! | 协议头 | 设备ID | 请求类型 | 0x80 | 结果（0x00 ACK，0x01 NAK）|
//! ```

mod access;
mod attendance;
mod consume;

pub use access::AccessEntropyV48Adapter;
pub use attendance::AttendanceEntropyV40Adapter;
pub use consume::ConsumeZktecoV10Adapter;

use crate::adapter::{MessageSink, ProtocolAdapter, StatusTracker};
use crate::error::{ParseError, ProcessError};
use crate::locator::read_u32_le;
use crate::registry::AdapterCatalog;
use domain::{NormalizedMessage, ProtocolType};
use std::sync::Arc;

/// 按协议类型构造内置适配器
pub fn build_adapter(protocol: ProtocolType, sink: Arc<dyn MessageSink>) -> Arc<dyn ProtocolAdapter> {
    match protocol {
        ProtocolType::AttendanceV4_0 => Arc::new(AttendanceEntropyV40Adapter::new(sink)),
        ProtocolType::AccessV4_8 => Arc::new(AccessEntropyV48Adapter::new(sink)),
        ProtocolType::ConsumeV1_0 => Arc::new(ConsumeZktecoV10Adapter::new(sink)),
    }
}

/// 按配置启用的协议集合构造适配器（供注册表热加载使用）
#[derive(Clone)]
pub struct StandardCatalog {
    enabled: Vec<ProtocolType>,
    sink: Arc<dyn MessageSink>,
}

impl StandardCatalog {
    pub fn new(enabled: Vec<ProtocolType>, sink: Arc<dyn MessageSink>) -> Self {
        Self { enabled, sink }
    }

    pub fn all(sink: Arc<dyn MessageSink>) -> Self {
        Self::new(ProtocolType::ALL.to_vec(), sink)
    }
}

impl AdapterCatalog for StandardCatalog {
    fn build(&self) -> Vec<Arc<dyn ProtocolAdapter>> {
        self.enabled
            .iter()
            .map(|protocol| build_adapter(*protocol, Arc::clone(&self.sink)))
            .collect()
    }
}

/// 带边界检查的报文读取
struct FrameReader<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameReader<'a> {
    fn new(bytes: &'a [u8], header: &[u8], min_len: usize) -> Result<Self, ParseError> {
        if bytes.len() < min_len {
            return Err(ParseError::too_short(min_len, bytes.len()));
        }
        if !bytes.starts_with(header) {
            return Err(ParseError::new(
                "HEADER_MISMATCH",
                format!("expected header {}", crate::hex_codec::bytes_to_hex(header)),
            ));
        }
        Ok(Self { bytes })
    }

    fn require(&self, len: usize) -> Result<(), ParseError> {
        if self.bytes.len() < len {
            return Err(ParseError::too_short(len, self.bytes.len()));
        }
        Ok(())
    }

    fn u8_at(&self, offset: usize) -> Result<u8, ParseError> {
        self.bytes
            .get(offset)
            .copied()
            .ok_or_else(|| ParseError::too_short(offset + 1, self.bytes.len()))
    }

    fn u16_at(&self, offset: usize) -> Result<u16, ParseError> {
        self.bytes
            .get(offset..offset + 2)
            .map(|raw| u16::from_le_bytes([raw[0], raw[1]]))
            .ok_or_else(|| ParseError::too_short(offset + 2, self.bytes.len()))
    }

    fn u32_at(&self, offset: usize) -> Result<u32, ParseError> {
        read_u32_le(self.bytes, offset)
            .ok_or_else(|| ParseError::too_short(offset + 4, self.bytes.len()))
    }
}

fn unknown_message_type(code: u8) -> ParseError {
    ParseError::new("UNKNOWN_MESSAGE_TYPE", format!("unknown message type 0x{code:02X}"))
}

/// 码值到名称的映射，未知码值返回 `UNKNOWN`
fn code_name(code: u8, table: &[(u8, &'static str)]) -> &'static str {
    table
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, name)| *name)
        .unwrap_or("UNKNOWN")
}

/// 应答帧类型位
const RESPONSE_FLAG: u8 = 0x80;
const RESULT_ACK: u8 = 0x00;
const RESULT_NAK: u8 = 0x01;

/// 设备 ID 在帧内的编码
#[derive(Debug, Clone, Copy)]
enum DeviceIdField {
    U32Le,
    AsciiDecimal8,
}

/// 按请求消息构造 ACK/NAK 应答帧
///
/// 消息类型不在码表中，或设备 ID 无法按该协议编码时返回 `None`。
fn ack_frame(
    header: &[u8],
    id_field: DeviceIdField,
    message_types: &[(u8, &str)],
    message: &NormalizedMessage,
    outcome: Result<(), &ProcessError>,
) -> Option<Vec<u8>> {
    let code = message_types
        .iter()
        .find(|(_, name)| *name == message.message_type)
        .map(|(code, _)| *code)?;
    let mut frame = header.to_vec();
    match id_field {
        DeviceIdField::U32Le => {
            let device_id = u32::try_from(message.device_id).ok()?;
            frame.extend_from_slice(&device_id.to_le_bytes());
        }
        DeviceIdField::AsciiDecimal8 => {
            if !(0..=99_999_999).contains(&message.device_id) {
                return None;
            }
            frame.extend_from_slice(format!("{:08}", message.device_id).as_bytes());
        }
    }
    frame.push(code | RESPONSE_FLAG);
    frame.push(if outcome.is_ok() { RESULT_ACK } else { RESULT_NAK });
    Some(frame)
}

/// 适配器公共处理流程：状态检查、消息类型检查、投递下游并更新状态
async fn deliver_tracked(
    protocol: ProtocolType,
    message_types: &[(u8, &str)],
    tracker: &StatusTracker,
    sink: &dyn MessageSink,
    message: &NormalizedMessage,
    device_id: i64,
) -> Result<(), ProcessError> {
    if tracker.is_destroyed() {
        return Err(ProcessError::new("ADAPTER_DESTROYED", "adapter has been destroyed"));
    }
    if message.protocol_type != protocol {
        return Err(ProcessError::new(
            "PROTOCOL_MISMATCH",
            format!("message of {} handed to {}", message.protocol_type, protocol),
        ));
    }
    if !message_types
        .iter()
        .any(|(_, name)| *name == message.message_type)
    {
        return Err(ProcessError::new(
            "UNSUPPORTED_MESSAGE",
            format!("unsupported message type {}", message.message_type),
        ));
    }
    if message.device_id != device_id {
        return Err(ProcessError::new(
            "DEVICE_MISMATCH",
            format!("message bound to device {}, got {}", message.device_id, device_id),
        ));
    }
    match sink.deliver(message).await {
        Ok(()) => {
            tracker.record_success();
            Ok(())
        }
        Err(err) => {
            tracker.record_failure();
            Err(err)
        }
    }
}


#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 记录投递内容的接收方
    #[derive(Default)]
    pub struct RecordingSink {
        pub delivered: Mutex<Vec<NormalizedMessage>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn deliver(&self, message: &NormalizedMessage) -> Result<(), ProcessError> {
            self.delivered.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// 总是失败的接收方
    #[derive(Default)]
    pub struct FailingSink;

    #[async_trait]
    impl MessageSink for FailingSink {
        async fn deliver(&self, _message: &NormalizedMessage) -> Result<(), ProcessError> {
            Err(ProcessError::new("DOWNSTREAM_UNAVAILABLE", "forced failure"))
        }
    }
}
