//! 熵基门禁协议 V4.8
//!
//! ```text
//! 0      2                10     11
//! | AA 55 | 设备编号 ASCII[8] | 类型 | 消息体...
//! 0x01 门禁事件：卡号 u32 @11，门号 @15，方向 @16，验证结果 @17
//! 0x02 设备状态：门状态 @11，锁状态 @12
//! 0x03 报警事件：报警级别 @11
//! 0x04 心跳：无消息体
//! ```

use super::{
    DeviceIdField, FrameReader, ack_frame, code_name, deliver_tracked, unknown_message_type,
};
use crate::adapter::{AdapterStatus, MessageSink, ProtocolAdapter, StatusTracker};
use crate::error::{ParseError, ProcessError};
use crate::identifier::ACCESS_HEADER;
use async_trait::async_trait;
use domain::{NormalizedMessage, ProtocolType};
use std::sync::Arc;
use tracing::info;

const MIN_FRAME_LEN: usize = 11;
const MSG_ACCESS_EVENT: u8 = 0x01;
const MSG_DEVICE_STATUS: u8 = 0x02;
const MSG_ALARM_EVENT: u8 = 0x03;
const MSG_HEARTBEAT: u8 = 0x04;

const SUPPORTED_DEVICE_MODELS: &[&str] = &[
    "MA300", "MA300T", "SC405", "SC700", "SC705", "F18", "TA800C", "TA800T", "WK2600", "WK2600P",
];
const MESSAGE_TYPES: &[(u8, &str)] = &[
    (MSG_ACCESS_EVENT, "ACCESS_EVENT"),
    (MSG_DEVICE_STATUS, "DEVICE_STATUS"),
    (MSG_ALARM_EVENT, "ALARM_EVENT"),
    (MSG_HEARTBEAT, "HEARTBEAT"),
];

const DIRECTION: &[(u8, &str)] = &[(1, "IN"), (2, "OUT")];
const VERIFY_RESULT: &[(u8, &str)] = &[(0, "SUCCESS"), (1, "FAILED"), (2, "TIMEOUT"), (3, "INVALID")];
const DOOR_STATUS: &[(u8, &str)] = &[(1, "OPEN"), (2, "CLOSE")];
const LOCK_STATUS: &[(u8, &str)] = &[(1, "LOCKED"), (2, "UNLOCKED"), (3, "FAULT")];
const ALARM_LEVEL: &[(u8, &str)] = &[(1, "LOW"), (2, "MEDIUM"), (3, "HIGH"), (4, "CRITICAL")];

pub struct AccessEntropyV48Adapter {
    sink: Arc<dyn MessageSink>,
    tracker: StatusTracker,
}

impl AccessEntropyV48Adapter {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            tracker: StatusTracker::new(),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for AccessEntropyV48Adapter {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::AccessV4_8
    }

    fn supported_device_models(&self) -> &[&'static str] {
        SUPPORTED_DEVICE_MODELS
    }

    fn parse(&self, payload: &[u8]) -> Result<NormalizedMessage, ParseError> {
        let reader = FrameReader::new(payload, &ACCESS_HEADER, MIN_FRAME_LEN)?;
        match reader.u8_at(10)? {
            MSG_ACCESS_EVENT => {
                reader.require(18)?;
                Ok(NormalizedMessage::new(self.protocol_type(), "ACCESS_EVENT")
                    .with_field("cardNo", reader.u32_at(11)?)
                    .with_field("doorNo", reader.u8_at(15)?)
                    .with_field("direction", code_name(reader.u8_at(16)?, DIRECTION))
                    .with_field("verifyResult", code_name(reader.u8_at(17)?, VERIFY_RESULT)))
            }
            MSG_DEVICE_STATUS => {
                reader.require(13)?;
                Ok(NormalizedMessage::new(self.protocol_type(), "DEVICE_STATUS")
                    .with_field("doorStatus", code_name(reader.u8_at(11)?, DOOR_STATUS))
                    .with_field("lockStatus", code_name(reader.u8_at(12)?, LOCK_STATUS)))
            }
            MSG_ALARM_EVENT => Ok(NormalizedMessage::new(self.protocol_type(), "ALARM_EVENT")
                .with_field("alarmLevel", code_name(reader.u8_at(11)?, ALARM_LEVEL))),
            MSG_HEARTBEAT => Ok(NormalizedMessage::new(self.protocol_type(), "HEARTBEAT")),
            other => Err(unknown_message_type(other)),
        }
    }

    async fn process(&self, message: &NormalizedMessage, device_id: i64) -> Result<(), ProcessError> {
        deliver_tracked(
            self.protocol_type(),
            MESSAGE_TYPES,
            &self.tracker,
            self.sink.as_ref(),
            message,
            device_id,
        )
        .await
    }

    fn build_response(
        &self,
        message: &NormalizedMessage,
        outcome: Result<(), &ProcessError>,
    ) -> Option<Vec<u8>> {
        ack_frame(&ACCESS_HEADER, DeviceIdField::AsciiDecimal8, MESSAGE_TYPES, message, outcome)
    }

    fn status(&self) -> AdapterStatus {
        self.tracker.status()
    }

    fn destroy(&self) {
        self.tracker.mark_destroyed();
        info!(protocol = %self.protocol_type(), "adapter destroyed");
    }
}
