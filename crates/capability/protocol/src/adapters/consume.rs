//! 中控消费协议 V1.0
//!
//! ```text
//! 0      2          6      7
//! | 7E 81 | 设备ID u32 | 类型 | 消息体...
//! 0x01 消费记录：卡号 u32 @7，金额（分）u32 @11，消费时间 u32 @15（秒）
//! 0x02 设备状态：状态 @7
//! 0x03 余额查询：卡号 u32 @7
//! 0x04 心跳：心跳间隔 u16 @7（秒），运行时长 u32 @9（秒）
//! ```

use super::{
    DeviceIdField, FrameReader, ack_frame, code_name, deliver_tracked, unknown_message_type,
};
use crate::adapter::{AdapterStatus, MessageSink, ProtocolAdapter, StatusTracker};
use crate::error::{ParseError, ProcessError};
use crate::identifier::CONSUME_HEADER;
use async_trait::async_trait;
use domain::{NormalizedMessage, ProtocolType};
use std::sync::Arc;
use tracing::info;

const MIN_FRAME_LEN: usize = 7;
const MSG_CONSUME_RECORD: u8 = 0x01;
const MSG_DEVICE_STATUS: u8 = 0x02;
const MSG_BALANCE_QUERY: u8 = 0x03;
const MSG_HEARTBEAT: u8 = 0x04;

const SUPPORTED_DEVICE_MODELS: &[&str] = &[
    "IC-600T", "F2", "SC700", "SC810", "IC-700A", "IC-800A", "IC-260T", "IC-360T", "IC-560T",
    "IC-760T", "SC602", "SC603",
];
const MESSAGE_TYPES: &[(u8, &str)] = &[
    (MSG_CONSUME_RECORD, "CONSUME_RECORD"),
    (MSG_DEVICE_STATUS, "DEVICE_STATUS"),
    (MSG_BALANCE_QUERY, "BALANCE_QUERY"),
    (MSG_HEARTBEAT, "HEARTBEAT"),
];

const DEVICE_STATUS: &[(u8, &str)] = &[(0, "ONLINE"), (1, "BUSY"), (2, "FAULT")];

pub struct ConsumeZktecoV10Adapter {
    sink: Arc<dyn MessageSink>,
    tracker: StatusTracker,
}

impl ConsumeZktecoV10Adapter {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            tracker: StatusTracker::new(),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for ConsumeZktecoV10Adapter {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::ConsumeV1_0
    }

    fn supported_device_models(&self) -> &[&'static str] {
        SUPPORTED_DEVICE_MODELS
    }

    fn parse(&self, payload: &[u8]) -> Result<NormalizedMessage, ParseError> {
        let reader = FrameReader::new(payload, &CONSUME_HEADER, MIN_FRAME_LEN)?;
        match reader.u8_at(6)? {
            MSG_CONSUME_RECORD => {
                reader.require(19)?;
                Ok(NormalizedMessage::new(self.protocol_type(), "CONSUME_RECORD")
                    .with_field("cardNo", reader.u32_at(7)?)
                    .with_field("amountCents", reader.u32_at(11)?)
                    .with_field("consumeTime", reader.u32_at(15)?))
            }
            MSG_DEVICE_STATUS => Ok(NormalizedMessage::new(self.protocol_type(), "DEVICE_STATUS")
                .with_field("deviceStatus", code_name(reader.u8_at(7)?, DEVICE_STATUS))),
            MSG_BALANCE_QUERY => Ok(NormalizedMessage::new(self.protocol_type(), "BALANCE_QUERY")
                .with_field("cardNo", reader.u32_at(7)?)),
            MSG_HEARTBEAT => {
                reader.require(13)?;
                Ok(NormalizedMessage::new(self.protocol_type(), "HEARTBEAT")
                    .with_field("intervalSecs", reader.u16_at(7)?)
                    .with_field("uptimeSecs", reader.u32_at(9)?))
            }
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
        ack_frame(&CONSUME_HEADER, DeviceIdField::U32Le, MESSAGE_TYPES, message, outcome)
    }

    fn status(&self) -> AdapterStatus {
        self.tracker.status()
    }

    fn destroy(&self) {
        self.tracker.mark_destroyed();
        info!(protocol = %self.protocol_type(), "adapter destroyed");
    }
}
