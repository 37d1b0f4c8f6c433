//! 熵基考勤 PUSH 协议 V4.0
//!
//! ```text
//! 0      2          6      7
//! | 55 AA | 设备ID u32 | 类型 | 消息体...
//! 0x01 考勤记录：工号 u32 @7，打卡时间 u32 @11（秒），考勤状态 @15，验证方式 @16
//! 0x02 设备状态：状态 @7
//! 0x03 心跳：无消息体
//! ```

use super::{
    DeviceIdField, FrameReader, ack_frame, code_name, deliver_tracked, unknown_message_type,
};
use crate::adapter::{AdapterStatus, MessageSink, ProtocolAdapter, StatusTracker};
use crate::error::{ParseError, ProcessError};
use crate::identifier::ATTENDANCE_HEADER;
use async_trait::async_trait;
use domain::{NormalizedMessage, ProtocolType};
use std::sync::Arc;
use tracing::info;

const MIN_FRAME_LEN: usize = 7;
const MSG_ATTENDANCE_RECORD: u8 = 0x01;
const MSG_DEVICE_STATUS: u8 = 0x02;
const MSG_HEARTBEAT: u8 = 0x03;

const SUPPORTED_DEVICE_MODELS: &[&str] = &["IFACE702", "IFACE880", "UFACE800", "SF1005", "K40"];
const MESSAGE_TYPES: &[(u8, &str)] = &[
    (MSG_ATTENDANCE_RECORD, "ATTENDANCE_RECORD"),
    (MSG_DEVICE_STATUS, "DEVICE_STATUS"),
    (MSG_HEARTBEAT, "HEARTBEAT"),
];

const ATTENDANCE_STATUS: &[(u8, &str)] = &[
    (0, "CHECK_IN"),
    (1, "CHECK_OUT"),
    (2, "BREAK_OUT"),
    (3, "BREAK_IN"),
    (4, "OVERTIME_IN"),
    (5, "OVERTIME_OUT"),
];
const VERIFY_MODE: &[(u8, &str)] = &[
    (1, "CARD"),
    (2, "FACE"),
    (3, "FINGER"),
    (4, "PASSWORD"),
    (5, "QR"),
];
const DEVICE_STATUS: &[(u8, &str)] = &[(0, "ONLINE"), (1, "BUSY"), (2, "FAULT")];

pub struct AttendanceEntropyV40Adapter {
    sink: Arc<dyn MessageSink>,
    tracker: StatusTracker,
}

impl AttendanceEntropyV40Adapter {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            tracker: StatusTracker::new(),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for AttendanceEntropyV40Adapter {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::AttendanceV4_0
    }

    fn supported_device_models(&self) -> &[&'static str] {
        SUPPORTED_DEVICE_MODELS
    }

    fn parse(&self, payload: &[u8]) -> Result<NormalizedMessage, ParseError> {
        let reader = FrameReader::new(payload, &ATTENDANCE_HEADER, MIN_FRAME_LEN)?;
        let message_type = reader.u8_at(6)?;
        match message_type {
            MSG_ATTENDANCE_RECORD => {
                reader.require(17)?;
                let status = reader.u8_at(15)?;
                let verify = reader.u8_at(16)?;
                Ok(NormalizedMessage::new(self.protocol_type(), "ATTENDANCE_RECORD")
                    .with_field("pin", reader.u32_at(7)?)
                    .with_field("punchTime", reader.u32_at(11)?)
                    .with_field("attendanceStatus", code_name(status, ATTENDANCE_STATUS))
                    .with_field("verifyMode", code_name(verify, VERIFY_MODE)))
            }
            MSG_DEVICE_STATUS => {
                let status = reader.u8_at(7)?;
                Ok(NormalizedMessage::new(self.protocol_type(), "DEVICE_STATUS")
                    .with_field("deviceStatus", code_name(status, DEVICE_STATUS)))
            }
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
        ack_frame(&ATTENDANCE_HEADER, DeviceIdField::U32Le, MESSAGE_TYPES, message, outcome)
    }

    fn status(&self) -> AdapterStatus {
        self.tracker.status()
    }

    fn destroy(&self) {
        self.tracker.mark_destroyed();
        info!(protocol = %self.protocol_type(), "adapter destroyed");
    }
}
