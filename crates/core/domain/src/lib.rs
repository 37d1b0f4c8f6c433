//! 设备通讯网关的领域模型：原始帧、协议类型与规范化消息。

pub mod data;
pub mod protocol;

pub use data::{
    DeviceConfidence, NormalizedMessage, RawFrame, SENTINEL_DEVICE_ID, now_epoch_ms,
};
pub use protocol::{ProtocolType, UnknownProtocol};
