//! # 设备通讯能力模块
//!
//! 接收考勤、门禁、消费等终端上报的二进制报文，识别协议后交给对应厂商适配器：
//! - **TCP 接入**：独立线程监听端口，每次读取即一帧
//! - **协议识别**：按协议头魔数匹配协议类型
//! - **设备定位**：从报文提取设备 ID，失败时按对端 IP 查询设备目录
//! - **适配器注册表**：协议类型 / 设备型号 / 设备序列号三路查找，支持热加载
//! - **消息路由**：在有界工作池上执行 parse → process，并记录路由指标
//!
//! ## 架构设计
//!
//! ```text
//! 终端设备 ──TCP──▶ FrameAcceptor (单线程运行时)
//!                        │ RawFrame
//!                        ▼
//! HTTP 推送 (hex) ──▶ MessageRouter ──▶ WorkerPool (多线程运行时)
//!                        │
//!       ProtocolIdentifier → DeviceLocator → AdapterRegistry
//!                        │
//!                        ▼
//!              ProtocolAdapter::parse / process ──▶ MessageSink (下游)
//!                        │
//!                        ▼
//!              build_response ──FrameReply──▶ 原连接回写 ACK/NAK
//! ```
//!
//! ## 协议头
//!
//! | 协议 | 协议头 | 设备 ID |
//! |------|--------|---------|
//! | 考勤 熵基 V4.0 | `55 AA` | u32 小端 @2 |
//! | 门禁 熵基 V4.8 | `AA 55` | 8 位 ASCII 数字 @2 |
//! | 消费 中控 V1.0 | `7E 81` | u32 小端 @2 |

mod adapter;
mod adapters;
mod error;
mod hex_codec;
mod identifier;
mod locator;
mod registry;
mod router;
mod tcp_server;
mod worker;

pub use adapter::{
    AdapterStatus, DEGRADE_AFTER_FAILURES, LoggingMessageSink, MessageSink, ProtocolAdapter,
    StatusTracker,
};
pub use adapters::{
    AccessEntropyV48Adapter, AttendanceEntropyV40Adapter, ConsumeZktecoV10Adapter,
    StandardCatalog, build_adapter,
};
pub use error::{ParseError, ProcessError, ProtocolError, RouteError};
pub use hex_codec::{bytes_to_hex, hex_preview, hex_to_bytes};
pub use identifier::{
    ACCESS_HEADER, ATTENDANCE_HEADER, CONSUME_HEADER, Identification, ProtocolIdentifier,
};
pub use locator::{
    ACCESS_DEVICE_ID_WIDTH, DEVICE_ID_OFFSET, DeviceDirectory, DeviceLocator,
    InMemoryDeviceDirectory, LocatedDevice, device_serial, extract_device_id,
};
pub use registry::{
    AdapterCatalog, AdapterHealth, AdapterRegistry, DEFAULT_SN_CACHE_CAPACITY, RegistryHealth,
};
pub use router::{
    DEFAULT_PREVIEW_BYTES, MessageRouter, ProtocolHint, RouteRequest, RoutedMessage,
    RouterBuilder,
};
pub use tcp_server::{
    AcceptorHandle, FrameAcceptor, FrameReply, FrameSink, REPLY_QUEUE_CAPACITY, TcpGatewayConfig,
};
pub use worker::{DrainOutcome, SubmitError, WorkerPool};
