//! 协议适配器契约
//!
//! 每个厂商/版本一个适配器：提供静态元数据供注册表建立索引，
//! `parse` 只负责报文结构，`process` 只负责业务动作，两类失败互不混淆。

use crate::error::{ParseError, ProcessError};
use async_trait::async_trait;
use domain::{NormalizedMessage, ProtocolType};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use tracing::info;

/// 适配器运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterStatus {
    Running,
    Degraded,
    Error,
}

impl AdapterStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Degraded,
            _ => Self::Error,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Degraded => 1,
            Self::Error => 2,
        }
    }
}

/// 协议适配器
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn protocol_type(&self) -> ProtocolType;

    fn manufacturer(&self) -> &str {
        self.protocol_type().manufacturer()
    }

    fn version(&self) -> &str {
        self.protocol_type().version()
    }

    fn supported_device_models(&self) -> &[&'static str];

    /// 解析原始字节；设备 ID 由路由器定位后回填
    fn parse(&self, payload: &[u8]) -> Result<NormalizedMessage, ParseError>;

    async fn process(&self, message: &NormalizedMessage, device_id: i64)
    -> Result<(), ProcessError>;

    /// 按处理结果构造回写给设备的应答帧；`None` 表示该消息无需应答
    fn build_response(
        &self,
        _message: &NormalizedMessage,
        _outcome: Result<(), &ProcessError>,
    ) -> Option<Vec<u8>> {
        None
    }

    fn status(&self) -> AdapterStatus;

    /// 注销或关停时释放资源
    fn destroy(&self);
}

/// 下游业务接收方（持久化、规则评估等，不在本层实现）
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: &NormalizedMessage) -> Result<(), ProcessError>;
}

/// 仅记录日志的接收方
#[derive(Debug, Default)]
pub struct LoggingMessageSink;

#[async_trait]
impl MessageSink for LoggingMessageSink {
    async fn deliver(&self, message: &NormalizedMessage) -> Result<(), ProcessError> {
        info!(
            protocol = %message.protocol_type,
            device_id = message.device_id,
            message_type = %message.message_type,
            confidence = ?message.confidence,
            "routed message delivered"
        );
        Ok(())
    }
}

/// 连续失败达到该次数后降级
pub const DEGRADE_AFTER_FAILURES: u32 = 3;

/// 适配器状态跟踪：连续处理失败降级，成功恢复，销毁后置为 Error
#[derive(Debug, Default)]
pub struct StatusTracker {
    status: AtomicU8,
    consecutive_failures: AtomicU32,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> AdapterStatus {
        AdapterStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_destroyed(&self) -> bool {
        self.status() == AdapterStatus::Error
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let _ = self.status.compare_exchange(
            AdapterStatus::Degraded.as_u8(),
            AdapterStatus::Running.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= DEGRADE_AFTER_FAILURES {
            let _ = self.status.compare_exchange(
                AdapterStatus::Running.as_u8(),
                AdapterStatus::Degraded.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    pub fn mark_destroyed(&self) {
        self.status
            .store(AdapterStatus::Error.as_u8(), Ordering::Release);
    }
}
