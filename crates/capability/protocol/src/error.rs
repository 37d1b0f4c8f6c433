//! 协议层错误类型定义

use domain::ProtocolType;
use devcomm_telemetry::RouteErrorCategory;

/// 协议层基础设施错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// 协议头表冲突（两个协议头相同或互为前缀）
    #[error("protocol header conflict: {first} and {second}")]
    HeaderConflict {
        first: ProtocolType,
        second: ProtocolType,
    },

    /// 协议头为空
    #[error("empty protocol header for {0}")]
    EmptyHeader(ProtocolType),

    /// 十六进制字符串非法
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
}

/// 适配器报文解析错误（报文结构问题）
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub message: String,
}

impl ParseError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn too_short(expected: usize, actual: usize) -> Self {
        Self::new(
            "FRAME_TOO_SHORT",
            format!("expected at least {expected} bytes, got {actual}"),
        )
    }
}

/// 适配器业务处理错误（报文结构合法但处理失败）
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ProcessError {
    pub code: &'static str,
    pub message: String,
}

impl ProcessError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// 单帧路由失败
///
/// 所有变体都只影响当前帧，不会向接入循环或其他连接传播。
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// 协议头无法识别或帧过短
    #[error("unidentified frame from {peer}: {preview}")]
    Unidentified { peer: String, preview: String },

    /// 协议已识别但未注册适配器
    #[error("no adapter registered for {0}")]
    HandlerNotFound(ProtocolType),

    /// 十六进制报文无法转换为字节
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),

    /// 适配器拒绝报文结构
    #[error("parse failed for {protocol}: {source}")]
    Parse {
        protocol: ProtocolType,
        #[source]
        source: ParseError,
    },

    /// 适配器处理失败
    #[error("process failed for {protocol} (device {device_id}): {source}")]
    Process {
        protocol: ProtocolType,
        device_id: i64,
        #[source]
        source: ProcessError,
    },

    /// 工作池已满
    #[error("worker pool saturated")]
    Backpressure,

    /// 路由器已关闭
    #[error("router is shut down")]
    ShutDown,

    /// 工作任务异常终止
    #[error("route task aborted: {0}")]
    Aborted(String),
}

impl RouteError {
    /// 对外暴露的失败类别
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unidentified { .. } => "UNIDENTIFIED",
            Self::HandlerNotFound(_) => RouteErrorCategory::HandlerNotFound.as_str(),
            Self::InvalidHex(_) | Self::Parse { .. } => RouteErrorCategory::ParseError.as_str(),
            Self::Process { .. } => RouteErrorCategory::ProcessError.as_str(),
            Self::Backpressure => "BACKPRESSURE",
            Self::ShutDown => "SHUTDOWN",
            Self::Aborted(_) => "ABORTED",
        }
    }
}
