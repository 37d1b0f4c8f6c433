use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 协议类型（注册表主键）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolType {
    #[serde(rename = "ATTENDANCE_ENTROPY_V4_0")]
    AttendanceV4_0,
    #[serde(rename = "ACCESS_ENTROPY_V4_8")]
    AccessV4_8,
    #[serde(rename = "CONSUME_ZKTECO_V1_0")]
    ConsumeV1_0,
}

/// 未知协议编码。
#[derive(Debug, thiserror::Error)]
#[error("unknown protocol type: {0}")]
pub struct UnknownProtocol(pub String);

impl ProtocolType {
    pub const ALL: [ProtocolType; 3] = [Self::AttendanceV4_0, Self::AccessV4_8, Self::ConsumeV1_0];

    /// 稳定编码。
    pub fn code(self) -> &'static str {
        match self {
            Self::AttendanceV4_0 => "ATTENDANCE_ENTROPY_V4_0",
            Self::AccessV4_8 => "ACCESS_ENTROPY_V4_8",
            Self::ConsumeV1_0 => "CONSUME_ZKTECO_V1_0",
        }
    }

    pub fn manufacturer(self) -> &'static str {
        match self {
            Self::AttendanceV4_0 | Self::AccessV4_8 => "熵基科技",
            Self::ConsumeV1_0 => "中控智慧",
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            Self::AttendanceV4_0 => "V4.0",
            Self::AccessV4_8 => "V4.8",
            Self::ConsumeV1_0 => "V1.0",
        }
    }

    /// 稠密下标，用于无锁指标数组。
    pub fn index(self) -> usize {
        match self {
            Self::AttendanceV4_0 => 0,
            Self::AccessV4_8 => 1,
            Self::ConsumeV1_0 => 2,
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ProtocolType {
    type Err = UnknownProtocol;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|protocol| protocol.code() == normalized)
            .ok_or_else(|| UnknownProtocol(value.to_string()))
    }
}
