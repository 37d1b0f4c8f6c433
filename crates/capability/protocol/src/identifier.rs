//! 协议识别
//!
//! 设备上报无握手，只能依靠报文开头的固定魔数判断协议。
//! 协议头表在构造时校验：不允许为空、不允许两个协议头相同或互为前缀。

use crate::error::ProtocolError;
use domain::ProtocolType;

/// 考勤协议头
pub const ATTENDANCE_HEADER: [u8; 2] = [0x55, 0xAA];
/// 门禁协议头
pub const ACCESS_HEADER: [u8; 2] = [0xAA, 0x55];
/// 消费协议头
pub const CONSUME_HEADER: [u8; 2] = [0x7E, 0x81];

/// 识别结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identification {
    Identified(ProtocolType),
    Unidentified,
}

impl Identification {
    pub fn protocol(self) -> Option<ProtocolType> {
        match self {
            Self::Identified(protocol) => Some(protocol),
            Self::Unidentified => None,
        }
    }
}

/// 协议识别器（纯函数，无 IO、无可变状态）
#[derive(Debug, Clone)]
pub struct ProtocolIdentifier {
    headers: Vec<(ProtocolType, Vec<u8>)>,
    min_len: usize,
}

impl ProtocolIdentifier {
    /// 使用自定义协议头表构造，冲突时直接失败
    pub fn new(table: Vec<(ProtocolType, Vec<u8>)>) -> Result<Self, ProtocolError> {
        for (protocol, header) in &table {
            if header.is_empty() {
                return Err(ProtocolError::EmptyHeader(*protocol));
            }
        }
        for (i, (first, a)) in table.iter().enumerate() {
            for (second, b) in table.iter().skip(i + 1) {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(ProtocolError::HeaderConflict {
                        first: *first,
                        second: *second,
                    });
                }
            }
        }
        let min_len = table.iter().map(|(_, header)| header.len()).min().unwrap_or(0);
        Ok(Self {
            headers: table,
            min_len,
        })
    }

    /// 内置协议头表
    pub fn standard() -> Self {
        Self {
            headers: vec![
                (ProtocolType::AttendanceV4_0, ATTENDANCE_HEADER.to_vec()),
                (ProtocolType::AccessV4_8, ACCESS_HEADER.to_vec()),
                (ProtocolType::ConsumeV1_0, CONSUME_HEADER.to_vec()),
            ],
            min_len: 2,
        }
    }

    /// 识别所需的最短前缀长度
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn header_of(&self, protocol: ProtocolType) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(candidate, _)| *candidate == protocol)
            .map(|(_, header)| header.as_slice())
    }

    pub fn identify(&self, bytes: &[u8]) -> Identification {
        if self.headers.is_empty() || bytes.len() < self.min_len {
            return Identification::Unidentified;
        }
        self.headers
            .iter()
            .find(|(_, header)| bytes.starts_with(header))
            .map(|(protocol, _)| Identification::Identified(*protocol))
            .unwrap_or(Identification::Unidentified)
    }
}

impl Default for ProtocolIdentifier {
    fn default() -> Self {
        Self::standard()
    }
}
