//! 设备定位
//!
//! 按协议约定的偏移从报文中提取设备 ID；提取失败时按对端 IP 查询设备目录，
//! 仍失败则返回占位 ID 并标记为低可信度。

use domain::{DeviceConfidence, ProtocolType, SENTINEL_DEVICE_ID};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// 设备 ID 在报文中的起始偏移（紧跟 2 字节协议头）
pub const DEVICE_ID_OFFSET: usize = 2;
/// 门禁协议 ASCII 设备编号宽度
pub const ACCESS_DEVICE_ID_WIDTH: usize = 8;

/// 设备目录（外部协作方）：对端 IP → 设备 ID
pub trait DeviceDirectory: Send + Sync {
    fn lookup_by_ip(&self, ip: IpAddr) -> Option<i64>;
}

/// 内存设备目录
#[derive(Default)]
pub struct InMemoryDeviceDirectory {
    entries: RwLock<HashMap<IpAddr, i64>>,
}

impl InMemoryDeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: HashMap<IpAddr, i64>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// 注册设备映射
    pub fn register(&self, ip: IpAddr, device_id: i64) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(ip, device_id);
    }
}

impl DeviceDirectory for InMemoryDeviceDirectory {
    fn lookup_by_ip(&self, ip: IpAddr) -> Option<i64> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&ip).copied()
    }
}

/// 定位结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedDevice {
    pub device_id: i64,
    pub confidence: DeviceConfidence,
}

/// 设备定位器
#[derive(Clone)]
pub struct DeviceLocator {
    directory: Option<Arc<dyn DeviceDirectory>>,
}

impl DeviceLocator {
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        Self {
            directory: Some(directory),
        }
    }

    /// 不带设备目录的定位器（提取失败直接回落到占位 ID）
    pub fn without_directory() -> Self {
        Self { directory: None }
    }

    pub fn locate(&self, payload: &[u8], protocol: ProtocolType, peer_ip: IpAddr) -> LocatedDevice {
        if let Some(device_id) = extract_device_id(payload, protocol) {
            return LocatedDevice {
                device_id,
                confidence: DeviceConfidence::Extracted,
            };
        }
        if let Some(device_id) = self
            .directory
            .as_ref()
            .and_then(|directory| directory.lookup_by_ip(peer_ip))
        {
            debug!(protocol = %protocol, peer = %peer_ip, device_id, "device resolved by peer ip");
            return LocatedDevice {
                device_id,
                confidence: DeviceConfidence::Directory,
            };
        }
        LocatedDevice {
            device_id: SENTINEL_DEVICE_ID,
            confidence: DeviceConfidence::Sentinel,
        }
    }
}

/// 按协议偏移提取设备 ID
pub fn extract_device_id(payload: &[u8], protocol: ProtocolType) -> Option<i64> {
    match protocol {
        ProtocolType::AttendanceV4_0 | ProtocolType::ConsumeV1_0 => {
            read_u32_le(payload, DEVICE_ID_OFFSET).map(i64::from)
        }
        ProtocolType::AccessV4_8 => read_ascii_decimal(payload, DEVICE_ID_OFFSET, ACCESS_DEVICE_ID_WIDTH),
    }
}

/// 设备序列号（设备 ID 字段的文本形式），用于序列号缓存
pub fn device_serial(payload: &[u8], protocol: ProtocolType) -> Option<String> {
    match protocol {
        ProtocolType::AccessV4_8 => {
            let field = payload.get(DEVICE_ID_OFFSET..DEVICE_ID_OFFSET + ACCESS_DEVICE_ID_WIDTH)?;
            let text = std::str::from_utf8(field).ok()?;
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            (!text.is_empty()).then(|| text.to_string())
        }
        _ => extract_device_id(payload, protocol).map(|id| id.to_string()),
    }
}

pub(crate) fn read_u32_le(payload: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = payload.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

pub(crate) fn read_ascii_decimal(payload: &[u8], offset: usize, width: usize) -> Option<i64> {
    let field = payload.get(offset..offset + width)?;
    let text = std::str::from_utf8(field).ok()?;
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<i64>().ok()
}
