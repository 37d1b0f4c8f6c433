//! 网关运行配置加载。

use domain::ProtocolType;
use std::collections::HashMap;
use std::env;
use std::net::IpAddr;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_addr: String,
    pub tcp_addr: String,
    pub read_buffer_bytes: usize,
    pub max_connections: usize,
    pub idle_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub worker_threads: usize,
    pub max_in_flight: usize,
    pub shutdown_grace_ms: u64,
    pub sn_cache_capacity: usize,
    pub enabled_protocols: Vec<ProtocolType>,
    pub device_directory: HashMap<IpAddr, i64>,
}

impl GatewayConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("DEVCOMM_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let tcp_addr = env::var("DEVCOMM_TCP_ADDR").unwrap_or_else(|_| "0.0.0.0:9000".to_string());
        let read_buffer_bytes = read_positive_usize("DEVCOMM_READ_BUFFER_BYTES", 4096)?;
        let max_connections = read_positive_usize("DEVCOMM_MAX_CONNECTIONS", 1024)?;
        let idle_timeout_seconds = read_positive_u64("DEVCOMM_IDLE_TIMEOUT_SECONDS", 300)?;
        let poll_interval_ms = read_positive_u64("DEVCOMM_POLL_INTERVAL_MS", 500)?;
        let worker_threads = read_positive_usize("DEVCOMM_WORKER_THREADS", 4)?;
        let max_in_flight = read_positive_usize("DEVCOMM_MAX_IN_FLIGHT", 1024)?;
        let shutdown_grace_ms = read_u64_with_default("DEVCOMM_SHUTDOWN_GRACE_MS", 5000)?;
        let sn_cache_capacity = read_positive_usize("DEVCOMM_SN_CACHE_CAPACITY", 65_536)?;
        let enabled_protocols = match read_optional("DEVCOMM_ENABLED_PROTOCOLS") {
            Some(value) => parse_protocols("DEVCOMM_ENABLED_PROTOCOLS", &value)?,
            None => ProtocolType::ALL.to_vec(),
        };
        let device_directory = match read_optional("DEVCOMM_DEVICE_DIRECTORY") {
            Some(value) => parse_directory("DEVCOMM_DEVICE_DIRECTORY", &value)?,
            None => HashMap::new(),
        };

        Ok(Self {
            http_addr,
            tcp_addr,
            read_buffer_bytes,
            max_connections,
            idle_timeout_seconds,
            poll_interval_ms,
            worker_threads,
            max_in_flight,
            shutdown_grace_ms,
            sn_cache_capacity,
            enabled_protocols,
            device_directory,
        })
    }
}

/// 解析逗号分隔的协议编码列表（重复项去重，保持顺序）。
pub fn parse_protocols(key: &str, value: &str) -> Result<Vec<ProtocolType>, ConfigError> {
    let mut protocols = Vec::new();
    for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let protocol = item
            .parse::<ProtocolType>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), item.to_string()))?;
        if !protocols.contains(&protocol) {
            protocols.push(protocol);
        }
    }
    Ok(protocols)
}

/// 解析 `ip=deviceId` 逗号分隔列表。
pub fn parse_directory(key: &str, value: &str) -> Result<HashMap<IpAddr, i64>, ConfigError> {
    let mut directory = HashMap::new();
    for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let invalid = || ConfigError::Invalid(key.to_string(), item.to_string());
        let (ip, device_id) = item.split_once('=').ok_or_else(invalid)?;
        let ip = ip.trim().parse::<IpAddr>().map_err(|_| invalid())?;
        let device_id = device_id.trim().parse::<i64>().map_err(|_| invalid())?;
        directory.insert(ip, device_id);
    }
    Ok(directory)
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match read_u64_with_default(key, default)? {
        0 => Err(ConfigError::Invalid(key.to_string(), "0".to_string())),
        parsed => Ok(parsed),
    }
}

fn read_positive_usize(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
