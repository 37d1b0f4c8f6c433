//! 协议适配器注册表
//!
//! 协议类型 → 适配器，外加两个派生索引：
//! - 设备型号 → 协议类型（随注册/注销重建，键不区分大小写）
//! - 设备序列号 → 协议类型（路由成功后按需写入，后写覆盖；条目数有上限，满后只更新已有条目）
//!
//! 适配器表与型号索引放在同一把读写锁里，查询不会看到半更新的状态。
//! 被替换或移除的适配器在锁外调用 `destroy`。

use crate::adapter::{AdapterStatus, ProtocolAdapter};
use domain::ProtocolType;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// 热加载时提供完整适配器集合
pub trait AdapterCatalog: Send + Sync {
    fn build(&self) -> Vec<Arc<dyn ProtocolAdapter>>;
}

impl<F> AdapterCatalog for F
where
    F: Fn() -> Vec<Arc<dyn ProtocolAdapter>> + Send + Sync,
{
    fn build(&self) -> Vec<Arc<dyn ProtocolAdapter>> {
        self()
    }
}

/// 单个适配器健康状态
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterHealth {
    pub protocol: ProtocolType,
    pub manufacturer: String,
    pub version: String,
    pub status: AdapterStatus,
    pub device_models: Vec<String>,
}

/// 注册表整体健康状态
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHealth {
    pub status: AdapterStatus,
    pub adapters: Vec<AdapterHealth>,
}

impl RegistryHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == AdapterStatus::Running
    }
}

#[derive(Default)]
struct RegistryState {
    adapters: HashMap<ProtocolType, Arc<dyn ProtocolAdapter>>,
    model_index: HashMap<String, ProtocolType>,
}

impl RegistryState {
    fn insert(&mut self, adapter: Arc<dyn ProtocolAdapter>) -> Option<Arc<dyn ProtocolAdapter>> {
        let protocol = adapter.protocol_type();
        let previous = self.remove(protocol);
        for model in adapter.supported_device_models() {
            let key = model_key(model);
            if let Some(existing) = self.model_index.get(&key) {
                if *existing != protocol {
                    warn!(model = %key, from = %existing, to = %protocol, "device model reassigned");
                }
            }
            self.model_index.insert(key, protocol);
        }
        self.adapters.insert(protocol, adapter);
        previous
    }

    fn remove(&mut self, protocol: ProtocolType) -> Option<Arc<dyn ProtocolAdapter>> {
        let removed = self.adapters.remove(&protocol)?;
        self.model_index.retain(|_, indexed| *indexed != protocol);
        // 型号被后注册的协议覆盖后，移除时恢复到仍在注册的适配器
        for (other_protocol, other) in &self.adapters {
            for model in other.supported_device_models() {
                self.model_index
                    .entry(model_key(model))
                    .or_insert(*other_protocol);
            }
        }
        Some(removed)
    }
}

fn model_key(model: &str) -> String {
    model.trim().to_ascii_uppercase()
}

/// 序列号缓存默认条目上限
pub const DEFAULT_SN_CACHE_CAPACITY: usize = 65_536;

/// 协议适配器注册表
pub struct AdapterRegistry {
    state: RwLock<RegistryState>,
    sn_cache: RwLock<HashMap<String, ProtocolType>>,
    sn_cache_capacity: usize,
    catalog: Option<Arc<dyn AdapterCatalog>>,
}

impl AdapterRegistry {
    /// 空注册表（无热加载来源）
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            sn_cache: RwLock::new(HashMap::new()),
            sn_cache_capacity: DEFAULT_SN_CACHE_CAPACITY,
            catalog: None,
        }
    }

    /// 使用适配器来源构造并完成首次注册
    pub fn with_catalog(catalog: Arc<dyn AdapterCatalog>) -> Self {
        let registry = Self {
            state: RwLock::new(RegistryState::default()),
            sn_cache: RwLock::new(HashMap::new()),
            sn_cache_capacity: DEFAULT_SN_CACHE_CAPACITY,
            catalog: Some(catalog),
        };
        registry.reload();
        registry
    }

    /// 调整序列号缓存上限（至少为 1）
    pub fn with_sn_cache_capacity(mut self, capacity: usize) -> Self {
        self.sn_cache_capacity = capacity.max(1);
        self
    }

    pub fn sn_cache_len(&self) -> usize {
        self.sn_cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 注册适配器；同协议已存在时原子替换
    pub fn register(&self, adapter: Arc<dyn ProtocolAdapter>) {
        let protocol = adapter.protocol_type();
        let models = adapter.supported_device_models().len();
        let previous = self.write_state().insert(adapter);
        if let Some(previous) = previous {
            previous.destroy();
            info!(protocol = %protocol, models, "adapter replaced");
        } else {
            info!(protocol = %protocol, models, "adapter registered");
        }
    }

    /// 注销适配器，同时清理型号索引与序列号缓存
    pub fn unregister(&self, protocol: ProtocolType) -> bool {
        let removed = self.write_state().remove(protocol);
        let Some(removed) = removed else {
            return false;
        };
        self.sn_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, cached| *cached != protocol);
        removed.destroy();
        info!(protocol = %protocol, "adapter unregistered");
        true
    }

    pub fn get_adapter(&self, protocol: ProtocolType) -> Option<Arc<dyn ProtocolAdapter>> {
        self.read_state().adapters.get(&protocol).cloned()
    }

    pub fn get_adapter_by_device_model(&self, model: &str) -> Option<Arc<dyn ProtocolAdapter>> {
        let state = self.read_state();
        let protocol = state.model_index.get(&model_key(model))?;
        state.adapters.get(protocol).cloned()
    }

    pub fn get_adapter_by_device_sn(&self, serial: &str) -> Option<Arc<dyn ProtocolAdapter>> {
        let protocol = self.cached_protocol(serial)?;
        self.get_adapter(protocol)
    }

    /// 序列号缓存中的协议类型
    pub fn cached_protocol(&self, serial: &str) -> Option<ProtocolType> {
        self.sn_cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(serial.trim())
            .copied()
    }

    /// 写入序列号缓存；协议未注册时忽略，保证缓存不指向未注册协议
    ///
    /// 缓存已满时只更新已有序列号，新序列号被拒绝。
    pub fn cache_device_sn(&self, serial: &str, protocol: ProtocolType) -> bool {
        let serial = serial.trim();
        if serial.is_empty() {
            return false;
        }
        // 持有状态读锁直到写入完成，避免与并发注销交错
        let state = self.read_state();
        if !state.adapters.contains_key(&protocol) {
            return false;
        }
        let mut cache = self.sn_cache.write().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get_mut(serial) {
            *cached = protocol;
            return true;
        }
        if cache.len() >= self.sn_cache_capacity {
            warn!(
                serial,
                capacity = self.sn_cache_capacity,
                "device serial cache full, entry not cached"
            );
            return false;
        }
        cache.insert(serial.to_string(), protocol);
        true
    }

    pub fn invalidate_device_sn(&self, serial: &str) -> bool {
        self.sn_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(serial.trim())
            .is_some()
    }

    /// 热加载：按适配器来源整体重建，单次写锁内完成替换
    pub fn reload(&self) -> usize {
        let Some(catalog) = &self.catalog else {
            warn!("reload requested without adapter catalog");
            return self.len();
        };
        let mut next = RegistryState::default();
        for adapter in catalog.build() {
            if let Some(duplicate) = next.insert(adapter) {
                warn!(protocol = %duplicate.protocol_type(), "duplicate adapter in catalog, keeping last");
                duplicate.destroy();
            }
        }
        let count = next.adapters.len();
        let previous = {
            let mut state = self.write_state();
            // 型号索引随状态一起替换；序列号缓存在同一临界区内清空
            self.sn_cache
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
            std::mem::replace(&mut *state, next)
        };
        for adapter in previous.adapters.into_values() {
            adapter.destroy();
        }
        info!(adapters = count, "adapter registry reloaded");
        count
    }

    pub fn health(&self) -> RegistryHealth {
        let state = self.read_state();
        let mut adapters: Vec<AdapterHealth> = state
            .adapters
            .values()
            .map(|adapter| AdapterHealth {
                protocol: adapter.protocol_type(),
                manufacturer: adapter.manufacturer().to_string(),
                version: adapter.version().to_string(),
                status: adapter.status(),
                device_models: adapter
                    .supported_device_models()
                    .iter()
                    .map(|model| model.to_string())
                    .collect(),
            })
            .collect();
        adapters.sort_by_key(|item| item.protocol.index());
        let status = adapters
            .iter()
            .map(|item| item.status)
            .max()
            .unwrap_or(AdapterStatus::Running);
        RegistryHealth { status, adapters }
    }

    pub fn protocol_types(&self) -> Vec<ProtocolType> {
        let mut protocols: Vec<ProtocolType> = self.read_state().adapters.keys().copied().collect();
        protocols.sort_by_key(|protocol| protocol.index());
        protocols
    }

    pub fn len(&self) -> usize {
        self.read_state().adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::LoggingMessageSink;
    use crate::adapters::{AccessEntropyV48Adapter, StandardCatalog, build_adapter};

    fn sink() -> Arc<LoggingMessageSink> {
        Arc::new(LoggingMessageSink)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = AdapterRegistry::new();
        let adapter: Arc<dyn ProtocolAdapter> = Arc::new(AccessEntropyV48Adapter::new(sink()));
        registry.register(Arc::clone(&adapter));

        let found = registry.get_adapter(ProtocolType::AccessV4_8).unwrap();
        assert!(Arc::ptr_eq(&found, &adapter));
        assert!(registry.get_adapter_by_device_model("ma300t").is_some());
        assert!(registry.get_adapter_by_device_model(" SC705 ").is_some());
        assert!(registry.get_adapter(ProtocolType::ConsumeV1_0).is_none());
    }

    #[test]
    fn test_unregister_clears_indices() {
        let registry = AdapterRegistry::new();
        registry.register(build_adapter(ProtocolType::AccessV4_8, sink()));
        assert!(registry.cache_device_sn("00000101", ProtocolType::AccessV4_8));

        assert!(registry.unregister(ProtocolType::AccessV4_8));
        assert!(registry.get_adapter(ProtocolType::AccessV4_8).is_none());
        assert!(registry.get_adapter_by_device_model("MA300").is_none());
        assert!(registry.get_adapter_by_device_sn("00000101").is_none());
        assert!(registry.cached_protocol("00000101").is_none());
        assert!(!registry.unregister(ProtocolType::AccessV4_8));
    }

    #[test]
    fn test_shared_model_falls_back_after_unregister() {
        let registry = AdapterRegistry::new();
        // SC700 同时出现在门禁与消费型号表中
        registry.register(build_adapter(ProtocolType::AccessV4_8, sink()));
        registry.register(build_adapter(ProtocolType::ConsumeV1_0, sink()));
        let owner = registry.get_adapter_by_device_model("SC700").unwrap();
        assert_eq!(owner.protocol_type(), ProtocolType::ConsumeV1_0);

        registry.unregister(ProtocolType::ConsumeV1_0);
        let owner = registry.get_adapter_by_device_model("SC700").unwrap();
        assert_eq!(owner.protocol_type(), ProtocolType::AccessV4_8);
    }

    #[test]
    fn test_replace_destroys_previous() {
        let registry = AdapterRegistry::new();
        let first = build_adapter(ProtocolType::ConsumeV1_0, sink());
        registry.register(Arc::clone(&first));
        registry.register(build_adapter(ProtocolType::ConsumeV1_0, sink()));
        assert_eq!(registry.len(), 1);
        assert_eq!(first.status(), AdapterStatus::Error);
        assert!(registry.health().is_healthy());
    }

    #[test]
    fn test_cache_ignores_unregistered_protocol() {
        let registry = AdapterRegistry::new();
        assert!(!registry.cache_device_sn("42", ProtocolType::AttendanceV4_0));
        assert!(!registry.cache_device_sn("  ", ProtocolType::AttendanceV4_0));
    }

    #[test]
    fn test_cache_is_bounded() {
        let registry = AdapterRegistry::new().with_sn_cache_capacity(2);
        registry.register(build_adapter(ProtocolType::AttendanceV4_0, sink()));
        registry.register(build_adapter(ProtocolType::ConsumeV1_0, sink()));

        assert!(registry.cache_device_sn("1", ProtocolType::AttendanceV4_0));
        assert!(registry.cache_device_sn("2", ProtocolType::AttendanceV4_0));
        assert!(!registry.cache_device_sn("3", ProtocolType::AttendanceV4_0));
        assert_eq!(registry.sn_cache_len(), 2);
        assert!(registry.cached_protocol("3").is_none());

        // 已有条目仍可被覆盖
        assert!(registry.cache_device_sn("2", ProtocolType::ConsumeV1_0));
        assert_eq!(registry.cached_protocol("2"), Some(ProtocolType::ConsumeV1_0));

        // 注销释放条目后可以再写入
        registry.invalidate_device_sn("1");
        assert!(registry.cache_device_sn("3", ProtocolType::AttendanceV4_0));
        assert_eq!(registry.sn_cache_len(), 2);
    }

    #[test]
    fn test_reload_rebuilds_from_catalog() {
        let registry = AdapterRegistry::with_catalog(Arc::new(StandardCatalog::new(
            vec![ProtocolType::AttendanceV4_0, ProtocolType::ConsumeV1_0],
            sink(),
        )));
        assert_eq!(
            registry.protocol_types(),
            vec![ProtocolType::AttendanceV4_0, ProtocolType::ConsumeV1_0]
        );
        let before = registry.get_adapter(ProtocolType::AttendanceV4_0).unwrap();
        registry.cache_device_sn("42", ProtocolType::AttendanceV4_0);
        registry.unregister(ProtocolType::ConsumeV1_0);

        assert_eq!(registry.reload(), 2);
        let after = registry.get_adapter(ProtocolType::AttendanceV4_0).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.status(), AdapterStatus::Error);
        assert!(registry.get_adapter(ProtocolType::ConsumeV1_0).is_some());
        assert!(registry.cached_protocol("42").is_none());
    }

    #[test]
    fn test_health_aggregates_worst_status() {
        let registry = AdapterRegistry::new();
        assert!(registry.health().is_healthy());
        let adapter = build_adapter(ProtocolType::AttendanceV4_0, sink());
        registry.register(Arc::clone(&adapter));
        registry.register(build_adapter(ProtocolType::AccessV4_8, sink()));
        assert!(registry.health().is_healthy());

        adapter.destroy();
        let health = registry.health();
        assert_eq!(health.status, AdapterStatus::Error);
        assert_eq!(health.adapters.len(), 2);
        assert_eq!(health.adapters[0].protocol, ProtocolType::AttendanceV4_0);
    }
}
