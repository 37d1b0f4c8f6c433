//! 按协议统计的路由指标。
//!
//! 所有计数器均为原子量，热路径上不加锁；协议维度使用 `ProtocolType::index` 定长数组。

use domain::ProtocolType;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 耗时分布桶上界（毫秒），最后一个桶为 +Inf。
pub const DURATION_BUCKETS_MS: [u64; 7] = [1, 5, 10, 50, 100, 500, 1000];

const BUCKET_COUNT: usize = DURATION_BUCKETS_MS.len() + 1;
const PROTOCOL_COUNT: usize = ProtocolType::ALL.len();

/// 可归属到具体协议的失败类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteErrorCategory {
    HandlerNotFound,
    ParseError,
    ProcessError,
}

impl RouteErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HandlerNotFound => "HANDLER_NOT_FOUND",
            Self::ParseError => "PARSE_ERROR",
            Self::ProcessError => "PROCESS_ERROR",
        }
    }
}

#[derive(Default)]
struct ProtocolCounters {
    success: AtomicU64,
    handler_not_found: AtomicU64,
    parse_error: AtomicU64,
    process_error: AtomicU64,
    duration_ms_total: AtomicU64,
    duration_ms_count: AtomicU64,
    duration_buckets: [AtomicU64; BUCKET_COUNT],
}

impl ProtocolCounters {
    fn observe(&self, duration: Duration) {
        let millis = duration.as_millis().min(u64::MAX as u128) as u64;
        self.duration_ms_total.fetch_add(millis, Ordering::Relaxed);
        self.duration_ms_count.fetch_add(1, Ordering::Relaxed);
        let bucket = DURATION_BUCKETS_MS
            .iter()
            .position(|upper| millis <= *upper)
            .unwrap_or(DURATION_BUCKETS_MS.len());
        self.duration_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, protocol: ProtocolType) -> ProtocolMetricsSnapshot {
        ProtocolMetricsSnapshot {
            protocol,
            success: self.success.load(Ordering::Relaxed),
            handler_not_found: self.handler_not_found.load(Ordering::Relaxed),
            parse_error: self.parse_error.load(Ordering::Relaxed),
            process_error: self.process_error.load(Ordering::Relaxed),
            duration_ms_total: self.duration_ms_total.load(Ordering::Relaxed),
            duration_ms_count: self.duration_ms_count.load(Ordering::Relaxed),
            duration_buckets: self
                .duration_buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

/// 单协议指标快照。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMetricsSnapshot {
    pub protocol: ProtocolType,
    pub success: u64,
    pub handler_not_found: u64,
    pub parse_error: u64,
    pub process_error: u64,
    pub duration_ms_total: u64,
    pub duration_ms_count: u64,
    /// 与 `DURATION_BUCKETS_MS` 对齐，末尾多一个 +Inf 桶（非累积）。
    pub duration_buckets: Vec<u64>,
}

/// 路由指标快照。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMetricsSnapshot {
    pub frames_received: u64,
    pub unidentified: u64,
    pub backpressure: u64,
    pub low_confidence: u64,
    pub protocols: Vec<ProtocolMetricsSnapshot>,
}

impl RoutingMetricsSnapshot {
    pub fn protocol(&self, protocol: ProtocolType) -> Option<&ProtocolMetricsSnapshot> {
        self.protocols.iter().find(|item| item.protocol == protocol)
    }
}

/// 路由指标。
#[derive(Default)]
pub struct RoutingMetrics {
    frames_received: AtomicU64,
    unidentified: AtomicU64,
    backpressure: AtomicU64,
    low_confidence: AtomicU64,
    protocols: [ProtocolCounters; PROTOCOL_COUNT],
}

impl RoutingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录进入路由的帧。
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录协议识别失败（无处理器可选）。
    pub fn record_unidentified(&self) {
        self.unidentified.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录工作池饱和导致的丢弃。
    pub fn record_backpressure(&self) {
        self.backpressure.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录使用占位设备 ID 的帧。
    pub fn record_low_confidence(&self) {
        self.low_confidence.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录成功路由及耗时。
    pub fn record_success(&self, protocol: ProtocolType, duration: Duration) {
        let counters = &self.protocols[protocol.index()];
        counters.success.fetch_add(1, Ordering::Relaxed);
        counters.observe(duration);
    }

    /// 记录失败路由及耗时。
    pub fn record_error(
        &self,
        protocol: ProtocolType,
        category: RouteErrorCategory,
        duration: Duration,
    ) {
        let counters = &self.protocols[protocol.index()];
        let counter = match category {
            RouteErrorCategory::HandlerNotFound => &counters.handler_not_found,
            RouteErrorCategory::ParseError => &counters.parse_error,
            RouteErrorCategory::ProcessError => &counters.process_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        counters.observe(duration);
    }

    pub fn snapshot(&self) -> RoutingMetricsSnapshot {
        RoutingMetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            unidentified: self.unidentified.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
            low_confidence: self.low_confidence.load(Ordering::Relaxed),
            protocols: ProtocolType::ALL
                .into_iter()
                .map(|protocol| self.protocols[protocol.index()].snapshot(protocol))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_errors_are_counted_per_protocol() {
        let metrics = RoutingMetrics::new();
        metrics.record_success(ProtocolType::AttendanceV4_0, Duration::from_millis(3));
        metrics.record_error(
            ProtocolType::AccessV4_8,
            RouteErrorCategory::ParseError,
            Duration::from_millis(0),
        );
        metrics.record_error(
            ProtocolType::AccessV4_8,
            RouteErrorCategory::ProcessError,
            Duration::from_millis(2_000),
        );

        let snapshot = metrics.snapshot();
        let attendance = snapshot.protocol(ProtocolType::AttendanceV4_0).expect("attendance");
        assert_eq!(attendance.success, 1);
        assert_eq!(attendance.duration_buckets[1], 1);

        let access = snapshot.protocol(ProtocolType::AccessV4_8).expect("access");
        assert_eq!(access.success, 0);
        assert_eq!(access.parse_error, 1);
        assert_eq!(access.process_error, 1);
        assert_eq!(access.duration_ms_count, 2);
        assert_eq!(access.duration_buckets[0], 1);
        assert_eq!(access.duration_buckets[DURATION_BUCKETS_MS.len()], 1);
    }

    #[test]
    fn global_counters_are_independent() {
        let metrics = RoutingMetrics::new();
        metrics.record_frame_received();
        metrics.record_frame_received();
        metrics.record_unidentified();
        metrics.record_backpressure();
        metrics.record_low_confidence();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.unidentified, 1);
        assert_eq!(snapshot.backpressure, 1);
        assert_eq!(snapshot.low_confidence, 1);
        assert_eq!(snapshot.protocols.len(), ProtocolType::ALL.len());
    }
}
