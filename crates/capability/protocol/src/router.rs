//! 消息路由
//!
//! 单帧流程：识别协议 → 定位设备 → 查找适配器 → parse → process → 应答 → 记录指标。
//! 所有步骤在工作池上执行，调用方只拿到 future；每帧的失败互相独立，不做重试。

use crate::adapter::ProtocolAdapter;
use crate::error::{ParseError, ProtocolError, RouteError};
use crate::hex_codec::{hex_preview, hex_to_bytes};
use crate::identifier::ProtocolIdentifier;
use crate::locator::{DeviceLocator, LocatedDevice, device_serial};
use crate::registry::AdapterRegistry;
use crate::tcp_server::{FrameReply, FrameSink};
use crate::worker::{DrainOutcome, SubmitError, WorkerPool};
use devcomm_telemetry::{RouteErrorCategory, RoutingMetrics};
use domain::{DeviceConfidence, NormalizedMessage, ProtocolType, RawFrame};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 日志中报文预览的默认字节数
pub const DEFAULT_PREVIEW_BYTES: usize = 32;

/// 调用方已知的协议线索（HTTP 推送时常带型号或序列号）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProtocolHint {
    #[default]
    None,
    Type(ProtocolType),
    DeviceModel(String),
    DeviceSn(String),
}

/// 路由请求
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub frame: RawFrame,
    pub hint: ProtocolHint,
    /// 帧所在连接的回写通道；HTTP 推送没有连接
    pub reply: Option<FrameReply>,
}

impl RouteRequest {
    pub fn new(frame: RawFrame, hint: ProtocolHint) -> Self {
        Self {
            frame,
            hint,
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: FrameReply) -> Self {
        self.reply = Some(reply);
        self
    }

    /// 无线索的原始帧（TCP 接入）
    pub fn raw(frame: RawFrame) -> Self {
        Self::new(frame, ProtocolHint::None)
    }
}

/// 路由成功结果
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    pub message: NormalizedMessage,
    pub duration: Duration,
    /// 适配器给出的设备应答帧
    pub response: Option<Vec<u8>>,
}

struct RouterCore {
    registry: Arc<AdapterRegistry>,
    identifier: ProtocolIdentifier,
    locator: DeviceLocator,
    metrics: Arc<RoutingMetrics>,
    preview_bytes: usize,
}

impl RouterCore {
    fn resolve_protocol(&self, payload: &[u8], hint: &ProtocolHint) -> Option<ProtocolType> {
        let hinted = match hint {
            ProtocolHint::None => None,
            ProtocolHint::Type(protocol) => Some(*protocol),
            ProtocolHint::DeviceModel(model) => self
                .registry
                .get_adapter_by_device_model(model)
                .map(|adapter| adapter.protocol_type()),
            ProtocolHint::DeviceSn(serial) => self.registry.cached_protocol(serial),
        };
        hinted.or_else(|| self.identifier.identify(payload).protocol())
    }

    async fn route_frame(&self, request: RouteRequest) -> Result<RoutedMessage, RouteError> {
        let started = Instant::now();
        self.metrics.record_frame_received();
        let RouteRequest { frame, hint, reply } = request;
        let peer = frame.peer_addr;

        let Some(protocol) = self.resolve_protocol(&frame.payload, &hint) else {
            self.metrics.record_unidentified();
            let preview = hex_preview(&frame.payload, self.preview_bytes);
            warn!(peer = %peer, len = frame.payload.len(), preview = %preview, "unidentified frame dropped");
            return Err(RouteError::Unidentified {
                peer: peer.to_string(),
                preview,
            });
        };

        let located = self.locator.locate(&frame.payload, protocol, peer.ip());
        if located.confidence.is_low() {
            self.metrics.record_low_confidence();
            warn!(
                protocol = %protocol,
                peer = %peer,
                device_id = located.device_id,
                "device unresolved, frame routed with sentinel id"
            );
        }

        let Some(adapter) = self.registry.get_adapter(protocol) else {
            let duration = started.elapsed();
            self.metrics
                .record_error(protocol, RouteErrorCategory::HandlerNotFound, duration);
            warn!(protocol = %protocol, peer = %peer, device_id = located.device_id, "no adapter registered");
            return Err(RouteError::HandlerNotFound(protocol));
        };

        let message = match self.parse(adapter.as_ref(), &frame, located) {
            Ok(message) => message,
            Err(source) => {
                let duration = started.elapsed();
                self.metrics
                    .record_error(protocol, RouteErrorCategory::ParseError, duration);
                warn!(
                    protocol = %protocol,
                    device_id = located.device_id,
                    duration_ms = duration.as_millis() as u64,
                    preview = %hex_preview(&frame.payload, self.preview_bytes),
                    error = %source,
                    "frame parse failed"
                );
                return Err(RouteError::Parse { protocol, source });
            }
        };

        let outcome = adapter.process(&message, located.device_id).await;
        let response = adapter.build_response(&message, outcome.as_ref().map(|_| ()));
        if let (Some(reply), Some(bytes)) = (reply.as_ref(), response.as_ref()) {
            if !reply.send(bytes.clone()) {
                debug!(peer = %reply.peer(), protocol = %protocol, "connection gone, response dropped");
            }
        }

        if let Err(source) = outcome {
            let duration = started.elapsed();
            self.metrics
                .record_error(protocol, RouteErrorCategory::ProcessError, duration);
            warn!(
                protocol = %protocol,
                device_id = located.device_id,
                message_type = %message.message_type,
                duration_ms = duration.as_millis() as u64,
                error = %source,
                "frame process failed"
            );
            return Err(RouteError::Process {
                protocol,
                device_id: located.device_id,
                source,
            });
        }

        let duration = started.elapsed();
        self.metrics.record_success(protocol, duration);
        if located.confidence == DeviceConfidence::Extracted {
            if let Some(serial) = device_serial(&frame.payload, protocol) {
                self.registry.cache_device_sn(&serial, protocol);
            }
        }
        debug!(
            protocol = %protocol,
            device_id = located.device_id,
            message_type = %message.message_type,
            duration_ms = duration.as_millis() as u64,
            "frame routed"
        );
        Ok(RoutedMessage {
            message,
            duration,
            response,
        })
    }

    fn parse(
        &self,
        adapter: &dyn ProtocolAdapter,
        frame: &RawFrame,
        located: LocatedDevice,
    ) -> Result<NormalizedMessage, ParseError> {
        let mut message = adapter.parse(&frame.payload)?;
        message.device_id = located.device_id;
        message.confidence = located.confidence;
        Ok(message)
    }
}

/// 路由器构造器
pub struct RouterBuilder {
    registry: Arc<AdapterRegistry>,
    identifier: ProtocolIdentifier,
    locator: DeviceLocator,
    metrics: Arc<RoutingMetrics>,
    preview_bytes: usize,
}

impl RouterBuilder {
    pub fn identifier(mut self, identifier: ProtocolIdentifier) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn locator(mut self, locator: DeviceLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn metrics(mut self, metrics: Arc<RoutingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn preview_bytes(mut self, preview_bytes: usize) -> Self {
        self.preview_bytes = preview_bytes;
        self
    }

    pub fn build(self, pool: WorkerPool) -> MessageRouter {
        MessageRouter {
            core: Arc::new(RouterCore {
                registry: self.registry,
                identifier: self.identifier,
                locator: self.locator,
                metrics: self.metrics,
                preview_bytes: self.preview_bytes,
            }),
            pool,
        }
    }
}

/// 消息路由器
#[derive(Clone)]
pub struct MessageRouter {
    core: Arc<RouterCore>,
    pool: WorkerPool,
}

impl MessageRouter {
    pub fn builder(registry: Arc<AdapterRegistry>) -> RouterBuilder {
        RouterBuilder {
            registry,
            identifier: ProtocolIdentifier::standard(),
            locator: DeviceLocator::without_directory(),
            metrics: Arc::new(RoutingMetrics::new()),
            preview_bytes: DEFAULT_PREVIEW_BYTES,
        }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.core.registry
    }

    pub fn metrics(&self) -> &Arc<RoutingMetrics> {
        &self.core.metrics
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// 路由一帧；等待工作池许可时只挂起调用方
    pub async fn route(&self, request: RouteRequest) -> Result<RoutedMessage, RouteError> {
        let core = Arc::clone(&self.core);
        let handle = self
            .pool
            .spawn(async move { core.route_frame(request).await })
            .await
            .map_err(|_| RouteError::ShutDown)?;
        handle
            .await
            .map_err(|err| RouteError::Aborted(err.to_string()))?
    }

    /// 路由十六进制文本报文（HTTP 推送），先规范化为字节
    pub async fn route_hex(
        &self,
        text: &str,
        peer: SocketAddr,
        hint: ProtocolHint,
    ) -> Result<RoutedMessage, RouteError> {
        let payload = match hex_to_bytes(text) {
            Ok(payload) => payload,
            Err(err) => {
                self.core.metrics.record_frame_received();
                match self.core.resolve_protocol(&[], &hint) {
                    Some(protocol) => self.core.metrics.record_error(
                        protocol,
                        RouteErrorCategory::ParseError,
                        Duration::ZERO,
                    ),
                    None => self.core.metrics.record_unidentified(),
                }
                warn!(peer = %peer, error = %err, "hex payload rejected");
                let reason = match err {
                    ProtocolError::InvalidHex(reason) => reason,
                    other => other.to_string(),
                };
                return Err(RouteError::InvalidHex(reason));
            }
        };
        self.route(RouteRequest::new(RawFrame::new(peer, payload), hint))
            .await
    }

    /// 非阻塞提交（接入线程使用）；工作池满时立即丢弃该帧
    pub fn dispatch(
        &self,
        frame: RawFrame,
        reply: Option<FrameReply>,
    ) -> Result<JoinHandle<Result<RoutedMessage, RouteError>>, RouteError> {
        let core = Arc::clone(&self.core);
        let peer = frame.peer_addr;
        let len = frame.payload.len();
        let request = RouteRequest {
            frame,
            hint: ProtocolHint::None,
            reply,
        };
        match self
            .pool
            .try_spawn(async move { core.route_frame(request).await })
        {
            Ok(handle) => Ok(handle),
            Err(SubmitError::Saturated) => {
                self.core.metrics.record_frame_received();
                self.core.metrics.record_backpressure();
                warn!(peer = %peer, len, "worker pool saturated, frame dropped");
                Err(RouteError::Backpressure)
            }
            Err(SubmitError::Closed) => Err(RouteError::ShutDown),
        }
    }

    /// 停止接收新帧并在宽限期内排空在途任务
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let in_flight = self.pool.in_flight();
        match self.pool.drain(grace).await {
            DrainOutcome::Drained => {
                info!(in_flight, "router drained");
                true
            }
            DrainOutcome::Abandoned(abandoned) => {
                warn!(
                    in_flight,
                    abandoned,
                    grace_ms = grace.as_millis() as u64,
                    "router shutdown grace elapsed, abandoning in-flight frames"
                );
                false
            }
        }
    }
}

impl FrameSink for MessageRouter {
    fn submit(&self, frame: RawFrame, reply: FrameReply) -> bool {
        self.dispatch(frame, Some(reply)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{FailingSink, RecordingSink};
    use crate::adapters::{AttendanceEntropyV40Adapter, StandardCatalog};
    use crate::locator::InMemoryDeviceDirectory;
    use domain::SENTINEL_DEVICE_ID;

    fn peer() -> SocketAddr {
        "10.0.0.7:40001".parse().unwrap()
    }

    fn attendance_frame(device_id: u32, message_type: u8) -> Vec<u8> {
        let mut frame = vec![0x55, 0xAA];
        frame.extend_from_slice(&device_id.to_le_bytes());
        frame.push(message_type);
        frame.extend_from_slice(&1001u32.to_le_bytes());
        frame.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        frame.extend_from_slice(&[0, 2]);
        frame
    }

    fn router_with(registry: Arc<AdapterRegistry>) -> MessageRouter {
        MessageRouter::builder(registry).build(WorkerPool::current(16))
    }

    fn standard_router(sink: Arc<RecordingSink>) -> MessageRouter {
        router_with(Arc::new(AdapterRegistry::with_catalog(Arc::new(
            StandardCatalog::all(sink),
        ))))
    }

    #[tokio::test]
    async fn test_route_attendance_record() {
        let sink = Arc::new(RecordingSink::default());
        let router = standard_router(Arc::clone(&sink));

        let routed = router
            .route(RouteRequest::raw(RawFrame::new(peer(), attendance_frame(12345, 0x01))))
            .await
            .unwrap();
        assert_eq!(routed.message.protocol_type, ProtocolType::AttendanceV4_0);
        assert_eq!(routed.message.device_id, 12345);
        assert_eq!(routed.message.confidence, DeviceConfidence::Extracted);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);

        let snapshot = router.metrics().snapshot();
        assert_eq!(snapshot.frames_received, 1);
        let attendance = snapshot.protocol(ProtocolType::AttendanceV4_0).unwrap();
        assert_eq!(attendance.success, 1);
        assert_eq!(attendance.duration_ms_count, 1);
        assert_eq!(
            router.registry().cached_protocol("12345"),
            Some(ProtocolType::AttendanceV4_0)
        );
    }

    #[tokio::test]
    async fn test_unidentified_frame() {
        let router = standard_router(Arc::new(RecordingSink::default()));
        let err = router
            .route(RouteRequest::raw(RawFrame::new(peer(), vec![0x01, 0x02, 0x03])))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Unidentified { .. }));
        assert_eq!(router.metrics().snapshot().unidentified, 1);
    }

    #[tokio::test]
    async fn test_empty_registry_handler_not_found() {
        let router = router_with(Arc::new(AdapterRegistry::new()));
        let err = router
            .route(RouteRequest::raw(RawFrame::new(peer(), attendance_frame(1, 0x01))))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::HandlerNotFound(ProtocolType::AttendanceV4_0)));
        let snapshot = router.metrics().snapshot();
        assert_eq!(
            snapshot
                .protocol(ProtocolType::AttendanceV4_0)
                .unwrap()
                .handler_not_found,
            1
        );
        assert!(router.registry().health().is_healthy());
    }

    #[tokio::test]
    async fn test_parse_and_process_errors_are_counted() {
        let registry = Arc::new(AdapterRegistry::new());
        registry.register(Arc::new(AttendanceEntropyV40Adapter::new(Arc::new(FailingSink))));
        let router = router_with(Arc::clone(&registry));

        let err = router
            .route(RouteRequest::raw(RawFrame::new(peer(), attendance_frame(9, 0x7F))))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Parse { .. }));
        assert_eq!(err.category(), "PARSE_ERROR");

        let err = router
            .route(RouteRequest::raw(RawFrame::new(peer(), attendance_frame(9, 0x01))))
            .await
            .unwrap_err();
        match err {
            RouteError::Process { device_id, source, .. } => {
                assert_eq!(device_id, 9);
                assert_eq!(source.code, "DOWNSTREAM_UNAVAILABLE");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let snapshot = router.metrics().snapshot();
        let attendance = snapshot.protocol(ProtocolType::AttendanceV4_0).unwrap();
        assert_eq!(attendance.parse_error, 1);
        assert_eq!(attendance.process_error, 1);
        assert_eq!(attendance.success, 0);
        assert_eq!(router.registry().cached_protocol("9"), None);
    }

    #[tokio::test]
    async fn test_sentinel_and_directory_fallback() {
        let mut frame = b"\xAA\x55????????".to_vec();
        frame.extend_from_slice(&[0x03, 0x02]);

        let sink = Arc::new(RecordingSink::default());
        let router = standard_router(Arc::clone(&sink));
        let routed = router
            .route(RouteRequest::raw(RawFrame::new(peer(), frame.clone())))
            .await
            .unwrap();
        assert_eq!(routed.message.device_id, SENTINEL_DEVICE_ID);
        assert_eq!(routed.message.confidence, DeviceConfidence::Sentinel);
        assert_eq!(router.metrics().snapshot().low_confidence, 1);
        assert_eq!(router.registry().cached_protocol("????????"), None);

        let directory = InMemoryDeviceDirectory::new();
        directory.register(peer().ip(), 777);
        let registry = Arc::new(AdapterRegistry::with_catalog(Arc::new(StandardCatalog::all(
            sink,
        ))));
        let router = MessageRouter::builder(registry)
            .locator(DeviceLocator::new(Arc::new(directory)))
            .build(WorkerPool::current(4));
        let routed = router
            .route(RouteRequest::raw(RawFrame::new(peer(), frame)))
            .await
            .unwrap();
        assert_eq!(routed.message.device_id, 777);
        assert_eq!(routed.message.confidence, DeviceConfidence::Directory);
        assert_eq!(router.metrics().snapshot().low_confidence, 0);
    }

    #[tokio::test]
    async fn test_hints_take_precedence() {
        let sink = Arc::new(RecordingSink::default());
        let router = standard_router(sink);
        // 无协议头的帧只能依靠线索路由，随后被适配器按结构拒绝
        let err = router
            .route_hex("0102030405060708", peer(), ProtocolHint::DeviceModel("iface702".into()))
            .await
            .unwrap_err();
        match err {
            RouteError::Parse { protocol, source } => {
                assert_eq!(protocol, ProtocolType::AttendanceV4_0);
                assert_eq!(source.code, "HEADER_MISMATCH");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = router
            .route_hex("0102", peer(), ProtocolHint::DeviceSn("unknown".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Unidentified { .. }));
    }

    #[tokio::test]
    async fn test_route_hex_invalid() {
        let router = standard_router(Arc::new(RecordingSink::default()));
        let err = router
            .route_hex("55AAZZ", peer(), ProtocolHint::Type(ProtocolType::AttendanceV4_0))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidHex(_)));
        let snapshot = router.metrics().snapshot();
        assert_eq!(
            snapshot.protocol(ProtocolType::AttendanceV4_0).unwrap().parse_error,
            1
        );

        let err = router
            .route_hex("XYZ", peer(), ProtocolHint::None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "PARSE_ERROR");
        assert_eq!(router.metrics().snapshot().unidentified, 1);
    }

    #[tokio::test]
    async fn test_route_after_shutdown() {
        let router = standard_router(Arc::new(RecordingSink::default()));
        assert!(router.shutdown(Duration::from_millis(100)).await);
        let err = router
            .route(RouteRequest::raw(RawFrame::new(peer(), attendance_frame(1, 0x01))))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::ShutDown));
        assert!(matches!(
            router.dispatch(RawFrame::new(peer(), attendance_frame(1, 0x01)), None),
            Err(RouteError::ShutDown)
        ));
    }
}
