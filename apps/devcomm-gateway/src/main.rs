//! 设备通讯网关进程：TCP 接入 + HTTP 运维接口，并注入请求追踪 ID。

mod handlers;
mod routes;
mod utils;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
};
use devcomm_config::GatewayConfig;
use devcomm_protocol::{
    AdapterRegistry, DeviceLocator, FrameAcceptor, InMemoryDeviceDirectory, LoggingMessageSink,
    MessageRouter, MessageSink, StandardCatalog, TcpGatewayConfig, WorkerPool,
};
use devcomm_telemetry::{init_tracing, new_request_ids};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub router: MessageRouter,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = GatewayConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 路由工作池独立于 HTTP 运行时
    let worker_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("devcomm-worker")
        .enable_all()
        .build()?;
    let http_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("devcomm-http")
        .enable_all()
        .build()?;

    let pool = WorkerPool::new(worker_runtime.handle().clone(), config.max_in_flight);
    http_runtime.block_on(run(config, pool))
}

async fn run(config: GatewayConfig, pool: WorkerPool) -> Result<(), Box<dyn std::error::Error>> {
    // 适配器注册表：按启用协议集合构造，支持热加载
    let sink: Arc<dyn MessageSink> = Arc::new(LoggingMessageSink);
    let catalog = Arc::new(StandardCatalog::new(config.enabled_protocols.clone(), sink));
    let registry = Arc::new(
        AdapterRegistry::with_catalog(catalog).with_sn_cache_capacity(config.sn_cache_capacity),
    );

    // 设备目录：报文内无设备 ID 时按对端 IP 回退
    let directory = Arc::new(InMemoryDeviceDirectory::with_entries(
        config.device_directory.clone(),
    ));
    let router = MessageRouter::builder(registry)
        .locator(DeviceLocator::new(directory))
        .build(pool);

    let acceptor = FrameAcceptor::start(tcp_config(&config)?, Arc::new(router.clone()))?;

    let state = AppState {
        router: router.clone(),
    };
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(
        http_addr = %config.http_addr,
        tcp_addr = %acceptor.local_addr(),
        protocols = ?config.enabled_protocols,
        "devcomm gateway started"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // 先停接入，再排空路由
    let grace = Duration::from_millis(config.shutdown_grace_ms);
    let stopped = tokio::task::spawn_blocking(move || acceptor.shutdown(grace)).await?;
    if !stopped {
        warn!("tcp acceptor left running after shutdown timeout");
    }
    router.shutdown(grace).await;
    info!("devcomm gateway stopped");
    Ok(())
}

fn tcp_config(config: &GatewayConfig) -> Result<TcpGatewayConfig, Box<dyn std::error::Error>> {
    Ok(TcpGatewayConfig {
        listen_addr: config.tcp_addr.parse()?,
        read_buffer_size: config.read_buffer_bytes,
        max_connections: config.max_connections,
        idle_timeout_secs: config.idle_timeout_seconds,
        poll_interval_ms: config.poll_interval_ms,
        shutdown_timeout_ms: config.shutdown_grace_ms,
    })
}

pub fn build_app(state: AppState) -> Router {
    routes::create_api_router()
        .with_state(state)
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入请求扩展与日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::collections::HashMap;
    use tower::ServiceExt;

    #[test]
    fn tcp_config_maps_gateway_settings() {
        let config = GatewayConfig {
            http_addr: "127.0.0.1:8080".to_string(),
            tcp_addr: "127.0.0.1:9100".to_string(),
            read_buffer_bytes: 2048,
            max_connections: 16,
            idle_timeout_seconds: 30,
            poll_interval_ms: 100,
            worker_threads: 2,
            max_in_flight: 64,
            shutdown_grace_ms: 1500,
            sn_cache_capacity: 128,
            enabled_protocols: Vec::new(),
            device_directory: HashMap::new(),
        };
        let tcp = tcp_config(&config).expect("tcp config");
        assert_eq!(tcp.listen_addr.port(), 9100);
        assert_eq!(tcp.read_buffer_size, 2048);
        assert_eq!(tcp.max_connections, 16);
        assert_eq!(tcp.shutdown_timeout_ms, 1500);

        let bad = GatewayConfig {
            tcp_addr: "not-an-addr".to_string(),
            ..config
        };
        assert!(tcp_config(&bad).is_err());
    }

    #[tokio::test]
    async fn responses_carry_request_ids() {
        let app = build_app(handlers::test_support::state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-trace-id"));
    }
}
