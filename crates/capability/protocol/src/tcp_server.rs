//! TCP 接入
//!
//! 单独的 OS 线程上运行单线程 tokio 运行时，所有设备连接在该线程上多路复用。
//! 每次非空读取即为一帧，交给 [`FrameSink`]，接入线程从不等待路由结果。
//! 设备应答经由每个连接自己的 [`FrameReply`] 队列回写，读与写在同一连接任务内交替进行。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let config = TcpGatewayConfig::from_json(r#"{"listen_addr": "0.0.0.0:9000"}"#)?;
//! let handle = FrameAcceptor::start(config, Arc::new(router.clone()))?;
//! // ...
//! handle.shutdown(Duration::from_secs(5));
//! ```

use crate::error::ProtocolError;
use domain::RawFrame;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc as reply_mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// TCP 接入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpGatewayConfig {
    /// 监听地址
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// 单连接读缓冲区大小（字节），一次读取即一帧
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// 连接空闲超时（秒）
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// 接入循环的轮询间隔（毫秒），用于回收已结束的连接任务
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// 停止时等待接入线程退出的时长（毫秒）
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_read_buffer_size() -> usize {
    4096
}

fn default_max_connections() -> usize {
    1024
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    500
}

fn default_shutdown_timeout() -> u64 {
    5000
}

impl Default for TcpGatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            read_buffer_size: default_read_buffer_size(),
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
            poll_interval_ms: default_poll_interval(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

impl TcpGatewayConfig {
    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let config: TcpGatewayConfig =
            serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.read_buffer_size == 0 {
            return Err(ProtocolError::ConfigParse(
                "read_buffer_size must be positive".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ProtocolError::ConfigParse(
                "max_connections must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ProtocolError::ConfigParse(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ProtocolError::ConfigParse(
                "idle_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// 单连接待回写应答的队列长度
pub const REPLY_QUEUE_CAPACITY: usize = 32;

/// 连接回写通道
///
/// 任意线程均可投递；连接关闭后投递失败。
#[derive(Debug, Clone)]
pub struct FrameReply {
    peer: SocketAddr,
    tx: reply_mpsc::Sender<Vec<u8>>,
}

impl FrameReply {
    /// 新建回写通道，接收端由连接任务持有
    pub fn channel(peer: SocketAddr, capacity: usize) -> (Self, reply_mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = reply_mpsc::channel(capacity.max(1));
        (Self { peer, tx }, rx)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// 非阻塞投递；连接已关闭或队列已满时返回 `false`
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.tx.try_send(bytes).is_ok()
    }
}

/// 帧的接收方
///
/// `submit` 在接入线程上调用，必须立即返回；返回 `false` 表示该帧被丢弃。
/// `reply` 指向帧所在的连接，接收方可以稍后经由它回写应答。
pub trait FrameSink: Send + Sync {
    fn submit(&self, frame: RawFrame, reply: FrameReply) -> bool;
}

/// TCP 帧接入器
pub struct FrameAcceptor;

impl FrameAcceptor {
    /// 绑定监听地址并启动接入线程
    ///
    /// 绑定失败直接返回给调用方。
    pub fn start(
        config: TcpGatewayConfig,
        sink: Arc<dyn FrameSink>,
    ) -> Result<AcceptorHandle, ProtocolError> {
        config.validate()?;
        let std_listener = std::net::TcpListener::bind(config.listen_addr)?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = mpsc::channel();
        let active = Arc::new(AtomicUsize::new(0));
        let loop_active = Arc::clone(&active);

        let thread = thread::Builder::new()
            .name("devcomm-acceptor".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    match TcpListener::from_std(std_listener) {
                        Ok(listener) => {
                            accept_loop(listener, config, sink, loop_active, shutdown_rx).await
                        }
                        Err(e) => error!(error = %e, "failed to register tcp listener"),
                    }
                });
                drop(runtime);
                let _ = done_tx.send(());
            })?;

        info!(addr = %local_addr, "tcp acceptor listening");
        Ok(AcceptorHandle {
            local_addr,
            active,
            shutdown_tx,
            done_rx,
            thread: Some(thread),
        })
    }
}

/// 运行中的接入器句柄；丢弃句柄即通知接入线程退出
pub struct AcceptorHandle {
    local_addr: SocketAddr,
    active: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    done_rx: mpsc::Receiver<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AcceptorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// 通知退出、关闭监听与全部连接，最多等待 `timeout`
    ///
    /// 返回接入线程是否在超时前退出。
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!("acceptor thread panicked");
                    }
                }
                info!(addr = %self.local_addr, "tcp acceptor stopped");
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    addr = %self.local_addr,
                    timeout_ms = timeout.as_millis() as u64,
                    "tcp acceptor did not stop in time"
                );
                false
            }
        }
    }
}

impl Drop for AcceptorHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// 连接计数守卫，连接任务结束（包括被取消）时归还名额
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: TcpGatewayConfig,
    sink: Arc<dyn FrameSink>,
    active: Arc<AtomicUsize>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(config.poll_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if active.load(Ordering::Acquire) >= config.max_connections {
                        warn!(
                            peer = %peer,
                            max_connections = config.max_connections,
                            "connection limit reached, closing"
                        );
                        drop(stream);
                        continue;
                    }
                    active.fetch_add(1, Ordering::AcqRel);
                    let slot = ConnectionSlot(Arc::clone(&active));
                    debug!(peer = %peer, "connection accepted");
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&sink),
                        config.read_buffer_size,
                        config.idle_timeout(),
                        slot,
                    ));
                }
                Err(e) => warn!(error = %e, "failed to accept connection"),
            },
            _ = tick.tick() => {
                while let Some(finished) = connections.try_join_next() {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!(error = %e, "connection task panicked");
                        }
                    }
                }
            }
        }
    }

    drop(listener);
    let open = connections.len();
    connections.shutdown().await;
    info!(closed_connections = open, "accept loop exited");
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    sink: Arc<dyn FrameSink>,
    read_buffer_size: usize,
    idle_timeout: Duration,
    _slot: ConnectionSlot,
) {
    let (reply, mut replies) = FrameReply::channel(peer, REPLY_QUEUE_CAPACITY);
    let (mut reader, mut writer) = stream.split();
    let mut buf = vec![0u8; read_buffer_size];
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => {
                info!(peer = %peer, "connection idle, closing");
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(peer = %peer, "connection closed by peer");
                    break;
                }
                Ok(n) => {
                    idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);
                    let frame = RawFrame::new(peer, buf[..n].to_vec());
                    if !sink.submit(frame, reply.clone()) {
                        debug!(peer = %peer, len = n, "frame rejected by sink");
                    }
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "connection read failed");
                    break;
                }
            },
            Some(bytes) = replies.recv() => {
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!(peer = %peer, error = %e, "connection write failed");
                    break;
                }
                debug!(peer = %peer, len = bytes.len(), "response written");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{"listen_addr": "127.0.0.1:9100", "max_connections": 8}"#;
        let config = TcpGatewayConfig::from_json(json).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9100".parse().unwrap());
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_config_defaults_and_errors() {
        let config = TcpGatewayConfig::from_json("{}").unwrap();
        assert_eq!(config.listen_addr.port(), 9000);

        assert!(matches!(
            TcpGatewayConfig::from_json(r#"{"read_buffer_size": 0}"#),
            Err(ProtocolError::ConfigParse(_))
        ));
        assert!(matches!(
            TcpGatewayConfig::from_json("not json"),
            Err(ProtocolError::ConfigParse(_))
        ));
        assert!(matches!(
            TcpGatewayConfig::from_json(r#"{"idle_timeout_secs": 0}"#),
            Err(ProtocolError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_zero_idle_timeout_refuses_to_start() {
        struct Discard;
        impl FrameSink for Discard {
            fn submit(&self, _frame: RawFrame, _reply: FrameReply) -> bool {
                true
            }
        }

        let config = TcpGatewayConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            idle_timeout_secs: 0,
            ..TcpGatewayConfig::default()
        };
        assert!(matches!(
            FrameAcceptor::start(config, Arc::new(Discard)),
            Err(ProtocolError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_reply_after_connection_closed() {
        let (reply, replies) = FrameReply::channel("127.0.0.1:4000".parse().unwrap(), 1);
        assert!(reply.send(vec![0x01]));
        assert!(!reply.send(vec![0x02]));
        drop(replies);
        assert!(!reply.send(vec![0x03]));
        assert_eq!(reply.peer().port(), 4000);
    }

    #[test]
    fn test_bind_error_surfaces() {
        struct Discard;
        impl FrameSink for Discard {
            fn submit(&self, _frame: RawFrame, _reply: FrameReply) -> bool {
                true
            }
        }

        let first = FrameAcceptor::start(
            TcpGatewayConfig {
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                ..TcpGatewayConfig::default()
            },
            Arc::new(Discard),
        )
        .unwrap();
        let taken = TcpGatewayConfig {
            listen_addr: first.local_addr(),
            ..TcpGatewayConfig::default()
        };
        assert!(matches!(
            FrameAcceptor::start(taken, Arc::new(Discard)),
            Err(ProtocolError::Io(_))
        ));
        assert!(first.shutdown(Duration::from_secs(2)));
    }
}
