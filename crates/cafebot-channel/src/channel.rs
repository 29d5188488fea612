//! 命令通道
//!
//! 维护一条到配置服务的持久连接。连接建立时启动一个后台接收线程，
//! 该线程持续读取应答帧并按关联 ID 填入在途命令表。
//!
//! # 连接生命周期
//!
//! - `send` 在没有连接时按需建立（有限次数 + 固定退避）
//! - 发送失败会关闭并清空当前连接，下一次尝试从头建立
//! - 接收线程遇到解码或套接字错误后退出，并把连接从槽位中移除
//! - 每次建立连接都会重置在途命令表，旧连接上的等待方得到 `CorrelationLost`

use crate::pending::{FulfillOutcome, PendingTable};
use crate::{ChannelError, Connector, FrameTransport, TransportError};
use cafebot_protocol::{CorrelationId, RequestFrame, ResponseFrame};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 命令通道配置
///
/// ```
/// use cafebot_channel::ChannelConfig;
/// use std::time::Duration;
///
/// // 默认：5 次连接尝试，1s 退避，50ms 接收轮询
/// let config = ChannelConfig::default();
///
/// // 测试中缩短退避
/// let config = ChannelConfig {
///     connect_backoff: Duration::from_millis(10),
///     ..ChannelConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// 建立连接/发送的最大尝试次数
    pub connect_attempts: u32,
    /// 两次尝试之间的退避
    pub connect_backoff: Duration,
    /// 接收线程单次读取的超时，也决定了关闭时接收线程的退出延迟
    pub receive_poll: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            connect_backoff: Duration::from_secs(1),
            receive_poll: Duration::from_millis(50),
        }
    }
}

type SharedTransport = Arc<Mutex<Box<dyn FrameTransport>>>;

/// 一条已建立的连接及其接收线程
struct Link {
    transport: SharedTransport,
    generation: u64,
    is_running: Arc<AtomicBool>,
    rx_thread: Option<JoinHandle<()>>,
}

impl Link {
    /// 停止接收线程并关闭传输（不能在接收线程内部调用）
    fn shutdown(mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.rx_thread.take()
            && handle.join().is_err()
        {
            error!("Receive thread for connection #{} panicked", self.generation);
        }
        self.transport.lock().close();
        debug!("Connection #{} closed", self.generation);
    }
}

/// 与配置服务之间的命令通道
pub struct CommandChannel {
    connector: Box<dyn Connector>,
    config: ChannelConfig,
    link: Arc<Mutex<Option<Link>>>,
    pending: Arc<PendingTable>,
    generation: AtomicU64,
}

impl CommandChannel {
    /// 创建命令通道（惰性连接：首次 `send` 时才建立连接）
    pub fn new(connector: impl Connector + 'static, config: ChannelConfig) -> Self {
        Self {
            connector: Box::new(connector),
            config,
            link: Arc::new(Mutex::new(None)),
            pending: Arc::new(PendingTable::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// 当前是否持有连接
    pub fn is_connected(&self) -> bool {
        self.link.lock().is_some()
    }

    /// 在途命令数量
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// 发送命令，返回关联 ID
    ///
    /// 没有连接时先建立连接。每次失败都会丢弃当前连接，
    /// `connect_attempts` 次均失败后返回 `ChannelError::Unavailable`。
    pub fn send(&self, cmd: &str, data: Value) -> Result<CorrelationId, ChannelError> {
        let attempts = self.config.connect_attempts.max(1);
        for attempt in 1..=attempts {
            match self.send_once(cmd, &data) {
                Ok(id) => {
                    debug!("Sent '{}' as command {}", cmd, id);
                    return Ok(id);
                },
                Err(ChannelError::Transport(e)) => {
                    warn!(
                        "Sending '{}' failed, retrying {}/{}: {}",
                        cmd, attempt, attempts, e
                    );
                    if attempt < attempts {
                        thread::sleep(self.config.connect_backoff);
                    }
                },
                Err(e) => return Err(e),
            }
        }
        error!(
            "Config service at {} unavailable after {} attempts",
            self.connector.endpoint(),
            attempts
        );
        Err(ChannelError::Unavailable { attempts })
    }

    /// 等待指定命令的应答
    ///
    /// - 收到应答：移除 ID 并返回 `data`
    /// - 超时：移除 ID 并返回 `ChannelError::Timeout`
    /// - ID 不在表中或连接已重建：返回 `ChannelError::CorrelationLost`
    pub fn await_response(
        &self,
        id: CorrelationId,
        timeout: Duration,
    ) -> Result<Value, ChannelError> {
        let Some(waiter) = self.pending.waiter(id) else {
            warn!("Command {} is not pending", id);
            return Err(ChannelError::CorrelationLost { id });
        };

        match waiter.recv_timeout(timeout) {
            Ok(data) => {
                self.pending.remove(id);
                trace!("Command {} answered", id);
                Ok(data)
            },
            Err(RecvTimeoutError::Timeout) => {
                self.pending.remove(id);
                warn!("Command {} timed out after {:?}", id, timeout);
                Err(ChannelError::Timeout {
                    id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            },
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Command {} lost: connection was reset", id);
                Err(ChannelError::CorrelationLost { id })
            },
        }
    }

    /// 发送并等待应答
    pub fn request(
        &self,
        cmd: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value, ChannelError> {
        let id = self.send(cmd, data)?;
        self.await_response(id, timeout)
    }

    /// 丢弃当前连接并重新建立
    pub fn reconnect(&self) -> Result<(), ChannelError> {
        info!("Reconnecting to {}", self.connector.endpoint());
        let attempts = self.config.connect_attempts.max(1);

        let mut slot = self.link.lock();
        let stale = slot.take();
        let mut result = Err(ChannelError::Unavailable { attempts });
        for attempt in 1..=attempts {
            match self.establish() {
                Ok(link) => {
                    *slot = Some(link);
                    result = Ok(());
                    break;
                },
                Err(e) => {
                    warn!("Connection failed, retrying {}/{}: {}", attempt, attempts, e);
                    if attempt < attempts {
                        thread::sleep(self.config.connect_backoff);
                    }
                },
            }
        }
        if result.is_err() {
            self.pending.reset();
        }
        drop(slot);

        // 旧连接在锁外关闭：其接收线程退出前可能需要获取槽位锁
        if let Some(stale) = stale {
            stale.shutdown();
        }
        result
    }

    /// 关闭连接并丢弃所有在途命令
    pub fn close(&self) {
        let stale = {
            let mut slot = self.link.lock();
            let stale = slot.take();
            if stale.is_some() {
                let orphaned = self.pending.reset();
                if orphaned > 0 {
                    warn!("Closing channel with {} command(s) in flight", orphaned);
                }
            }
            stale
        };
        if let Some(link) = stale {
            info!("Closing connection to {}", self.connector.endpoint());
            link.shutdown();
        }
    }

    fn send_once(&self, cmd: &str, data: &Value) -> Result<CorrelationId, ChannelError> {
        let (transport, generation) = self.ensure_link()?;

        let id = self.pending.register();
        let text = match RequestFrame::new(cmd, id, data.clone()).encode() {
            Ok(text) => text,
            Err(e) => {
                self.pending.remove(id);
                return Err(e.into());
            },
        };

        let sent = transport.lock().send_text(&text);
        if let Err(e) = sent {
            self.pending.remove(id);
            self.drop_link(generation);
            return Err(e.into());
        }
        Ok(id)
    }

    /// 获取当前连接，没有时建立一条（单次尝试）
    fn ensure_link(&self) -> Result<(SharedTransport, u64), TransportError> {
        let mut slot = self.link.lock();
        if let Some(link) = slot.as_ref() {
            return Ok((link.transport.clone(), link.generation));
        }

        let link = self.establish()?;
        let handle = (link.transport.clone(), link.generation);
        *slot = Some(link);
        Ok(handle)
    }

    /// 建立连接并启动接收线程，调用方必须持有槽位锁
    fn establish(&self) -> Result<Link, TransportError> {
        let endpoint = self.connector.endpoint();
        debug!("Connecting to {}", endpoint);
        let transport = self.connector.connect()?;

        let orphaned = self.pending.reset();
        if orphaned > 0 {
            warn!(
                "{} command(s) orphaned by connection reset, waiters will see correlation lost",
                orphaned
            );
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let transport: SharedTransport = Arc::new(Mutex::new(transport));
        let is_running = Arc::new(AtomicBool::new(true));

        let ctx = ReceiveContext {
            transport: transport.clone(),
            pending: self.pending.clone(),
            link: self.link.clone(),
            generation,
            is_running: is_running.clone(),
            poll: self.config.receive_poll,
        };
        let rx_thread = thread::Builder::new()
            .name(format!("cafebot-rx-{generation}"))
            .spawn(move || receive_loop(ctx))?;

        info!("Connected to {} (connection #{})", endpoint, generation);
        Ok(Link {
            transport,
            generation,
            is_running,
            rx_thread: Some(rx_thread),
        })
    }

    /// 丢弃指定代的连接（若仍是当前连接）
    fn drop_link(&self, generation: u64) {
        let stale = {
            let mut slot = self.link.lock();
            if slot.as_ref().is_some_and(|link| link.generation == generation) {
                self.pending.reset();
                slot.take()
            } else {
                None
            }
        };
        if let Some(link) = stale {
            warn!("Dropping connection #{} after send failure", generation);
            link.shutdown();
        }
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// 接收线程上下文
struct ReceiveContext {
    transport: SharedTransport,
    pending: Arc<PendingTable>,
    link: Arc<Mutex<Option<Link>>>,
    generation: u64,
    is_running: Arc<AtomicBool>,
    poll: Duration,
}

/// 接收循环
///
/// 被要求停止时直接返回（清理由调用方负责）；
/// 因错误退出时，若槽位中仍是本连接则将其移除并重置在途命令表。
fn receive_loop(ctx: ReceiveContext) {
    let ReceiveContext {
        transport,
        pending,
        link,
        generation,
        is_running,
        poll,
    } = ctx;

    let reason = loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Receive loop #{} stopped", generation);
            return;
        }

        let mut guard = transport.lock();
        let received = guard.receive_text(poll);
        // 公平释放，避免发送方在接收轮询之间饿死
        MutexGuard::unlock_fair(guard);

        let text = match received {
            Ok(text) => text,
            Err(TransportError::Timeout) => continue,
            Err(e) => break e.to_string(),
        };

        let frame = match ResponseFrame::decode(&text) {
            Ok(frame) => frame,
            Err(e) => break format!("undecodable frame: {e}"),
        };
        let Some(id) = frame.id else {
            trace!("Ignoring frame without correlation id");
            continue;
        };

        match pending.fulfill(id, frame.data) {
            FulfillOutcome::Delivered => trace!("Reply for command {} delivered", id),
            FulfillOutcome::Unknown => debug!("Discarding reply for unknown command {}", id),
            FulfillOutcome::AlreadyFilled => {
                debug!("Discarding duplicate reply for command {}", id)
            },
        }
    };

    if !is_running.swap(false, Ordering::AcqRel) {
        return;
    }
    warn!("Receive loop #{} terminated: {}", generation, reason);

    let stale = {
        let mut slot = link.lock();
        if slot.as_ref().is_some_and(|current| current.generation == generation) {
            let orphaned = pending.reset();
            if orphaned > 0 {
                warn!("{} command(s) orphaned by connection loss", orphaned);
            }
            slot.take()
        } else {
            None
        }
    };
    // 本线程的句柄随之释放，不能 join 自身
    if let Some(mut stale) = stale {
        stale.rx_thread.take();
        stale.transport.lock().close();
    }
}
