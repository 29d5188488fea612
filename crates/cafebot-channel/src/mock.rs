//! Mock 配置服务（仅在 `mock` feature 下可用）
//!
//! `MockServer` 模拟服务端：记录收到的请求，可以通过应答函数自动回复，
//! 也可以手动推送任意帧、拒绝连接、强制断开、让发送失败。

use crate::{Connector, FrameTransport, TransportError};
use cafebot_protocol::{CorrelationId, RequestFrame, ResponseFrame};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

type Responder = Box<dyn Fn(&RequestFrame) -> Option<Value> + Send + Sync>;

enum Incoming {
    Text(String),
    Disconnect,
}

struct ServerState {
    responder: Mutex<Option<Responder>>,
    refuse_remaining: AtomicU32,
    fail_sends: AtomicBool,
    connect_attempts: AtomicU32,
    connections: AtomicU32,
    requests_tx: Sender<RequestFrame>,
    requests_rx: Receiver<RequestFrame>,
    session: Mutex<Option<Sender<Incoming>>>,
}

/// 模拟的配置服务端
#[derive(Clone)]
pub struct MockServer {
    state: Arc<ServerState>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(ServerState {
                responder: Mutex::new(None),
                refuse_remaining: AtomicU32::new(0),
                fail_sends: AtomicBool::new(false),
                connect_attempts: AtomicU32::new(0),
                connections: AtomicU32::new(0),
                requests_tx,
                requests_rx,
                session: Mutex::new(None),
            }),
        }
    }

    /// 创建连接到本服务端的连接器
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            state: self.state.clone(),
        }
    }

    /// 设置自动应答函数；返回 `None` 表示不回复
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&RequestFrame) -> Option<Value> + Send + Sync + 'static,
    {
        *self.state.responder.lock() = Some(Box::new(responder));
    }

    pub fn clear_responder(&self) {
        *self.state.responder.lock() = None;
    }

    /// 拒绝接下来的 `count` 次连接
    pub fn refuse_connections(&self, count: u32) {
        self.state.refuse_remaining.store(count, Ordering::SeqCst);
    }

    /// 让客户端发送失败
    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// 强制断开当前会话（客户端接收端看到连接关闭）
    pub fn disconnect(&self) {
        if let Some(session) = self.state.session.lock().take() {
            let _ = session.send(Incoming::Disconnect);
        }
    }

    /// 连接尝试次数（包括被拒绝的）
    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// 成功建立的连接数
    pub fn connections(&self) -> u32 {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// 取出下一条收到的请求
    pub fn next_request(&self, timeout: Duration) -> Option<RequestFrame> {
        self.state.requests_rx.recv_timeout(timeout).ok()
    }

    /// 向当前会话推送应答
    pub fn reply(&self, id: CorrelationId, data: Value) -> bool {
        match ResponseFrame::new(id, data).encode() {
            Ok(text) => self.push_raw(text),
            Err(_) => false,
        }
    }

    /// 向当前会话推送原始文本帧
    pub fn push_raw(&self, text: impl Into<String>) -> bool {
        match self.state.session.lock().as_ref() {
            Some(session) => session.send(Incoming::Text(text.into())).is_ok(),
            None => false,
        }
    }
}

/// 连接到 `MockServer` 的连接器
pub struct MockConnector {
    state: Arc<ServerState>,
}

impl Connector for MockConnector {
    fn connect(&self) -> Result<Box<dyn FrameTransport>, TransportError> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let refuse = self
            .state
            .refuse_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock server refused connection",
            )));
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        *self.state.session.lock() = Some(tx.clone());
        self.state.connections.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockTransport {
            state: self.state.clone(),
            loopback: tx,
            incoming: rx,
            closed: false,
        }))
    }

    fn endpoint(&self) -> String {
        "mock://config-service".to_string()
    }
}

/// 客户端侧的内存传输
pub struct MockTransport {
    state: Arc<ServerState>,
    loopback: Sender<Incoming>,
    incoming: Receiver<Incoming>,
    closed: bool,
}

impl FrameTransport for MockTransport {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock send failure",
            )));
        }

        let request = RequestFrame::decode(text).map_err(|e| TransportError::Socket(e.to_string()))?;
        let reply = self
            .state
            .responder
            .lock()
            .as_ref()
            .and_then(|responder| responder(&request));
        if let Some(data) = reply
            && let Ok(id) = request.correlation_id()
            && let Ok(text) = ResponseFrame::new(id, data).encode()
        {
            let _ = self.loopback.send(Incoming::Text(text));
        }
        let _ = self.state.requests_tx.send(request);
        Ok(())
    }

    fn receive_text(&mut self, timeout: Duration) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.incoming.recv_timeout(timeout) {
            Ok(Incoming::Text(text)) => Ok(text),
            Ok(Incoming::Disconnect) => {
                self.closed = true;
                Err(TransportError::Closed)
            },
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
