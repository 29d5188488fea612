//! WebSocket 传输实现（基于 tungstenite，阻塞 IO）
//!
//! 接收使用套接字读超时实现轮询；超时在 tungstenite 中表现为
//! `WouldBlock`/`TimedOut`，会被映射为 `TransportError::Timeout`，
//! 未读完的帧由 tungstenite 内部缓冲，下一次读取继续。

use crate::{Connector, FrameTransport, TransportError};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};
use tungstenite::client::IntoClientRequest;
use tungstenite::{Message, WebSocket};

/// 默认 TCP 连接 + 握手超时
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// WebSocket 连接工厂
#[derive(Debug, Clone)]
pub struct WsConnector {
    uri: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// 由主机、端口、路径拼出 `ws://{host}:{port}{path}`
    pub fn from_parts(host: &str, port: u16, path: &str) -> Self {
        Self::new(format!("ws://{host}:{port}{path}"))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn open_stream(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                },
            }
        }
        Err(match last_error {
            Some(e) => TransportError::Io(e),
            None => TransportError::Handshake(format!("no address resolved for {host}")),
        })
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> Result<Box<dyn FrameTransport>, TransportError> {
        let request = self
            .uri
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        let host = request
            .uri()
            .host()
            .ok_or_else(|| TransportError::Handshake(format!("missing host in {}", self.uri)))?
            .to_string();
        let port = request.uri().port_u16().unwrap_or(80);

        let stream = self.open_stream(&host, port)?;
        stream.set_nodelay(true)?;
        // 握手阶段使用连接超时，避免服务端无响应时永久阻塞
        stream.set_read_timeout(Some(self.connect_timeout))?;

        let (socket, _response) = tungstenite::client(request, stream)
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        debug!("WebSocket handshake with {} completed", self.uri);

        Ok(Box::new(WsTransport {
            socket,
            read_timeout: Some(self.connect_timeout),
        }))
    }

    fn endpoint(&self) -> String {
        self.uri.clone()
    }
}

/// 已建立的 WebSocket 连接
pub struct WsTransport {
    socket: WebSocket<TcpStream>,
    read_timeout: Option<Duration>,
}

impl WsTransport {
    fn apply_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        // 零超时在 set_read_timeout 中非法
        let timeout = timeout.max(Duration::from_millis(1));
        if self.read_timeout != Some(timeout) {
            self.socket.get_mut().set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }
        Ok(())
    }
}

fn map_ws_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Io(e)
            if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            TransportError::Timeout
        },
        tungstenite::Error::Io(e) => TransportError::Io(e),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        },
        other => TransportError::Socket(other.to_string()),
    }
}

impl FrameTransport for WsTransport {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.socket
            .send(Message::text(text.to_owned()))
            .map_err(map_ws_error)
    }

    fn receive_text(&mut self, timeout: Duration) -> Result<String, TransportError> {
        self.apply_read_timeout(timeout)?;
        match self.socket.read().map_err(map_ws_error)? {
            Message::Text(text) => Ok(text.as_str().to_owned()),
            Message::Close(frame) => {
                debug!("Server closed WebSocket: {:?}", frame);
                Err(TransportError::Closed)
            },
            // Ping/Pong 由 tungstenite 自动处理，二进制帧不属于该协议
            other => {
                trace!("Ignoring non-text message ({} bytes)", other.len());
                Err(TransportError::Timeout)
            },
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.socket.close(None) {
            trace!("WebSocket close: {}", e);
        }
        if let Err(e) = self.socket.flush() {
            trace!("WebSocket flush on close: {}", e);
        }
    }
}
