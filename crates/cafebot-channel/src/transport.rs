//! 传输抽象
//!
//! 通道只依赖「发送文本帧 / 带超时接收文本帧 / 关闭」三种能力，
//! 真实实现为 WebSocket，测试中使用内存实现。

use crate::TransportError;
use std::time::Duration;

/// 一条已建立的文本帧连接
pub trait FrameTransport: Send {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// 接收一个文本帧
    ///
    /// 在 `timeout` 内没有文本帧时返回 `TransportError::Timeout`，
    /// 连接已关闭时返回 `TransportError::Closed`。
    fn receive_text(&mut self, timeout: Duration) -> Result<String, TransportError>;

    fn close(&mut self);
}

/// 连接工厂
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn FrameTransport>, TransportError>;

    /// 用于日志的端点描述
    fn endpoint(&self) -> String;
}
