//! 通道层错误类型定义

use cafebot_protocol::{CorrelationId, ProtocolError};
use thiserror::Error;

/// 传输层错误
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 本次轮询内没有收到文本帧（不是致命错误）
    #[error("Read timeout")]
    Timeout,

    #[error("Connection closed")]
    Closed,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Socket error: {0}")]
    Socket(String),
}

/// 命令通道错误
#[derive(Error, Debug)]
pub enum ChannelError {
    /// 有限次数内无法建立连接或发送
    #[error("Config service unavailable after {attempts} attempts")]
    Unavailable { attempts: u32 },

    /// 在超时时间内没有收到对应应答
    #[error("Command {id} timed out after {timeout_ms}ms")]
    Timeout { id: CorrelationId, timeout_ms: u64 },

    /// 在途命令因连接重建或接收线程退出而被丢弃
    #[error("Correlation lost for command {id}")]
    CorrelationLost { id: CorrelationId },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ChannelError {
    /// 是否属于通道故障（可由通道重试策略重试）
    pub fn is_channel_fault(&self) -> bool {
        matches!(
            self,
            ChannelError::Unavailable { .. }
                | ChannelError::Timeout { .. }
                | ChannelError::CorrelationLost { .. }
        )
    }
}
