//! # Cafebot Command Channel
//!
//! 与 xArm 配置服务之间的命令通道：单条持久连接 + 后台接收线程 + 按关联 ID 配对的应答表。
//!
//! # 架构
//!
//! - **传输层** (`transport`): `FrameTransport` / `Connector` 抽象，真实实现为 WebSocket (`ws`)
//! - **应答表** (`pending`): 每条在途命令一个单次通知槽位
//! - **通道** (`channel`): 连接生命周期、发送重试、等待应答
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use cafebot_channel::{ChannelConfig, CommandChannel, WsConnector};
//! use std::time::Duration;
//!
//! let connector = WsConnector::new("ws://192.168.1.10:18333/ws");
//! let channel = CommandChannel::new(connector, ChannelConfig::default());
//!
//! let id = channel.send("get_world_offset_config", serde_json::json!({}))?;
//! let data = channel.await_response(id, Duration::from_secs(2))?;
//! # Ok::<(), cafebot_channel::ChannelError>(())
//! ```

pub mod channel;
pub mod error;
pub mod pending;
pub mod transport;
pub mod ws;

#[cfg(feature = "mock")]
pub mod mock;

pub use channel::{ChannelConfig, CommandChannel};
pub use error::{ChannelError, TransportError};
pub use pending::{FulfillOutcome, PendingTable};
pub use transport::{Connector, FrameTransport};
pub use ws::{WsConnector, WsTransport};

#[cfg(feature = "mock")]
pub use mock::{MockConnector, MockServer, MockTransport};

// 重新导出协议层关联 ID
pub use cafebot_protocol::CorrelationId;
