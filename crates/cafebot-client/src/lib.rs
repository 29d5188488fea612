//! # Cafebot Client
//!
//! 机械臂控制层：
//!
//! - **Arm Control** (`arm`): 模式/运动状态收敛状态机、运动下发、故障恢复、偏移应用
//! - **配置查询** (`query`): 通过命令通道获取工具/基座偏移配置
//! - **重试策略** (`retry`): 硬件故障重试（带恢复动作）与通道故障重试（仅退避）
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use cafebot_client::{ArmControl, ConfigQueryClient, RetryPolicy};
//! use cafebot_channel::{ChannelConfig, CommandChannel, WsConnector};
//! use cafebot_driver::SimArm;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stand = cafebot_config::load("config/ext_config.json", "default_stand")?;
//! let connector = WsConnector::new(stand.service.uri(&stand.general.robot_ip));
//! let channel = Arc::new(CommandChannel::new(connector, ChannelConfig::default()));
//! let retry = RetryPolicy::new(stand.general.retry_attempts);
//! let offsets = Arc::new(ConfigQueryClient::new(channel, retry));
//!
//! let arm = ArmControl::builder(Arc::new(SimArm::new()), offsets, &stand).build();
//! arm.startup()?;
//! arm.park()?;
//! # Ok(())
//! # }
//! ```

pub mod arm;
pub mod error;
pub mod query;
pub mod retry;

pub use arm::{ArmControl, ArmControlBuilder, ArmSettings, ArmState, OffsetKind};
pub use error::{QueryError, RobotError};
pub use query::{ConfigQueryClient, OffsetSource};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
