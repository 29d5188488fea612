//! # Cafebot Config
//!
//! 每个工位（stand）一份静态配置：机械臂地址、重试次数、命名位姿和速度档位。
//!
//! 配置文件顶层以工位名为键，按文件扩展名选择格式（`.toml` 为 TOML，其余为 JSON）。
//! 所有字段在加载时完成解析和校验，校验失败时不会触碰任何硬件或网络。
//!
//! ```json
//! {
//!   "default_stand": {
//!     "general": {"robot_ip": "192.168.1.196", "retry_attempts": 3},
//!     "poses": {
//!       "park": {"type": "joint", "values": [0, -60, -20, 0, 80, 0]},
//!       "stand": {"type": "cartesian", "position": [200, 0, 100],
//!                 "orientation": [180, 0, 0], "frame": "base", "tcp": "gripper_A"}
//!     },
//!     "velocities": {
//!       "reduced": {"joint": 20, "linear": 50},
//!       "normal": {"joint": 60, "linear": 200}
//!     }
//!   }
//! }
//! ```

mod error;
mod stand;

pub use error::ConfigError;
pub use stand::{GeneralConfig, Pose, Poses, ServiceConfig, StandConfig, Velocities, Velocity};

use std::path::Path;
use tracing::{info, warn};

/// 选择工位的环境变量
pub const STAND_ENV: &str = "STAND_NAME";

/// 未指定工位时使用的默认名称
pub const DEFAULT_STAND: &str = "default_stand";

/// 确定工位名：显式指定 > 环境变量 `STAND_NAME` > `default_stand`
pub fn resolve_stand_name(explicit: Option<&str>) -> String {
    if let Some(name) = explicit.filter(|name| !name.is_empty()) {
        return name.to_string();
    }
    match std::env::var(STAND_ENV) {
        Ok(name) if !name.is_empty() => name,
        _ => {
            warn!(
                "\"{}\" environment variable not set, using: {}",
                STAND_ENV, DEFAULT_STAND
            );
            DEFAULT_STAND.to_string()
        },
    }
}

/// 从文件加载指定工位的配置
pub fn load<P: AsRef<Path>>(path: P, stand: &str) -> Result<StandConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading config for stand '{}' from {}", stand, path.display());

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let config = if is_toml {
        StandConfig::from_toml_str(&text, stand)?
    } else {
        StandConfig::from_json_str(&text, stand)?
    };

    info!(
        "Stand '{}': robot at {}, {} retry attempts",
        stand, config.general.robot_ip, config.general.retry_attempts
    );
    Ok(config)
}
