//! 工位配置记录

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 单个工位的完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandConfig {
    pub general: GeneralConfig,
    pub poses: Poses,
    pub velocities: Velocities,
    /// 配置服务连接参数（可省略）
    #[serde(default)]
    pub service: ServiceConfig,
}

/// 通用参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// 机械臂控制器地址
    pub robot_ip: String,
    /// 硬件故障/通道故障重试的最大尝试次数
    pub retry_attempts: u32,
}

/// 位姿：关节空间或笛卡尔空间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Pose {
    /// 六个关节角（度）
    Joint { values: [f64; 6] },
    /// 笛卡尔位姿：位置（mm）、姿态（度）、参考坐标系名、工具偏移名
    Cartesian {
        position: [f64; 3],
        orientation: [f64; 3],
        frame: String,
        tcp: String,
    },
}

impl Pose {
    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        let finite = match self {
            Pose::Joint { values } => values.iter().all(|v| v.is_finite()),
            Pose::Cartesian {
                position,
                orientation,
                tcp,
                ..
            } => {
                if tcp.is_empty() {
                    return Err(ConfigError::invalid(field, "tool offset name is empty"));
                }
                position.iter().chain(orientation).all(|v| v.is_finite())
            },
        };
        if finite {
            Ok(())
        } else {
            Err(ConfigError::invalid(field, "pose values must be finite"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poses {
    pub park: Pose,
    pub stand: Pose,
}

/// 速度档位（关节速度 °/s，直线速度 mm/s）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub joint: f64,
    pub linear: f64,
}

impl Velocity {
    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        for (name, value) in [("joint", self.joint), ("linear", self.linear)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::invalid(
                    &format!("{field}.{name}"),
                    format!("speed must be a positive number, got {value}"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocities {
    pub reduced: Velocity,
    pub normal: Velocity,
}

/// 配置服务（控制器上的 WebSocket 服务）参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub port: u16,
    pub path: String,
    pub user_id: String,
    pub version: String,
    /// 单条查询的等待超时（毫秒）
    pub timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 18333,
            path: "/ws?channel=prod&lang=en&v=1".to_string(),
            user_id: "test".to_string(),
            version: "xarm6".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl ServiceConfig {
    /// `ws://{host}:{port}{path}`
    pub fn uri(&self, host: &str) -> String {
        format!("ws://{}:{}{}", host, self.port, self.path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl StandConfig {
    /// 从 JSON 文本中取出指定工位
    pub fn from_json_str(text: &str, stand: &str) -> Result<Self, ConfigError> {
        let root: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
        let Some(record) = root.get(stand) else {
            return Err(ConfigError::StandNotFound {
                stand: stand.to_string(),
                available: root.keys().cloned().collect(),
            });
        };
        let config: StandConfig = serde_json::from_value(record.clone())?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文本中取出指定工位
    pub fn from_toml_str(text: &str, stand: &str) -> Result<Self, ConfigError> {
        let root: toml::Table = toml::from_str(text)?;
        let Some(record) = root.get(stand) else {
            return Err(ConfigError::StandNotFound {
                stand: stand.to_string(),
                available: root.keys().cloned().collect(),
            });
        };
        let config: StandConfig = record.clone().try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验字段取值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.robot_ip.trim().is_empty() {
            return Err(ConfigError::invalid("general.robot_ip", "address is empty"));
        }
        if self.general.retry_attempts == 0 {
            return Err(ConfigError::invalid(
                "general.retry_attempts",
                "at least one attempt is required",
            ));
        }
        self.poses.park.validate("poses.park")?;
        self.poses.stand.validate("poses.stand")?;
        self.velocities.reduced.validate("velocities.reduced")?;
        self.velocities.normal.validate("velocities.normal")?;
        if self.service.timeout_ms == 0 {
            return Err(ConfigError::invalid("service.timeout_ms", "timeout is zero"));
        }
        Ok(())
    }
}
