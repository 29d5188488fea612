//! 组件装配：配置 → 命令通道 → 配置查询客户端 → Arm Control

use anyhow::{Context, Result};
use cafebot_channel::{ChannelConfig, CommandChannel, Connector, WsConnector};
use cafebot_client::{ArmControl, ConfigQueryClient, RetryPolicy};
use cafebot_config::StandConfig;
use cafebot_driver::{ArmDriver, SimArm};
use cafebot_protocol::QueryRequest;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 进程内共享的组件
pub struct Components {
    pub stand: StandConfig,
    pub channel: Arc<CommandChannel>,
    pub offsets: Arc<ConfigQueryClient>,
    pub arm: Arc<ArmControl>,
}

impl Components {
    /// 从配置文件装配，配置服务走 WebSocket
    pub fn load(config: &Path, stand: Option<&str>) -> Result<Self> {
        let name = cafebot_config::resolve_stand_name(stand);
        let stand = cafebot_config::load(config, &name).with_context(|| {
            format!("failed to load stand '{}' from {}", name, config.display())
        })?;

        let connector = WsConnector::new(stand.service.uri(&stand.general.robot_ip));
        info!("Config service endpoint: {}", connector.uri());

        // 没有链接厂商驱动时使用模拟机械臂
        warn!("No vendor driver linked, arm calls go to the simulated arm");
        Ok(Self::assemble(stand, connector, Arc::new(SimArm::new())))
    }

    pub fn assemble(
        stand: StandConfig,
        connector: impl Connector + 'static,
        driver: Arc<dyn ArmDriver>,
    ) -> Self {
        let channel = Arc::new(CommandChannel::new(connector, ChannelConfig::default()));
        let retry = RetryPolicy::new(stand.general.retry_attempts);
        let request = QueryRequest {
            user_id: stand.service.user_id.clone(),
            version: stand.service.version.clone(),
        };
        let offsets = Arc::new(
            ConfigQueryClient::new(channel.clone(), retry)
                .with_request(request)
                .with_timeout(stand.service.timeout()),
        );
        let arm = Arc::new(ArmControl::builder(driver, offsets.clone(), &stand).build());

        Self {
            stand,
            channel,
            offsets,
            arm,
        }
    }

    /// 连接控制器并收敛到初始模式
    pub fn startup(&self) -> Result<()> {
        self.arm.startup().with_context(|| {
            format!("arm startup at {} failed", self.stand.general.robot_ip)
        })
    }
}
