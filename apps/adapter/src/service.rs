//! 运动门面
//!
//! 对外只暴露「成功/失败 + 消息」；控制层的最终错误在这里转换为失败应答，
//! 不会让进程崩溃。

use cafebot_client::{ArmControl, RobotError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// 门面应答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleResponse {
    pub success: bool,
    pub message: String,
}

impl SimpleResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "ok".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 门面请求（`{"method": "park"}`）
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub method: String,
}

pub struct MovementsService {
    arm: Arc<ArmControl>,
}

impl MovementsService {
    pub fn new(arm: Arc<ArmControl>) -> Self {
        Self { arm }
    }

    pub fn park(&self) -> SimpleResponse {
        info!("Park requested");
        respond("park", self.arm.park())
    }

    pub fn stand(&self) -> SimpleResponse {
        info!("Stand requested");
        respond("stand", self.arm.stand())
    }

    /// 清除故障并重新使能
    pub fn enable(&self) -> SimpleResponse {
        info!("Enable requested");
        respond("enable", self.arm.recover())
    }

    pub fn dispatch(&self, request: &Request) -> SimpleResponse {
        match request.method.as_str() {
            "park" => self.park(),
            "stand" => self.stand(),
            "enable" => self.enable(),
            other => SimpleResponse::failed(format!("unknown method '{}'", other)),
        }
    }
}

fn respond(operation: &str, result: Result<(), RobotError>) -> SimpleResponse {
    match result {
        Ok(()) => SimpleResponse::ok(),
        Err(e) => {
            error!("{} failed: {}", operation, e);
            SimpleResponse::failed(e.to_string())
        },
    }
}


#[cfg(test)]
mod tests {
    use super::testing::sim_arm;
    use super::*;
    use cafebot_driver::{CallKind, DriverCall, SimArm};

    #[test]
    fn test_park_ok() {
        let sim = Arc::new(SimArm::new());
        let service = MovementsService::new(sim_arm(sim.clone()));

        assert_eq!(service.park(), SimpleResponse::ok());
        assert_eq!(sim.count_calls(DriverCall::is_motion), 1);
    }

    /// 测试运动最终失败时返回失败应答而不是崩溃
    #[test]
    fn test_park_failure_is_reported() {
        let sim = Arc::new(SimArm::new());
        sim.fail_next(CallKind::SetPosition, 31);
        sim.fail_next(CallKind::SetPosition, 31);
        let service = MovementsService::new(sim_arm(sim.clone()));

        let response = service.park();
        assert!(!response.success);
        assert_eq!(response.message, "set_position failed with status 31");
    }

    #[test]
    fn test_dispatch() {
        let sim = Arc::new(SimArm::new());
        let service = MovementsService::new(sim_arm(sim.clone()));

        let stand = Request {
            method: "stand".to_string(),
        };
        assert!(service.dispatch(&stand).success);
        assert_eq!(sim.joints(), [0.0, -45.0, -30.0, 0.0, 75.0, 0.0]);

        let unknown = Request {
            method: "dance".to_string(),
        };
        assert_eq!(
            service.dispatch(&unknown),
            SimpleResponse::failed("unknown method 'dance'")
        );
    }

    #[test]
    fn test_enable_clears_fault() {
        let sim = Arc::new(SimArm::new());
        sim.latch_error(22);
        let service = MovementsService::new(sim_arm(sim.clone()));

        assert!(service.enable().success);
        assert_eq!(sim.calls()[0], DriverCall::CleanError);
    }
}
