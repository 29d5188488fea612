//! 控制层错误类型

use crate::arm::OffsetKind;
use cafebot_channel::ChannelError;
use cafebot_driver::StatusCode;
use cafebot_protocol::ProtocolError;
use thiserror::Error;

/// 配置查询错误
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// 应答内容不符合预期格式
    #[error("Unexpected reply: {0}")]
    Protocol(#[from] ProtocolError),
}

impl QueryError {
    /// 是否属于可由通道重试处理的故障
    pub fn is_channel_fault(&self) -> bool {
        matches!(self, QueryError::Channel(e) if e.is_channel_fault())
    }
}

/// 机械臂控制错误
#[derive(Error, Debug)]
pub enum RobotError {
    #[error("Failed to connect to arm at {address}: status {code}")]
    Connect { address: String, code: StatusCode },

    /// 驱动调用返回非零状态码
    #[error("{operation} failed with status {code}")]
    DriverStatus {
        operation: &'static str,
        code: StatusCode,
    },

    /// 控制器存在锁存的错误或警告
    #[error("Arm has error or warning: error {error_code}, warning {warn_code}")]
    FaultLatched { error_code: i32, warn_code: i32 },

    /// 偏移读回值与目标值偏差过大
    #[error("{kind} offset readback deviates by {deviation:.4} (tolerance {tolerance})")]
    OffsetMismatch {
        kind: OffsetKind,
        deviation: f64,
        tolerance: f64,
    },

    /// 设置模式后读回的模式/运动状态不符
    #[error("Current mode: {mode}, state: {state}, asked mode: {asked}")]
    ModeConvergence { asked: i32, mode: i32, state: i32 },

    /// 配置服务中没有该名称的偏移配置（配置错误，不重试）
    #[error("{kind} offset profile '{name}' not found")]
    ProfileNotFound { kind: OffsetKind, name: String },

    #[error("Offset query failed: {0}")]
    Query(#[from] QueryError),
}

impl RobotError {
    /// 是否为硬件故障
    pub fn is_hardware_fault(&self) -> bool {
        matches!(
            self,
            RobotError::DriverStatus { .. }
                | RobotError::FaultLatched { .. }
                | RobotError::OffsetMismatch { .. }
        )
    }

    /// 是否可由硬件重试策略（恢复 + 重试）处理
    pub fn is_retryable(&self) -> bool {
        self.is_hardware_fault() || matches!(self, RobotError::ModeConvergence { .. })
    }
}
