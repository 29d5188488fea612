use cafebot_driver::{STATE_READY, STATE_STOPPED};

/// 机械臂状态快照（诊断用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmState {
    /// 控制器报告的模式
    pub mode: i32,
    /// 控制器报告的运动状态
    pub state: i32,
    pub error_code: i32,
    pub warn_code: i32,
    /// 最近一次请求的模式
    pub asked_mode: i32,
}

impl ArmState {
    pub fn has_fault(&self) -> bool {
        self.error_code != 0 || self.warn_code != 0
    }

    pub fn is_stopped(&self) -> bool {
        self.state == STATE_STOPPED
    }

    /// 无故障、处于请求的模式且运动状态就绪
    pub fn is_ready(&self) -> bool {
        !self.has_fault() && self.mode == self.asked_mode && self.state == STATE_READY
    }
}
