//! 进程内模拟机械臂
//!
//! 行为尽量贴近控制器：
//! - 存在锁存错误/警告时拒绝运动（状态码 1）
//! - 运动状态为已停止时拒绝运动（状态码 9）
//! - `set_mode` 后需要 `set_state(0)` 才回到就绪
//!
//! 每次写操作都记录为 `DriverCall`，测试可以断言精确的调用序列。

use crate::{ArmDriver, MODE_POSITION, MotionType, STATE_READY, STATE_STOPPED, StatusCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 存在错误/警告时的状态码
const CODE_HAS_ERR_WARN: i32 = 1;
/// 运动状态非就绪时的状态码
const CODE_NOT_READY: i32 = 9;

/// 记录的驱动调用
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Connect(String),
    SetMode(i32),
    SetState(i32),
    SetServoAngle {
        angles: [f64; 6],
        speed: f64,
    },
    SetPosition {
        position: [f64; 3],
        orientation: [f64; 3],
        speed: f64,
        motion: MotionType,
    },
    CleanError,
    CleanWarn,
    MotionEnable(bool),
    SetTcpOffset([f64; 6]),
    SetWorldOffset([f64; 6]),
}

impl DriverCall {
    /// 是否为运动指令
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            DriverCall::SetServoAngle { .. } | DriverCall::SetPosition { .. }
        )
    }

    fn kind(&self) -> CallKind {
        match self {
            DriverCall::Connect(_) => CallKind::Connect,
            DriverCall::SetMode(_) => CallKind::SetMode,
            DriverCall::SetState(_) => CallKind::SetState,
            DriverCall::SetServoAngle { .. } => CallKind::SetServoAngle,
            DriverCall::SetPosition { .. } => CallKind::SetPosition,
            DriverCall::CleanError => CallKind::CleanError,
            DriverCall::CleanWarn => CallKind::CleanWarn,
            DriverCall::MotionEnable(_) => CallKind::MotionEnable,
            DriverCall::SetTcpOffset(_) => CallKind::SetTcpOffset,
            DriverCall::SetWorldOffset(_) => CallKind::SetWorldOffset,
        }
    }
}

/// 可注入故障的调用类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Connect,
    SetMode,
    SetState,
    SetServoAngle,
    SetPosition,
    CleanError,
    CleanWarn,
    MotionEnable,
    SetTcpOffset,
    SetWorldOffset,
}

#[derive(Debug)]
struct SimState {
    address: Option<String>,
    mode: i32,
    state: i32,
    error_code: i32,
    warn_code: i32,
    motion_enabled: bool,
    joints: [f64; 6],
    position: [f64; 3],
    orientation: [f64; 3],
    tcp_offset: [f64; 6],
    world_offset: [f64; 6],
    // 故障注入
    fail_next: HashMap<CallKind, Vec<i32>>,
    reject_mode_changes: bool,
    readback_perturbation: [f64; 6],
    calls: Vec<DriverCall>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            address: None,
            mode: MODE_POSITION,
            state: STATE_READY,
            error_code: 0,
            warn_code: 0,
            motion_enabled: true,
            joints: [0.0; 6],
            position: [0.0; 3],
            orientation: [0.0; 3],
            tcp_offset: [0.0; 6],
            world_offset: [0.0; 6],
            fail_next: HashMap::new(),
            reject_mode_changes: false,
            readback_perturbation: [0.0; 6],
            calls: Vec::new(),
        }
    }
}

impl SimState {
    /// 记录调用，并取出为该类调用注入的故障码
    fn record(&mut self, call: DriverCall) -> Option<StatusCode> {
        let kind = call.kind();
        self.calls.push(call);
        let queue = self.fail_next.get_mut(&kind)?;
        if queue.is_empty() {
            return None;
        }
        Some(StatusCode(queue.remove(0)))
    }

    fn motion_precondition(&self) -> StatusCode {
        if self.error_code != 0 || self.warn_code != 0 {
            StatusCode(CODE_HAS_ERR_WARN)
        } else if self.state == STATE_STOPPED || !self.motion_enabled {
            StatusCode(CODE_NOT_READY)
        } else {
            StatusCode::OK
        }
    }
}

fn perturbed(values: [f64; 6], delta: [f64; 6]) -> [f64; 6] {
    let mut out = values;
    for (value, d) in out.iter_mut().zip(delta) {
        *value += d;
    }
    out
}

/// 模拟机械臂
#[derive(Debug, Default)]
pub struct SimArm {
    state: Mutex<SimState>,
}

impl SimArm {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定模式和运动状态启动
    pub fn with_mode(mode: i32, state: i32) -> Self {
        let sim = Self::new();
        {
            let mut s = sim.state.lock();
            s.mode = mode;
            s.state = state;
        }
        sim
    }

    /// 锁存一个错误码（同时进入已停止状态）
    pub fn latch_error(&self, code: i32) {
        let mut s = self.state.lock();
        s.error_code = code;
        s.state = STATE_STOPPED;
    }

    pub fn latch_warn(&self, code: i32) {
        self.state.lock().warn_code = code;
    }

    /// 让下一次该类调用返回 `code`（可多次排队）
    pub fn fail_next(&self, kind: CallKind, code: i32) {
        self.state.lock().fail_next.entry(kind).or_default().push(code);
    }

    /// `set_mode` 返回成功但模式不变
    pub fn reject_mode_changes(&self, reject: bool) {
        self.state.lock().reject_mode_changes = reject;
    }

    /// 偏移读回时叠加的扰动（驱动单位）
    pub fn perturb_offset_readback(&self, delta: [f64; 6]) {
        self.state.lock().readback_perturbation = delta;
    }

    /// 直接设置运动状态（模拟外部急停等）
    pub fn force_state(&self, state: i32) {
        self.state.lock().state = state;
    }

    pub fn address(&self) -> Option<String> {
        self.state.lock().address.clone()
    }

    pub fn joints(&self) -> [f64; 6] {
        self.state.lock().joints
    }

    /// 当前笛卡尔位姿（位置, 姿态）
    pub fn pose(&self) -> ([f64; 3], [f64; 3]) {
        let s = self.state.lock();
        (s.position, s.orientation)
    }

    /// 已记录的调用
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// 统计满足条件的调用次数
    pub fn count_calls(&self, predicate: impl Fn(&DriverCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(*c)).count()
    }
}

impl ArmDriver for SimArm {
    fn connect(&self, address: &str) -> StatusCode {
        let mut s = self.state.lock();
        if let Some(code) = s.record(DriverCall::Connect(address.to_string())) {
            warn!("Simulated connect to {} failed: {}", address, code);
            return code;
        }
        s.address = Some(address.to_string());
        info!("Simulated arm connected at {}", address);
        StatusCode::OK
    }

    fn mode(&self) -> i32 {
        self.state.lock().mode
    }

    fn state(&self) -> i32 {
        self.state.lock().state
    }

    fn error_code(&self) -> i32 {
        self.state.lock().error_code
    }

    fn warn_code(&self) -> i32 {
        self.state.lock().warn_code
    }

    fn set_mode(&self, mode: i32) -> StatusCode {
        let mut s = self.state.lock();
        if let Some(code) = s.record(DriverCall::SetMode(mode)) {
            return code;
        }
        if !s.reject_mode_changes {
            s.mode = mode;
        }
        StatusCode::OK
    }

    fn set_state(&self, state: i32) -> StatusCode {
        let mut s = self.state.lock();
        if let Some(code) = s.record(DriverCall::SetState(state)) {
            return code;
        }
        // 存在错误时控制器拒绝离开停止状态
        if s.error_code != 0 && state == STATE_READY {
            return StatusCode(CODE_HAS_ERR_WARN);
        }
        s.state = state;
        StatusCode::OK
    }

    fn set_servo_angle(&self, angles: &[f64; 6], speed: f64, _wait: bool) -> StatusCode {
        let mut s = self.state.lock();
        let call = DriverCall::SetServoAngle {
            angles: *angles,
            speed,
        };
        if let Some(code) = s.record(call) {
            return code;
        }
        let status = s.motion_precondition();
        if status.is_ok() {
            s.joints = *angles;
            debug!("Simulated joint move to {:?} at {}", angles, speed);
        }
        status
    }

    fn set_position(
        &self,
        position: &[f64; 3],
        orientation: &[f64; 3],
        speed: f64,
        motion: MotionType,
        _wait: bool,
    ) -> StatusCode {
        let mut s = self.state.lock();
        let call = DriverCall::SetPosition {
            position: *position,
            orientation: *orientation,
            speed,
            motion,
        };
        if let Some(code) = s.record(call) {
            return code;
        }
        let status = s.motion_precondition();
        if status.is_ok() {
            s.position = *position;
            s.orientation = *orientation;
            debug!(
                "Simulated {:?} move to {:?} / {:?} at {}",
                motion, position, orientation, speed
            );
        }
        status
    }

    fn clean_error(&self) -> StatusCode {
        let mut s = self.state.lock();
        if let Some(code) = s.record(DriverCall::CleanError) {
            return code;
        }
        s.error_code = 0;
        StatusCode::OK
    }

    fn clean_warn(&self) -> StatusCode {
        let mut s = self.state.lock();
        if let Some(code) = s.record(DriverCall::CleanWarn) {
            return code;
        }
        s.warn_code = 0;
        StatusCode::OK
    }

    fn motion_enable(&self, enable: bool) -> StatusCode {
        let mut s = self.state.lock();
        if let Some(code) = s.record(DriverCall::MotionEnable(enable)) {
            return code;
        }
        s.motion_enabled = enable;
        StatusCode::OK
    }

    fn set_tcp_offset(&self, offset: &[f64; 6]) -> StatusCode {
        let mut s = self.state.lock();
        if let Some(code) = s.record(DriverCall::SetTcpOffset(*offset)) {
            return code;
        }
        s.tcp_offset = *offset;
        // 设置偏移后控制器需要重新使能
        s.state = STATE_STOPPED;
        StatusCode::OK
    }

    fn tcp_offset(&self) -> (StatusCode, [f64; 6]) {
        let s = self.state.lock();
        (
            StatusCode::OK,
            perturbed(s.tcp_offset, s.readback_perturbation),
        )
    }

    fn set_world_offset(&self, offset: &[f64; 6]) -> StatusCode {
        let mut s = self.state.lock();
        if let Some(code) = s.record(DriverCall::SetWorldOffset(*offset)) {
            return code;
        }
        s.world_offset = *offset;
        s.state = STATE_STOPPED;
        StatusCode::OK
    }

    fn world_offset(&self) -> (StatusCode, [f64; 6]) {
        let s = self.state.lock();
        (
            StatusCode::OK,
            perturbed(s.world_offset, s.readback_perturbation),
        )
    }
}
