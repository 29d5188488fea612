//! Arm Control
//!
//! 持有驱动句柄，实现：
//! - 模式/运动状态收敛（`converge`）
//! - 故障恢复（`recover`）
//! - 运动下发（`move_to` / `park` / `stand`）
//! - 工具/基座偏移应用（`apply_tool_offset` / `apply_base_offset`）
//!
//! # 并发
//!
//! 公开操作在 `motion_lock` 下串行执行：上一条收敛/运动调用返回前不会下发新的运动。
//! 恢复动作使用独立的 `recover_lock`，保证同一时刻只有一个恢复序列在执行。
//! 每个公开操作整体包在硬件故障重试中，内部组合使用不带重试的 `*_once` 版本，
//! 避免重试嵌套。

mod offset;
mod state;

pub use offset::OffsetKind;
pub use state::ArmState;

use crate::RobotError;
use crate::query::OffsetSource;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use cafebot_config::{Pose, Poses, StandConfig, Velocities, Velocity};
use cafebot_driver::{ArmDriver, MODE_POSITION, MotionType, STATE_READY, STATE_STOPPED, StatusCode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// Arm Control 运行参数
///
/// ```
/// use cafebot_client::{ArmSettings, RetryPolicy};
///
/// // 默认：3 次尝试，1s 退避，100ms 模式切换稳定时间，偏移容差 0.01
/// let settings = ArmSettings::default();
///
/// let settings = ArmSettings {
///     retry: RetryPolicy::new(5),
///     ..ArmSettings::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmSettings {
    /// 硬件故障重试策略
    pub retry: RetryPolicy,
    /// 设置模式后等待控制器稳定的时间
    pub settle: Duration,
    /// 偏移读回的容差（6 维差向量的欧氏范数）
    pub offset_tolerance: f64,
}

impl Default for ArmSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            settle: Duration::from_millis(100),
            offset_tolerance: 0.01,
        }
    }
}

/// `ArmControl` 构造器
pub struct ArmControlBuilder {
    driver: Arc<dyn ArmDriver>,
    offsets: Arc<dyn OffsetSource>,
    address: String,
    poses: Poses,
    velocities: Velocities,
    settings: ArmSettings,
    sleeper: Arc<dyn Sleeper>,
}

impl ArmControlBuilder {
    /// 从工位配置创建，重试次数取自 `general.retry_attempts`
    pub fn new(
        driver: Arc<dyn ArmDriver>,
        offsets: Arc<dyn OffsetSource>,
        stand: &StandConfig,
    ) -> Self {
        Self {
            driver,
            offsets,
            address: stand.general.robot_ip.clone(),
            poses: stand.poses.clone(),
            velocities: stand.velocities,
            settings: ArmSettings {
                retry: RetryPolicy::new(stand.general.retry_attempts),
                ..ArmSettings::default()
            },
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn settings(mut self, settings: ArmSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn build(self) -> ArmControl {
        ArmControl {
            driver: self.driver,
            offsets: self.offsets,
            address: self.address,
            poses: self.poses,
            velocities: self.velocities,
            settings: self.settings,
            sleeper: self.sleeper,
            asked_mode: Mutex::new(MODE_POSITION),
            recover_lock: Mutex::new(()),
            motion_lock: Mutex::new(()),
        }
    }
}

/// 机械臂控制器
pub struct ArmControl {
    driver: Arc<dyn ArmDriver>,
    offsets: Arc<dyn OffsetSource>,
    address: String,
    poses: Poses,
    velocities: Velocities,
    settings: ArmSettings,
    sleeper: Arc<dyn Sleeper>,
    /// 最近一次请求的模式，恢复时重新应用
    asked_mode: Mutex<i32>,
    recover_lock: Mutex<()>,
    motion_lock: Mutex<()>,
}

/// 将非零状态码转换为硬件故障
fn check(code: StatusCode, operation: &'static str) -> Result<(), RobotError> {
    if code.is_ok() {
        Ok(())
    } else {
        error!("{} failed: {}", operation, code);
        Err(RobotError::DriverStatus { operation, code })
    }
}

impl ArmControl {
    pub fn builder(
        driver: Arc<dyn ArmDriver>,
        offsets: Arc<dyn OffsetSource>,
        stand: &StandConfig,
    ) -> ArmControlBuilder {
        ArmControlBuilder::new(driver, offsets, stand)
    }

    pub fn settings(&self) -> &ArmSettings {
        &self.settings
    }

    pub fn asked_mode(&self) -> i32 {
        *self.asked_mode.lock()
    }

    /// 连接控制器并收敛到请求的模式（初始为位置模式）
    pub fn startup(&self) -> Result<(), RobotError> {
        info!("Connecting to arm at {}", self.address);
        let code = self.driver.connect(&self.address);
        if !code.is_ok() {
            return Err(RobotError::Connect {
                address: self.address.clone(),
                code,
            });
        }
        let mode = self.asked_mode();
        self.converge(mode)
    }

    /// 收敛到指定模式（带硬件故障重试）
    pub fn converge(&self, mode: i32) -> Result<(), RobotError> {
        let _motion = self.motion_lock.lock();
        self.with_retry("converge", || self.converge_once(mode))
    }

    /// 恢复：清除错误/警告、重新使能、重新应用请求的模式并回到就绪（带硬件故障重试）
    pub fn recover(&self) -> Result<(), RobotError> {
        let _motion = self.motion_lock.lock();
        // 操作本身即恢复序列：两次尝试之间只退避
        self.settings.retry.run(
            self.sleeper.as_ref(),
            "recover",
            RobotError::is_retryable,
            || {},
            || self.recover_once(),
        )
    }

    /// 运动到指定位姿（带硬件故障重试）
    ///
    /// 笛卡尔位姿会先应用其工具偏移；`linear` 选择直线或关节插补。
    pub fn move_to(&self, pose: &Pose, velocity: Velocity, linear: bool) -> Result<(), RobotError> {
        let _motion = self.motion_lock.lock();
        self.with_retry("move_to", || self.move_once(pose, velocity, linear))
    }

    /// 以低速直线插补运动到停靠位姿
    pub fn park(&self) -> Result<(), RobotError> {
        info!("Parking arm");
        self.move_to(&self.poses.park, self.velocities.reduced, true)
    }

    /// 以常规速度关节插补运动到工作位姿
    pub fn stand(&self) -> Result<(), RobotError> {
        info!("Moving arm to stand pose");
        self.move_to(&self.poses.stand, self.velocities.normal, false)
    }

    /// 应用命名工具偏移（带硬件故障重试）
    pub fn apply_tool_offset(&self, name: &str) -> Result<(), RobotError> {
        let _motion = self.motion_lock.lock();
        self.with_retry("apply_tool_offset", || {
            self.apply_offset_once(OffsetKind::Tool, name)
        })
    }

    /// 应用命名基座偏移（带硬件故障重试）
    pub fn apply_base_offset(&self, name: &str) -> Result<(), RobotError> {
        let _motion = self.motion_lock.lock();
        self.with_retry("apply_base_offset", || {
            self.apply_offset_once(OffsetKind::Base, name)
        })
    }

    /// 读取当前状态快照
    pub fn state(&self) -> ArmState {
        ArmState {
            mode: self.driver.mode(),
            state: self.driver.state(),
            error_code: self.driver.error_code(),
            warn_code: self.driver.warn_code(),
            asked_mode: self.asked_mode(),
        }
    }

    fn with_retry<T>(
        &self,
        label: &str,
        op: impl FnMut() -> Result<T, RobotError>,
    ) -> Result<T, RobotError> {
        self.settings.retry.with_hardware_retry(
            self.sleeper.as_ref(),
            label,
            || self.recover_once(),
            op,
        )
    }

    fn converge_once(&self, mode: i32) -> Result<(), RobotError> {
        let error_code = self.driver.error_code();
        let warn_code = self.driver.warn_code();
        if error_code != 0 || warn_code != 0 {
            warn!(
                "Refusing mode change while faulted: error {}, warning {}",
                error_code, warn_code
            );
            return Err(RobotError::FaultLatched {
                error_code,
                warn_code,
            });
        }

        *self.asked_mode.lock() = mode;
        let current = self.driver.mode();
        if current == mode {
            trace!("Arm already in mode {}", mode);
            return Ok(());
        }

        info!("Setting mode {} -> {}", current, mode);
        if self.driver.state() == STATE_STOPPED {
            self.recover_once()?;
        }
        check(self.driver.set_mode(mode), "set_mode")?;
        check(self.driver.set_state(STATE_READY), "set_state")?;
        self.sleeper.sleep(self.settings.settle);

        let reported_mode = self.driver.mode();
        let reported_state = self.driver.state();
        if reported_mode != mode || reported_state != STATE_READY {
            return Err(RobotError::ModeConvergence {
                asked: mode,
                mode: reported_mode,
                state: reported_state,
            });
        }
        Ok(())
    }

    fn recover_once(&self) -> Result<(), RobotError> {
        let _recovering = self.recover_lock.lock();
        let asked = self.asked_mode();
        info!("Enabling arm (asked mode {})", asked);

        check(self.driver.clean_error(), "clean_error")?;
        check(self.driver.clean_warn(), "clean_warn")?;
        check(self.driver.motion_enable(true), "motion_enable")?;
        check(self.driver.set_mode(asked), "set_mode")?;
        check(self.driver.set_state(STATE_READY), "set_state")?;
        Ok(())
    }

    fn move_once(&self, pose: &Pose, velocity: Velocity, linear: bool) -> Result<(), RobotError> {
        self.converge_once(MODE_POSITION)?;
        match pose {
            Pose::Joint { values } => {
                info!("Joint move to {:?} at {}", values, velocity.joint);
                check(
                    self.driver.set_servo_angle(values, velocity.joint, true),
                    "set_servo_angle",
                )
            },
            Pose::Cartesian {
                position,
                orientation,
                frame,
                tcp,
            } => {
                self.apply_offset_once(OffsetKind::Tool, tcp)?;
                let motion = MotionType::from_linear(linear);
                info!(
                    "{:?} move to {:?} / {:?} in frame '{}' at {}",
                    motion, position, orientation, frame, velocity.linear
                );
                check(
                    self.driver.set_position(
                        position,
                        orientation,
                        velocity.linear,
                        motion,
                        true,
                    ),
                    "set_position",
                )
            },
        }
    }
}
