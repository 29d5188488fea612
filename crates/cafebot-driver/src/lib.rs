//! # Cafebot Driver
//!
//! xArm 厂商驱动的能力抽象。驱动本身是不透明的外部组件：
//! 上层只通过 `ArmDriver` 读取模式/运动状态/错误标志，下发模式切换、运动指令和偏移设置。
//!
//! 所有「设置」类操作返回厂商状态码，非零即故障；运动指令阻塞直到硬件报告运动完成。
//! 姿态角和偏移角度分量在驱动接口上统一以「度」为单位。
//!
//! `SimArm` 是进程内模拟实现，记录全部调用并支持故障注入，用于测试和无硬件运行。

pub mod sim;
pub mod status;

pub use sim::{CallKind, DriverCall, SimArm};
pub use status::{MotionType, StatusCode};

/// 位置控制模式
pub const MODE_POSITION: i32 = 0;

/// 运动状态：就绪
pub const STATE_READY: i32 = 0;

/// 运动状态：已停止（故障后需要恢复）
pub const STATE_STOPPED: i32 = 4;

/// 厂商驱动能力
///
/// 实现需要是线程安全的：状态读取可能与运动指令并发发生。
pub trait ArmDriver: Send + Sync {
    /// 连接到控制器
    fn connect(&self, address: &str) -> StatusCode;

    /// 当前模式
    fn mode(&self) -> i32;

    /// 当前运动状态
    fn state(&self) -> i32;

    fn error_code(&self) -> i32;

    fn warn_code(&self) -> i32;

    /// 是否存在锁存的错误或警告
    fn has_err_warn(&self) -> bool {
        self.error_code() != 0 || self.warn_code() != 0
    }

    fn set_mode(&self, mode: i32) -> StatusCode;

    fn set_state(&self, state: i32) -> StatusCode;

    /// 关节角运动（度），`wait` 为真时阻塞到运动完成
    fn set_servo_angle(&self, angles: &[f64; 6], speed: f64, wait: bool) -> StatusCode;

    /// 笛卡尔运动（位置 mm，姿态度）
    fn set_position(
        &self,
        position: &[f64; 3],
        orientation: &[f64; 3],
        speed: f64,
        motion: MotionType,
        wait: bool,
    ) -> StatusCode;

    fn clean_error(&self) -> StatusCode;

    fn clean_warn(&self) -> StatusCode;

    fn motion_enable(&self, enable: bool) -> StatusCode;

    /// 设置工具坐标偏移 `[x, y, z, roll, pitch, yaw]`（角度为度）
    fn set_tcp_offset(&self, offset: &[f64; 6]) -> StatusCode;

    /// 读取当前工具坐标偏移
    fn tcp_offset(&self) -> (StatusCode, [f64; 6]);

    /// 设置基座（世界坐标）偏移（角度为度）
    fn set_world_offset(&self, offset: &[f64; 6]) -> StatusCode;

    fn world_offset(&self) -> (StatusCode, [f64; 6]);
}
