//! 驱动状态码与运动类型

use std::fmt;

/// 厂商驱动返回的状态码（0 表示成功）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn code(self) -> i32 {
        self.0
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 笛卡尔运动插补方式
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum MotionType {
    /// 直线插补
    Linear = 0,
    /// 直线插补，不可达时退化为关节插补
    LinearOrJoint = 1,
    /// 关节插补
    Joint = 2,
}

impl MotionType {
    pub fn from_linear(linear: bool) -> Self {
        if linear {
            MotionType::Linear
        } else {
            MotionType::Joint
        }
    }
}
