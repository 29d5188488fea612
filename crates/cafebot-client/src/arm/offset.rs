//! 工具/基座偏移应用
//!
//! 流程：查询命名配置 → 以驱动单位下发 → 读回并规范化 → 容差比较 → 恢复。
//! 控制器设置偏移后需要重新使能，因此成功后总是执行一次恢复。

use super::{ArmControl, check};
use crate::RobotError;
use cafebot_protocol::{Offset, normalize_offset, to_driver_units};
use nalgebra::Vector6;
use std::fmt;
use tracing::{debug, info, warn};

/// 偏移类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetKind {
    /// 工具坐标（TCP）偏移
    Tool,
    /// 基座（世界坐标）偏移
    Base,
}

impl fmt::Display for OffsetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetKind::Tool => write!(f, "tool"),
            OffsetKind::Base => write!(f, "base"),
        }
    }
}

/// 两个偏移向量之差的欧氏范数
pub(crate) fn offset_deviation(target: &[f64; 6], actual: &[f64; 6]) -> f64 {
    (Vector6::from(*target) - Vector6::from(*actual)).norm()
}

impl ArmControl {
    fn lookup_profile(&self, kind: OffsetKind, name: &str) -> Result<Offset, RobotError> {
        let found = match kind {
            OffsetKind::Tool => self.offsets.tool_offsets()?.remove(name),
            OffsetKind::Base => self.offsets.base_offsets()?.profiles.remove(name),
        };
        found.ok_or_else(|| {
            warn!("{} offset profile '{}' not found", kind, name);
            RobotError::ProfileNotFound {
                kind,
                name: name.to_string(),
            }
        })
    }

    pub(super) fn apply_offset_once(&self, kind: OffsetKind, name: &str) -> Result<(), RobotError> {
        let target = self.lookup_profile(kind, name)?.to_array();
        let raw = to_driver_units(target);
        debug!("Setting {} offset '{}' to {:?}", kind, name, raw);

        let (readback_status, readback) = match kind {
            OffsetKind::Tool => {
                check(self.driver.set_tcp_offset(&raw), "set_tcp_offset")?;
                self.driver.tcp_offset()
            },
            OffsetKind::Base => {
                check(self.driver.set_world_offset(&raw), "set_world_offset")?;
                self.driver.world_offset()
            },
        };
        check(readback_status, "offset readback")?;

        let actual = normalize_offset(readback);
        let deviation = offset_deviation(&target, &actual);
        let tolerance = self.settings.offset_tolerance;
        if deviation > tolerance {
            warn!(
                "{} offset '{}' readback {:?} deviates from {:?} by {:.4}",
                kind, name, actual, target, deviation
            );
            return Err(RobotError::OffsetMismatch {
                kind,
                deviation,
                tolerance,
            });
        }

        info!("{} offset '{}' applied", kind, name);
        self.recover_once()
    }
}
