//! 重试策略
//!
//! 两种策略共用同一个有界重试循环：
//! - 硬件故障重试：失败后执行恢复动作，退避，再整体重试
//! - 通道故障重试：仅退避，不做恢复
//!
//! 恢复动作只在两次尝试之间执行（N 次尝试对应 N-1 次恢复），
//! 耗尽次数后返回最后一次的错误。
//! 退避通过 `Sleeper` 注入，测试中不产生真实延迟。

use crate::{QueryError, RobotError};
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, info};

/// 退避等待抽象
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// 真实等待（spin_sleep，精度优于 `thread::sleep`）
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        spin_sleep::sleep(duration);
    }
}

/// 有界重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（至少 1）
    pub max_attempts: u32,
    /// 两次尝试之间的退避
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// 有界重试循环
    ///
    /// `is_retryable` 为假的错误立即返回；可重试错误在尝试次数未耗尽时
    /// 依次执行 `recover`、退避，然后重新执行 `op`。
    pub fn run<T, E, R, F>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut recover: R,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Display,
        R: FnMut(),
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt < attempts => {
                    error!("{}: attempt {}/{} failed: {}", label, attempt, attempts, e);
                    recover();
                    sleeper.sleep(self.backoff);
                    info!("{}: retrying...", label);
                    attempt += 1;
                },
                Err(e) => {
                    if is_retryable(&e) {
                        error!("{}: giving up after {} attempts: {}", label, attempts, e);
                    }
                    return Err(e);
                },
            }
        }
    }

    /// 硬件故障重试：硬件故障或模式收敛失败时执行恢复再重试
    pub fn with_hardware_retry<T>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        mut recover: impl FnMut() -> Result<(), RobotError>,
        op: impl FnMut() -> Result<T, RobotError>,
    ) -> Result<T, RobotError> {
        self.run(
            sleeper,
            label,
            RobotError::is_retryable,
            || {
                if let Err(e) = recover() {
                    error!("{}: recovery failed: {}", label, e);
                }
            },
            op,
        )
    }

    /// 通道故障重试：仅退避
    pub fn with_channel_retry<T>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        op: impl FnMut() -> Result<T, QueryError>,
    ) -> Result<T, QueryError> {
        self.run(sleeper, label, QueryError::is_channel_fault, || {}, op)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Sleeper;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// 记录每次等待时长的 Sleeper
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn count(&self) -> usize {
            self.sleeps.lock().len()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().push(duration);
        }
    }
}
