use chrono::{DateTime, Duration, Utc};
use std::sync::{PoisonError, RwLock};

/// # Summary
/// 时间供给器接口，用于隔离物理系统时钟。
/// 信号的 `created_at` / `updated_at` 一律由此接口生成，测试中可替换为固定时钟。
pub trait TimeProvider: Send + Sync {
    /// 获取当前时间
    fn now(&self) -> DateTime<Utc>;
}

/// # Summary
/// 生产环境使用的真实时钟。
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// # Summary
/// 测试专用的可拨动时钟。
///
/// # Invariants
/// - 并发安全：内部使用 `RwLock`，锁中毒时沿用中毒前的值而不是 panic。
pub struct FakeClockProvider {
    current_time: RwLock<DateTime<Utc>>,
}

impl FakeClockProvider {
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            current_time: RwLock::new(initial_time),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        let mut time = self
            .current_time
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *time = new_time;
    }

    /// 将时钟向前拨动指定时长
    pub fn advance(&self, delta: Duration) {
        let mut time = self
            .current_time
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *time += delta;
    }
}

impl TimeProvider for FakeClockProvider {
    fn now(&self) -> DateTime<Utc> {
        *self
            .current_time
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
