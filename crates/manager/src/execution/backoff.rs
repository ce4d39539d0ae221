use std::time::Duration;

/// # Summary
/// 有上限的指数退避。提交重试与对账轮询共用。
///
/// # Invariants
/// - 返回的延迟从 `initial` 开始，每次乘以 `multiplier`，不超过 `max`。
/// - 不引入随机抖动，保证测试中的时间线可复现。
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: u32) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            multiplier: multiplier.max(1),
            current: initial,
        }
    }

    /// 由毫秒配置构造
    pub fn from_millis(initial_ms: u64, max_ms: u64, multiplier: u32) -> Self {
        Self::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
            multiplier,
        )
    }

    /// 返回本次应等待的时长，并推进到下一档
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(self.multiplier).min(self.max);
        delay
    }

    /// 观察到进展后回到初始延迟
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
