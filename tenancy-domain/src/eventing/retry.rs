//! 重试策略（RetryPolicy）
//!
//! 处理器失败后在消费者内按指数退避重试，最多 `max_retries` 次；
//! 预算耗尽后拒收（不回队列），由中间件转投服务私有的死信队列。
//!
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// 首次失败后的最大重投次数
    pub max_retries: u32,
    /// 首次重试前的等待
    pub initial_interval: Duration,
    /// 每次重试等待的放大倍数（>= 1.0）
    pub multiplier: f64,
    /// 单次等待上限
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// 固定间隔
    pub fn fixed(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            initial_interval: interval,
            multiplier: 1.0,
            max_interval: interval,
        }
    }

    /// 第 `retry` 次重试（从 1 开始）前的等待时间
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.initial_interval.as_millis() as f64 * factor;
        let capped = millis.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// 已失败 `attempts` 次后是否还能再试
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn retry_budget() {
        let policy = RetryPolicy::fixed(2, Duration::ZERO);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.backoff(1), Duration::ZERO);

        assert!(!RetryPolicy::fixed(0, Duration::ZERO).should_retry(1));
    }
}
