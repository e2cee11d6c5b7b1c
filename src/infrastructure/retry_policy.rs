//! 重试策略 - 基础设施层
//!
//! 显式的重试策略对象（最大尝试次数、基础延迟、抖动函数），
//! 由调用方传入 ArtifactFetcher / AssignmentResolver，而不是全局配置。
//!
//! - 只重试 `RateLimited` 与 `Transient`
//! - `NotFound` / `PermissionDenied` 立即返回
//! - 超过尝试上限时返回最后一次错误，错误种类保持不变

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::FetchResult;

/// 抖动函数：输入计算出的退避时间，返回实际等待时间
pub type JitterFn = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

/// 指数退避重试策略
#[derive(Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含第一次请求）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    jitter: JitterFn,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    /// 创建带 ±10% 随机抖动的策略
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            multiplier: 2.0,
            jitter: Arc::new(proportional_jitter),
        }
    }

    /// 不等待、不抖动的策略（测试与离线回放使用）
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO).with_jitter(Arc::new(|d| d))
    }

    pub fn with_jitter(mut self, jitter: JitterFn) -> Self {
        self.jitter = jitter;
        self
    }

    /// 退避倍数；小于 1 或非有限值按 1 处理
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    /// 第 `attempt` 次失败后（从 0 开始）的退避时间，不含抖动，不超过 `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// 实际等待时间：抖动后的退避时间，不短于服务端要求的 Retry-After
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = (self.jitter)(self.backoff(attempt));
        match retry_after {
            Some(server_hint) => delay.max(server_hint),
            None => delay,
        }
    }

    /// 执行操作，按策略重试可重试的错误
    ///
    /// # 参数
    /// - `label`: 日志中显示的操作名称
    /// - `operation`: 每次尝试调用一次的闭包
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} 在第 {} 次尝试后成功", label, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(err) if !err.kind.is_retryable() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!("{} 已重试 {} 次仍失败: {}", label, self.max_attempts, err);
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1, err.retry_after);
                    warn!(
                        "{} 失败 (第 {}/{} 次)，{:?} 后重试: {}",
                        label, attempt, self.max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// ±10% 随机抖动
fn proportional_jitter(delay: Duration) -> Duration {
    let spread = delay.as_secs_f64() * 0.1;
    let offset = (rand::random::<f64>() - 0.5) * 2.0 * spread;
    Duration::try_from_secs_f64((delay.as_secs_f64() + offset).max(0.0)).unwrap_or(delay)
}
