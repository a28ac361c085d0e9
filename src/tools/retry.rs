//! 外部数据获取的有界重试与指数退避
//!
//! 最多尝试 max_attempts 次；第 n 次重试前等待 base_delay × multiplier^(n-1)（默认 200ms、400ms）。
//! 等待与请求期间都会响应取消；全部失败时返回降级文本与最后一次错误。

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RetrySection;
use crate::tools::ToolError;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2,
        }
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            base_delay: section.base_delay(),
            multiplier: section.multiplier,
        }
    }
}

impl RetryPolicy {
    /// 第 retry 次重试（从 1 开始）前的等待时长
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// 所有尝试都耗尽单次超时时的总耗时（含退避等待）
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let backoff = (1..attempts)
            .map(|retry| self.delay_before_retry(retry))
            .fold(Duration::ZERO, Duration::saturating_add);
        per_attempt.saturating_mul(attempts).saturating_add(backoff)
    }
}

#[derive(Error, Debug)]
pub enum FetchError<E> {
    #[error("operation cancelled")]
    Cancelled,

    #[error("all {attempts} attempts failed: {source}")]
    Exhausted {
        fallback: String,
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> FetchError<E> {
    pub fn fallback(&self) -> Option<&str> {
        match self {
            FetchError::Exhausted { fallback, .. } => Some(fallback),
            FetchError::Cancelled => None,
        }
    }
}

/// 对单个不稳定的外部调用做有界重试
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    policy: RetryPolicy,
    fallback: String,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy, fallback: impl Into<String>) -> Self {
        Self {
            policy,
            fallback: fallback.into(),
        }
    }

    /// 缺少凭据时立即返回 Unconfigured，不进入重试
    pub fn require_credential<'a>(
        &self,
        credential: Option<&'a str>,
        name: &str,
    ) -> Result<&'a str, ToolError> {
        credential
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::Unconfigured(format!("{name} not set")))
    }

    /// 执行 op，失败则退避后重试；op 收到当前尝试序号（从 1 开始）
    pub async fn fetch<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, FetchError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                r = op(attempt) => r,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => {
                    tracing::warn!(attempt, error = %err, "external fetch exhausted retries");
                    return Err(FetchError::Exhausted {
                        fallback: self.fallback.clone(),
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "external fetch attempt failed");
                }
            }

            let delay = self.policy.delay_before_retry(attempt);
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
