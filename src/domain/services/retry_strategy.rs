// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt::Display;
use std::future::Future;
use tracing::debug;

use crate::domain::services::scrape_control::ScrapeControl;
use crate::utils::retry_policy::RetryPolicy;

/// 指数退避重试
///
/// 第 n 次失败后等待 `initial_backoff * 2^(n-1)`，最多尝试 `max_attempts` 次，
/// 返回最后一次的错误。绑定 `ScrapeControl` 后，退避等待可以被停止打断。
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    policy: RetryPolicy,
    control: Option<ScrapeControl>,
}

impl RetryStrategy {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            control: None,
        }
    }

    /// 绑定停止信号
    pub fn cancellable(&self, control: &ScrapeControl) -> Self {
        Self {
            policy: self.policy.clone(),
            control: Some(control.clone()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 对任何错误都重试
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_when(op, |_| true).await
    }

    /// 只重试 `retryable` 返回 true 的错误
    ///
    /// # 参数
    ///
    /// * `op` - 以尝试序号（从 1 开始）为参数的操作
    /// * `retryable` - 错误是否值得重试
    pub async fn execute_when<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= max_attempts || !retryable(&e) {
                        return Err(e);
                    }

                    let delay = self.policy.calculate_backoff(attempt);
                    debug!(attempt, ?delay, "Attempt failed, retrying: {}", e);

                    match &self.control {
                        Some(control) => {
                            if control.sleep(delay).await.is_err() {
                                return Err(e);
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                    attempt += 1;
                }
            }
        }
    }
}
