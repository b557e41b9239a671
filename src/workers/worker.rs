// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;

/// 后台Worker trait
///
/// 周期性运行的后台任务（如重试队列）实现此trait
#[async_trait]
pub trait Worker: Send + Sync {
    /// 运行工作器，正常情况下不会返回
    async fn run(&self) -> Result<(), WorkerError>;

    /// 获取工作器名称
    fn name(&self) -> &str;
}
