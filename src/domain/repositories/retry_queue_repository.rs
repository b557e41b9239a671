// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::retry_item::{RetryItemStatus, RetryQueueItem};
use crate::utils::errors::RepositoryError;

/// 重试队列仓储接口
#[async_trait]
pub trait RetryQueueRepository: Send + Sync {
    /// 入队
    async fn enqueue(&self, item: &RetryQueueItem) -> Result<RetryQueueItem, RepositoryError>;

    /// 根据ID查找
    async fn find_by_id(&self, id: Uuid) -> Result<Option<RetryQueueItem>, RepositoryError>;

    /// 获取到期的 pending 条目（按 next_retry_at 升序）
    async fn due_items(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<RetryQueueItem>, RepositoryError>;

    /// 更新条目（次数、状态、下次时间、错误）
    async fn update(&self, item: &RetryQueueItem) -> Result<(), RepositoryError>;

    /// 删除条目
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// 按状态统计
    async fn count_by_status(&self, status: RetryItemStatus) -> Result<u64, RepositoryError>;
}
