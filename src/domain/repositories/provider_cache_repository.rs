// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::provider::ProviderCacheEntry;
use crate::utils::errors::RepositoryError;

/// 运营商缓存仓储接口
#[async_trait]
pub trait ProviderCacheRepository: Send + Sync {
    /// 按规范化号码查找
    async fn find(&self, phone: &str) -> Result<Option<ProviderCacheEntry>, RepositoryError>;

    /// 写入或覆盖
    async fn upsert(&self, entry: &ProviderCacheEntry) -> Result<(), RepositoryError>;
}
