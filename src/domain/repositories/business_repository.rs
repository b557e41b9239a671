// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::business::ScrapedBusiness;
use crate::utils::errors::RepositoryError;

/// 单次批量写入的最大行数
pub const INSERT_CHUNK_SIZE: usize = 100;

/// 商家记录仓储接口
#[async_trait]
pub trait BusinessRepository: Send + Sync {
    /// 批量写入，每次最多 `INSERT_CHUNK_SIZE` 行
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 写入的行数
    async fn insert_batch(
        &self,
        session_id: Uuid,
        businesses: &[ScrapedBusiness],
    ) -> Result<usize, RepositoryError>;

    /// 查询某个会话的全部商家
    async fn find_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ScrapedBusiness>, RepositoryError>;

    /// 按原始号码回填运营商
    ///
    /// # 返回值
    ///
    /// * `Ok(u64)` - 受影响的行数
    async fn update_provider_by_phones(
        &self,
        session_id: Uuid,
        phones: &[String],
        provider: &str,
    ) -> Result<u64, RepositoryError>;

    /// 删除某个会话的全部商家
    async fn delete_by_session(&self, session_id: Uuid) -> Result<u64, RepositoryError>;
}
