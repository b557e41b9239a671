// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::session::{ScrapeSession, SessionState, SessionStatus, SessionSummary};
use crate::utils::errors::RepositoryError;

/// 会话仓储接口
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// 创建会话
    async fn create(&self, session: &ScrapeSession) -> Result<ScrapeSession, RepositoryError>;

    /// 根据ID查找会话
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeSession>, RepositoryError>;

    /// 更新状态和进度
    ///
    /// 已处于终态的会话保持原状态，不返回错误
    async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        progress: u8,
    ) -> Result<(), RepositoryError>;

    /// 保存检查点
    async fn save_state(&self, id: Uuid, state: &SessionState) -> Result<(), RepositoryError>;

    /// 保存最终汇总，同时写入终态和完成时间
    async fn save_summary(
        &self,
        id: Uuid,
        status: SessionStatus,
        summary: &SessionSummary,
    ) -> Result<(), RepositoryError>;

    /// 删除会话（级联删除商家记录）
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}
