// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::retry_item::{RetryItemStatus, RetryQueueItem};
use crate::domain::repositories::retry_queue_repository::RetryQueueRepository;
use crate::infrastructure::database::entities::retry_queue;
use crate::infrastructure::database::entities::retry_queue::Entity as RetryQueueEntity;
use crate::utils::errors::RepositoryError;

pub struct RetryQueueRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl RetryQueueRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_domain(model: retry_queue::Model) -> Result<RetryQueueItem, RepositoryError> {
    Ok(RetryQueueItem {
        id: model.id,
        item_type: model.item_type.parse().map_err(|_| {
            RepositoryError::InvalidData(format!("unknown retry item type: {}", model.item_type))
        })?,
        payload: model.payload,
        attempt_count: model.attempt_count,
        max_attempts: model.max_attempts,
        status: model.status.parse().map_err(|_| {
            RepositoryError::InvalidData(format!("unknown retry item status: {}", model.status))
        })?,
        next_retry_at: model.next_retry_at,
        session_id: model.session_id,
        last_error: model.last_error,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn to_active(item: &RetryQueueItem) -> retry_queue::ActiveModel {
    retry_queue::ActiveModel {
        id: Set(item.id),
        item_type: Set(item.item_type.to_string()),
        payload: Set(item.payload.clone()),
        attempt_count: Set(item.attempt_count),
        max_attempts: Set(item.max_attempts),
        status: Set(item.status.to_string()),
        next_retry_at: Set(item.next_retry_at),
        session_id: Set(item.session_id),
        last_error: Set(item.last_error.clone()),
        created_at: Set(item.created_at),
        updated_at: Set(item.updated_at),
    }
}

#[async_trait]
impl RetryQueueRepository for RetryQueueRepositoryImpl {
    async fn enqueue(&self, item: &RetryQueueItem) -> Result<RetryQueueItem, RepositoryError> {
        let result = to_active(item).insert(self.db.as_ref()).await?;
        to_domain(result)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RetryQueueItem>, RepositoryError> {
        let result = RetryQueueEntity::find_by_id(id).one(self.db.as_ref()).await?;
        result.map(to_domain).transpose()
    }

    async fn due_items(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<RetryQueueItem>, RepositoryError> {
        let now: DateTime<FixedOffset> = now.into();
        let results = RetryQueueEntity::find()
            .filter(retry_queue::Column::Status.eq(RetryItemStatus::Pending.to_string()))
            .filter(retry_queue::Column::NextRetryAt.lte(now))
            .order_by_asc(retry_queue::Column::NextRetryAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        results.into_iter().map(to_domain).collect()
    }

    async fn update(&self, item: &RetryQueueItem) -> Result<(), RepositoryError> {
        let mut active_model = to_active(item);
        active_model.updated_at = Set(Utc::now().into());
        active_model.update(self.db.as_ref()).await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        RetryQueueEntity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn count_by_status(&self, status: RetryItemStatus) -> Result<u64, RepositoryError> {
        let count = RetryQueueEntity::find()
            .filter(retry_queue::Column::Status.eq(status.to_string()))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }
}
