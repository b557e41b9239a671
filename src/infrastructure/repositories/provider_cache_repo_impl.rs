// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;

use crate::domain::models::provider::ProviderCacheEntry;
use crate::domain::repositories::provider_cache_repository::ProviderCacheRepository;
use crate::infrastructure::database::entities::provider_cache;
use crate::infrastructure::database::entities::provider_cache::Entity as ProviderCacheEntity;
use crate::utils::errors::RepositoryError;

pub struct ProviderCacheRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl ProviderCacheRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<provider_cache::Model> for ProviderCacheEntry {
    fn from(model: provider_cache::Model) -> Self {
        Self {
            phone: model.phone,
            provider: model.provider,
            cached_at: model.cached_at.into(),
        }
    }
}

#[async_trait]
impl ProviderCacheRepository for ProviderCacheRepositoryImpl {
    async fn find(&self, phone: &str) -> Result<Option<ProviderCacheEntry>, RepositoryError> {
        let result = ProviderCacheEntity::find_by_id(phone.to_string())
            .one(self.db.as_ref())
            .await?;
        Ok(result.map(ProviderCacheEntry::from))
    }

    async fn upsert(&self, entry: &ProviderCacheEntry) -> Result<(), RepositoryError> {
        let active_model = provider_cache::ActiveModel {
            phone: Set(entry.phone.clone()),
            provider: Set(entry.provider.clone()),
            cached_at: Set(entry.cached_at.into()),
        };

        ProviderCacheEntity::insert(active_model)
            .on_conflict(
                OnConflict::column(provider_cache::Column::Phone)
                    .update_columns([
                        provider_cache::Column::Provider,
                        provider_cache::Column::CachedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
