// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::business::ScrapedBusiness;
use crate::domain::repositories::business_repository::{BusinessRepository, INSERT_CHUNK_SIZE};
use crate::infrastructure::database::entities::scraped_business;
use crate::infrastructure::database::entities::scraped_business::Entity as BusinessEntity;
use crate::utils::errors::RepositoryError;

pub struct BusinessRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl BusinessRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<scraped_business::Model> for ScrapedBusiness {
    fn from(model: scraped_business::Model) -> Self {
        Self {
            maps_url: model.maps_url.unwrap_or_default(),
            name: model.name,
            phone: model.phone,
            provider: model.provider.unwrap_or_default(),
            address: model.address,
            town: model.town,
            industry: model.industry,
        }
    }
}

#[async_trait]
impl BusinessRepository for BusinessRepositoryImpl {
    async fn insert_batch(
        &self,
        session_id: Uuid,
        businesses: &[ScrapedBusiness],
    ) -> Result<usize, RepositoryError> {
        if businesses.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        for chunk in businesses.chunks(INSERT_CHUNK_SIZE) {
            let models = chunk.iter().map(|b| scraped_business::ActiveModel {
                id: Set(Uuid::new_v4()),
                session_id: Set(session_id),
                name: Set(b.name.clone()),
                maps_url: Set(Some(b.maps_url.clone()).filter(|u| !u.is_empty())),
                phone: Set(b.phone.clone()),
                provider: Set(Some(b.provider.clone()).filter(|p| !p.is_empty())),
                address: Set(b.address.clone()),
                town: Set(b.town.clone()),
                industry: Set(b.industry.clone()),
                created_at: Set(now.into()),
            });
            BusinessEntity::insert_many(models).exec(&txn).await?;
        }
        txn.commit().await?;

        tracing::debug!(
            session_id = %session_id,
            rows = businesses.len(),
            chunks = businesses.len().div_ceil(INSERT_CHUNK_SIZE),
            "Persisted scraped businesses"
        );
        Ok(businesses.len())
    }

    async fn find_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ScrapedBusiness>, RepositoryError> {
        let results = BusinessEntity::find()
            .filter(scraped_business::Column::SessionId.eq(session_id))
            .order_by_asc(scraped_business::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(results.into_iter().map(ScrapedBusiness::from).collect())
    }

    async fn update_provider_by_phones(
        &self,
        session_id: Uuid,
        phones: &[String],
        provider: &str,
    ) -> Result<u64, RepositoryError> {
        if phones.is_empty() {
            return Ok(0);
        }

        let result = BusinessEntity::update_many()
            .col_expr(
                scraped_business::Column::Provider,
                Expr::value(provider.to_string()),
            )
            .filter(scraped_business::Column::SessionId.eq(session_id))
            .filter(scraped_business::Column::Phone.is_in(phones.to_vec()))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn delete_by_session(&self, session_id: Uuid) -> Result<u64, RepositoryError> {
        let result = BusinessEntity::delete_many()
            .filter(scraped_business::Column::SessionId.eq(session_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
