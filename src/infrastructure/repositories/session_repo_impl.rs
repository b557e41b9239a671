// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::session::{
    ScrapeSession, SessionState, SessionStatus, SessionSummary,
};
use crate::domain::repositories::session_repository::SessionRepository;
use crate::infrastructure::database::entities::scraped_business;
use crate::infrastructure::database::entities::scraping_session;
use crate::infrastructure::database::entities::scraping_session::Entity as SessionEntity;
use crate::utils::errors::RepositoryError;

pub struct SessionRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl SessionRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_domain(model: scraping_session::Model) -> Result<ScrapeSession, RepositoryError> {
    Ok(ScrapeSession {
        id: model.id,
        towns: serde_json::from_value(model.towns)?,
        industries: serde_json::from_value(model.industries)?,
        concurrency: serde_json::from_value(model.concurrency)?,
        status: model
            .status
            .parse()
            .map_err(|e: crate::domain::models::session::DomainError| {
                RepositoryError::InvalidData(e.to_string())
            })?,
        progress: model.progress.clamp(0, 100) as u8,
        state: model.state.map(serde_json::from_value).transpose()?,
        summary: model.summary.map(serde_json::from_value).transpose()?,
        created_at: model.created_at,
        updated_at: model.updated_at,
        completed_at: model.completed_at,
    })
}

#[async_trait]
impl SessionRepository for SessionRepositoryImpl {
    async fn create(&self, session: &ScrapeSession) -> Result<ScrapeSession, RepositoryError> {
        let active_model = scraping_session::ActiveModel {
            id: Set(session.id),
            towns: Set(serde_json::to_value(&session.towns)?),
            industries: Set(serde_json::to_value(&session.industries)?),
            concurrency: Set(serde_json::to_value(session.concurrency)?),
            status: Set(session.status.to_string()),
            progress: Set(session.progress as i32),
            state: Set(session.state.as_ref().map(serde_json::to_value).transpose()?),
            summary: Set(session.summary.as_ref().map(serde_json::to_value).transpose()?),
            created_at: Set(session.created_at),
            updated_at: Set(session.updated_at),
            completed_at: Set(session.completed_at),
        };

        let result = active_model.insert(self.db.as_ref()).await?;
        to_domain(result)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeSession>, RepositoryError> {
        let result = SessionEntity::find_by_id(id).one(self.db.as_ref()).await?;
        result.map(to_domain).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        progress: u8,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut update = SessionEntity::update_many()
            .col_expr(scraping_session::Column::Status, Expr::value(status.to_string()))
            .col_expr(scraping_session::Column::Progress, Expr::value(progress as i32))
            .col_expr(scraping_session::Column::UpdatedAt, Expr::value(now));

        if status.is_terminal() {
            update = update.col_expr(scraping_session::Column::CompletedAt, Expr::value(now));
        }

        let terminal: Vec<String> = SessionStatus::TERMINAL
            .iter()
            .map(ToString::to_string)
            .collect();
        let result = update
            .filter(scraping_session::Column::Id.eq(id))
            .filter(scraping_session::Column::Status.is_not_in(terminal))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            if SessionEntity::find_by_id(id).one(self.db.as_ref()).await?.is_none() {
                return Err(RepositoryError::NotFound);
            }
            debug!(session_id = %id, status = %status, "Session already finished, status kept");
        }
        Ok(())
    }

    async fn save_state(&self, id: Uuid, state: &SessionState) -> Result<(), RepositoryError> {
        let result = SessionEntity::update_many()
            .col_expr(
                scraping_session::Column::State,
                Expr::value(serde_json::to_value(state)?),
            )
            .col_expr(scraping_session::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(scraping_session::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn save_summary(
        &self,
        id: Uuid,
        status: SessionStatus,
        summary: &SessionSummary,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let progress = if status == SessionStatus::Completed {
            100
        } else {
            crate::domain::models::session::Progress::new(
                summary.towns_completed,
                summary.total_towns,
            )
            .percentage
        };

        let result = SessionEntity::update_many()
            .col_expr(scraping_session::Column::Status, Expr::value(status.to_string()))
            .col_expr(scraping_session::Column::Progress, Expr::value(progress as i32))
            .col_expr(
                scraping_session::Column::Summary,
                Expr::value(serde_json::to_value(summary)?),
            )
            .col_expr(scraping_session::Column::UpdatedAt, Expr::value(now))
            .col_expr(scraping_session::Column::CompletedAt, Expr::value(now))
            .filter(scraping_session::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        // SQLite only cascades with foreign_keys enabled, so children go first
        let txn = self.db.begin().await?;
        scraped_business::Entity::delete_many()
            .filter(scraped_business::Column::SessionId.eq(id))
            .exec(&txn)
            .await?;
        SessionEntity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }
}
