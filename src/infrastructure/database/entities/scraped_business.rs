// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "scraped_businesses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub maps_url: Option<String>,
    pub phone: Option<String>,
    pub provider: Option<String>,
    pub address: Option<String>,
    pub town: String,
    pub industry: String,
    pub created_at: ChronoDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::scraping_session::Entity",
        from = "Column::SessionId",
        to = "super::scraping_session::Column::Id",
        on_delete = "Cascade"
    )]
    ScrapingSession,
}

impl Related<super::scraping_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScrapingSession.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
