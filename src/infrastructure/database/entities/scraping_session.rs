// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// 抓取会话数据库实体模型
///
/// 对应数据库中的 scraping_sessions 表；towns/industries/concurrency/state/summary 以 JSON 存储
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "scraping_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub towns: Json,
    pub industries: Json,
    pub concurrency: Json,
    pub status: String,
    pub progress: i32,
    pub state: Option<Json>,
    pub summary: Option<Json>,
    pub created_at: ChronoDateTimeWithTimeZone,
    pub updated_at: ChronoDateTimeWithTimeZone,
    pub completed_at: Option<ChronoDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::scraped_business::Entity")]
    ScrapedBusiness,
}

impl Related<super::scraped_business::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScrapedBusiness.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
