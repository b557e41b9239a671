// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// 重试队列数据库实体模型
///
/// 对应数据库中的 retry_queue 表，存储进程内重试耗尽后等待重放的操作
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "retry_queue")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_type: String,
    pub payload: Json,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub status: String,
    pub next_retry_at: ChronoDateTimeWithTimeZone,
    pub session_id: Option<Uuid>,
    pub last_error: Option<String>,
    pub created_at: ChronoDateTimeWithTimeZone,
    pub updated_at: ChronoDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
