// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScrapingSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapingSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapingSessions::Towns).json().not_null())
                    .col(ColumnDef::new(ScrapingSessions::Industries).json().not_null())
                    .col(ColumnDef::new(ScrapingSessions::Concurrency).json().not_null())
                    .col(ColumnDef::new(ScrapingSessions::Status).string().not_null())
                    .col(
                        ColumnDef::new(ScrapingSessions::Progress)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ScrapingSessions::State).json())
                    .col(ColumnDef::new(ScrapingSessions::Summary).json())
                    .col(
                        ColumnDef::new(ScrapingSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScrapingSessions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ScrapingSessions::CompletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scraping_sessions_status")
                    .table(ScrapingSessions::Table)
                    .col(ScrapingSessions::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScrapingSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ScrapingSessions {
    Table,
    Id,
    Towns,
    Industries,
    Concurrency,
    Status,
    Progress,
    State,
    Summary,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}
