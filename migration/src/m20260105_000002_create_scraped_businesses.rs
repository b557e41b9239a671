// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

use crate::m20260105_000001_create_scraping_sessions::ScrapingSessions;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScrapedBusinesses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapedBusinesses::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapedBusinesses::SessionId).uuid().not_null())
                    .col(ColumnDef::new(ScrapedBusinesses::Name).string().not_null())
                    .col(ColumnDef::new(ScrapedBusinesses::MapsUrl).text())
                    .col(ColumnDef::new(ScrapedBusinesses::Phone).string())
                    .col(ColumnDef::new(ScrapedBusinesses::Provider).string())
                    .col(ColumnDef::new(ScrapedBusinesses::Address).text())
                    .col(ColumnDef::new(ScrapedBusinesses::Town).string().not_null())
                    .col(ColumnDef::new(ScrapedBusinesses::Industry).string().not_null())
                    .col(
                        ColumnDef::new(ScrapedBusinesses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    // Deleting a session removes its businesses.
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_scraped_businesses_session")
                            .from(ScrapedBusinesses::Table, ScrapedBusinesses::SessionId)
                            .to(ScrapingSessions::Table, ScrapingSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scraped_businesses_session_id")
                    .table(ScrapedBusinesses::Table)
                    .col(ScrapedBusinesses::SessionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScrapedBusinesses::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScrapedBusinesses {
    Table,
    Id,
    SessionId,
    Name,
    MapsUrl,
    Phone,
    Provider,
    Address,
    Town,
    Industry,
    CreatedAt,
}
