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
                    .table(RetryQueue::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RetryQueue::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RetryQueue::ItemType).string().not_null())
                    .col(ColumnDef::new(RetryQueue::Payload).json().not_null())
                    .col(
                        ColumnDef::new(RetryQueue::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RetryQueue::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(ColumnDef::new(RetryQueue::Status).string().not_null())
                    .col(
                        ColumnDef::new(RetryQueue::NextRetryAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RetryQueue::SessionId).uuid())
                    .col(ColumnDef::new(RetryQueue::LastError).text())
                    .col(
                        ColumnDef::new(RetryQueue::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(RetryQueue::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_retry_queue_status_next_retry")
                    .table(RetryQueue::Table)
                    .col(RetryQueue::Status)
                    .col(RetryQueue::NextRetryAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RetryQueue::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RetryQueue {
    Table,
    Id,
    ItemType,
    Payload,
    AttemptCount,
    MaxAttempts,
    Status,
    NextRetryAt,
    SessionId,
    LastError,
    CreatedAt,
    UpdatedAt,
}
