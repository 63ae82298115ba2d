use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum ConversionAttempt {
    Table,
    Id,
    IdempotencyKey,
    InvoiceId,
    Status,
    Result,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Invoice {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The unique key on idempotency_key is the lock: concurrent first-time
        // inserts for one key cannot both succeed.
        manager
            .create_table(
                Table::create()
                    .table(ConversionAttempt::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConversionAttempt::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ConversionAttempt::IdempotencyKey)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ConversionAttempt::InvoiceId).uuid().not_null())
                    .col(
                        ColumnDef::new(ConversionAttempt::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(ColumnDef::new(ConversionAttempt::Result).json())
                    .col(ColumnDef::new(ConversionAttempt::ErrorMessage).text())
                    .col(
                        ColumnDef::new(ConversionAttempt::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ConversionAttempt::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversion_attempt_invoice")
                            .from(ConversionAttempt::Table, ConversionAttempt::InvoiceId)
                            .to(Invoice::Table, Invoice::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversion_attempt_invoice")
                    .table(ConversionAttempt::Table)
                    .col(ConversionAttempt::InvoiceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ConversionAttempt::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}
