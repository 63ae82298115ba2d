use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum AuditLog {
    Table,
    Id,
    Action,
    Description,
    EntityType,
    EntityId,
    Severity,
    Metadata,
    ActorId,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuditLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuditLog::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AuditLog::Action).string_len(32).not_null())
                    .col(ColumnDef::new(AuditLog::Description).text().not_null())
                    .col(ColumnDef::new(AuditLog::EntityType).string_len(32).not_null())
                    .col(ColumnDef::new(AuditLog::EntityId).uuid())
                    .col(
                        ColumnDef::new(AuditLog::Severity)
                            .string_len(16)
                            .not_null()
                            .default("INFO"),
                    )
                    .col(ColumnDef::new(AuditLog::Metadata).json().not_null())
                    .col(ColumnDef::new(AuditLog::ActorId).uuid())
                    .col(
                        ColumnDef::new(AuditLog::CreatedAt)
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
                    .if_not_exists()
                    .name("idx_audit_log_entity")
                    .table(AuditLog::Table)
                    .col(AuditLog::EntityId)
                    .col(AuditLog::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLog::Table).if_exists().to_owned())
            .await
    }
}
