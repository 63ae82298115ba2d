use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Batch {
    Table,
    Id,
    Name,
    Level,
    TotalSeats,
    EnrolledCount,
    StartsOn,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Lead {
    Table,
    Id,
    Name,
    Email,
    Phone,
    Whatsapp,
    Status,
    Quality,
    Source,
    InterestedLevel,
    BatchId,
    Converted,
    ConvertedDate,
    StudentId,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Student {
    Table,
    Id,
    StudentCode,
    Name,
    Email,
    Phone,
    Whatsapp,
    Level,
    Source,
    BatchId,
    EnrollmentType,
    FinalPriceCents,
    TotalPaidCents,
    BalanceCents,
    PaymentStatus,
    Currency,
    LeadId,
    EnrolledAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Invoice {
    Table,
    Id,
    InvoiceNumber,
    LeadId,
    StudentId,
    TotalAmountCents,
    PaidAmountCents,
    RemainingAmountCents,
    Currency,
    Status,
    PaidAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Payment {
    Table,
    Id,
    StudentId,
    InvoiceId,
    AmountCents,
    Currency,
    Method,
    Status,
    Reference,
    PaidAt,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

fn created_at<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Batch::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Batch::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Batch::Name).string_len(128).not_null())
                    .col(ColumnDef::new(Batch::Level).string_len(32))
                    .col(ColumnDef::new(Batch::TotalSeats).integer().not_null())
                    .col(
                        ColumnDef::new(Batch::EnrolledCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Batch::StartsOn).date())
                    .col(&mut created_at(Batch::CreatedAt))
                    .col(&mut created_at(Batch::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Lead::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Lead::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Lead::Name).string_len(256).not_null())
                    .col(ColumnDef::new(Lead::Email).string_len(320))
                    .col(ColumnDef::new(Lead::Phone).string_len(64))
                    .col(ColumnDef::new(Lead::Whatsapp).string_len(64))
                    .col(
                        ColumnDef::new(Lead::Status)
                            .string_len(16)
                            .not_null()
                            .default("NEW"),
                    )
                    .col(ColumnDef::new(Lead::Quality).string_len(8))
                    .col(
                        ColumnDef::new(Lead::Source)
                            .string_len(16)
                            .not_null()
                            .default("OTHER"),
                    )
                    .col(ColumnDef::new(Lead::InterestedLevel).string_len(32))
                    .col(ColumnDef::new(Lead::BatchId).uuid())
                    .col(
                        ColumnDef::new(Lead::Converted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Lead::ConvertedDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Lead::StudentId).uuid())
                    .col(ColumnDef::new(Lead::Notes).text())
                    .col(&mut created_at(Lead::CreatedAt))
                    .col(&mut created_at(Lead::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lead_batch")
                            .from(Lead::Table, Lead::BatchId)
                            .to(Batch::Table, Batch::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_lead_status")
                    .table(Lead::Table)
                    .col(Lead::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Student::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Student::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Student::StudentCode)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Student::Name).string_len(256).not_null())
                    .col(ColumnDef::new(Student::Email).string_len(320))
                    .col(ColumnDef::new(Student::Phone).string_len(64))
                    .col(ColumnDef::new(Student::Whatsapp).string_len(64))
                    .col(ColumnDef::new(Student::Level).string_len(32))
                    .col(ColumnDef::new(Student::Source).string_len(16))
                    .col(ColumnDef::new(Student::BatchId).uuid())
                    .col(
                        ColumnDef::new(Student::EnrollmentType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Student::FinalPriceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Student::TotalPaidCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Student::BalanceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Student::PaymentStatus)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Student::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Student::LeadId).uuid())
                    .col(&mut created_at(Student::EnrolledAt))
                    .col(&mut created_at(Student::CreatedAt))
                    .col(&mut created_at(Student::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_student_batch")
                            .from(Student::Table, Student::BatchId)
                            .to(Batch::Table, Batch::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_student_lead")
                            .from(Student::Table, Student::LeadId)
                            .to(Lead::Table, Lead::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_student_batch")
                    .table(Student::Table)
                    .col(Student::BatchId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Invoice::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Invoice::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Invoice::InvoiceNumber)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Invoice::LeadId).uuid())
                    .col(ColumnDef::new(Invoice::StudentId).uuid())
                    .col(
                        ColumnDef::new(Invoice::TotalAmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Invoice::PaidAmountCents).big_integer())
                    .col(ColumnDef::new(Invoice::RemainingAmountCents).big_integer())
                    .col(ColumnDef::new(Invoice::Currency).string_len(3).not_null())
                    .col(
                        ColumnDef::new(Invoice::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(ColumnDef::new(Invoice::PaidAt).timestamp_with_time_zone())
                    .col(&mut created_at(Invoice::CreatedAt))
                    .col(&mut created_at(Invoice::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoice_lead")
                            .from(Invoice::Table, Invoice::LeadId)
                            .to(Lead::Table, Lead::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoice_student")
                            .from(Invoice::Table, Invoice::StudentId)
                            .to(Student::Table, Student::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invoice_lead")
                    .table(Invoice::Table)
                    .col(Invoice::LeadId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Payment::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Payment::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Payment::StudentId).uuid())
                    .col(ColumnDef::new(Payment::InvoiceId).uuid())
                    .col(ColumnDef::new(Payment::AmountCents).big_integer().not_null())
                    .col(ColumnDef::new(Payment::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Payment::Method).string_len(16).not_null())
                    .col(ColumnDef::new(Payment::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Payment::Reference).string_len(128))
                    .col(&mut created_at(Payment::PaidAt))
                    .col(&mut created_at(Payment::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_student")
                            .from(Payment::Table, Payment::StudentId)
                            .to(Student::Table, Student::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_invoice")
                            .from(Payment::Table, Payment::InvoiceId)
                            .to(Invoice::Table, Invoice::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payment_student")
                    .table(Payment::Table)
                    .col(Payment::StudentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payment::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoice::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Student::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Lead::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Batch::Table).if_exists().to_owned())
            .await
    }
}
