use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::lead::Source;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "student")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub student_code: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub level: Option<String>,
    pub source: Option<Source>,
    #[sea_orm(indexed)]
    pub batch_id: Option<Uuid>,
    pub enrollment_type: EnrollmentType,
    pub final_price_cents: i64,
    pub total_paid_cents: i64,
    pub balance_cents: i64,
    pub payment_status: PaymentStatus,
    pub currency: String,
    #[sea_orm(indexed)]
    pub lead_id: Option<Uuid>,
    pub enrolled_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::batch::Entity",
        from = "Column::BatchId",
        to = "super::batch::Column::Id",
        on_delete = "SetNull"
    )]
    Batch,
    #[sea_orm(
        belongs_to = "super::lead::Entity",
        from = "Column::LeadId",
        to = "super::lead::Column::Id",
        on_delete = "SetNull"
    )]
    Lead,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
}

impl Related<super::batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl Related<super::lead::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lead.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

#[derive(
    Copy, Clone, Debug, Default, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentType {
    #[default]
    #[sea_orm(string_value = "SINGLE_LEVEL")]
    SingleLevel,
    #[sea_orm(string_value = "MULTI_LEVEL")]
    MultiLevel,
    #[sea_orm(string_value = "INTENSIVE")]
    Intensive,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PARTIAL")]
    Partial,
    #[sea_orm(string_value = "PAID")]
    Paid,
}

impl PaymentStatus {
    /// Status implied by an outstanding balance in minor units.
    pub fn for_balance(balance_cents: i64, total_paid_cents: i64) -> Self {
        if balance_cents <= 0 {
            PaymentStatus::Paid
        } else if total_paid_cents > 0 {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}
