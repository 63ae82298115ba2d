use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub action: Action,
    pub description: String,
    pub entity_type: String,
    #[sea_orm(indexed)]
    pub entity_id: Option<Uuid>,
    pub severity: Severity,
    pub metadata: Json,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[sea_orm(string_value = "LEAD_CREATED")]
    LeadCreated,
    #[sea_orm(string_value = "LEAD_UPDATED")]
    LeadUpdated,
    #[sea_orm(string_value = "INVOICE_CREATED")]
    InvoiceCreated,
    #[sea_orm(string_value = "INVOICE_CANCELLED")]
    InvoiceCancelled,
    #[sea_orm(string_value = "BATCH_CREATED")]
    BatchCreated,
    #[sea_orm(string_value = "CONVERSION_STARTED")]
    ConversionStarted,
    #[sea_orm(string_value = "PAYMENT_RECEIVED")]
    PaymentReceived,
    #[sea_orm(string_value = "LEAD_CONVERTED")]
    LeadConverted,
    #[sea_orm(string_value = "CONVERSION_FAILED")]
    ConversionFailed,
    #[sea_orm(string_value = "PAYMENT_RECORDED")]
    PaymentRecorded,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[sea_orm(string_value = "INFO")]
    Info,
    #[sea_orm(string_value = "WARNING")]
    Warning,
    #[sea_orm(string_value = "CRITICAL")]
    Critical,
}

impl ActiveModelBehavior for ActiveModel {}
