//! Client-facing shapes of stored records. Money leaves the service as a
//! two-place decimal string, enums as their stored labels.

use async_graphql::SimpleObject;
use chrono::{DateTime, NaiveDate, Utc};
use entity::{audit_log, batch, invoice, lead, payment, student};
use sea_orm::ActiveEnum;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::money::format_cents;

#[derive(Clone, Debug, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct LeadView {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub status: String,
    pub quality: Option<String>,
    pub source: String,
    pub interested_level: Option<String>,
    pub batch_id: Option<Uuid>,
    pub converted: bool,
    pub converted_date: Option<DateTime<Utc>>,
    pub student_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<lead::Model> for LeadView {
    fn from(model: lead::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            whatsapp: model.whatsapp,
            status: model.status.to_value(),
            quality: model.quality.map(|q| q.to_value()),
            source: model.source.to_value(),
            interested_level: model.interested_level,
            batch_id: model.batch_id,
            converted: model.converted,
            converted_date: model.converted_date.map(|d| d.with_timezone(&Utc)),
            student_id: model.student_id,
            notes: model.notes,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Clone, Debug, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub id: Uuid,
    pub invoice_number: String,
    pub lead_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub total_amount: String,
    pub paid_amount: Option<String>,
    pub remaining_amount: Option<String>,
    pub currency: String,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<invoice::Model> for InvoiceView {
    fn from(model: invoice::Model) -> Self {
        Self {
            id: model.id,
            invoice_number: model.invoice_number,
            lead_id: model.lead_id,
            student_id: model.student_id,
            total_amount: format_cents(model.total_amount_cents),
            paid_amount: model.paid_amount_cents.map(format_cents),
            remaining_amount: model.remaining_amount_cents.map(format_cents),
            currency: model.currency,
            status: model.status.to_value(),
            paid_at: model.paid_at.map(|d| d.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Clone, Debug, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub id: Uuid,
    pub student_code: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub level: Option<String>,
    pub source: Option<String>,
    pub batch_id: Option<Uuid>,
    pub enrollment_type: String,
    pub final_price: String,
    pub total_paid: String,
    pub balance: String,
    pub payment_status: String,
    pub currency: String,
    pub lead_id: Option<Uuid>,
    pub enrolled_at: DateTime<Utc>,
}

impl From<student::Model> for StudentView {
    fn from(model: student::Model) -> Self {
        Self {
            id: model.id,
            student_code: model.student_code,
            name: model.name,
            email: model.email,
            phone: model.phone,
            whatsapp: model.whatsapp,
            level: model.level,
            source: model.source.map(|s| s.to_value()),
            batch_id: model.batch_id,
            enrollment_type: model.enrollment_type.to_value(),
            final_price: format_cents(model.final_price_cents),
            total_paid: format_cents(model.total_paid_cents),
            balance: format_cents(model.balance_cents),
            payment_status: model.payment_status.to_value(),
            currency: model.currency,
            lead_id: model.lead_id,
            enrolled_at: model.enrolled_at.with_timezone(&Utc),
        }
    }
}

#[derive(Clone, Debug, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub id: Uuid,
    pub name: String,
    pub level: Option<String>,
    pub total_seats: i32,
    pub enrolled_count: i32,
    pub seats_left: i32,
    pub starts_on: Option<NaiveDate>,
}

impl From<batch::Model> for BatchView {
    fn from(model: batch::Model) -> Self {
        Self {
            seats_left: model.seats_left(),
            id: model.id,
            name: model.name,
            level: model.level,
            total_seats: model.total_seats,
            enrolled_count: model.enrolled_count,
            starts_on: model.starts_on,
        }
    }
}

#[derive(Clone, Debug, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: Uuid,
    pub student_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub amount: String,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl From<payment::Model> for PaymentView {
    fn from(model: payment::Model) -> Self {
        Self {
            id: model.id,
            student_id: model.student_id,
            invoice_id: model.invoice_id,
            amount: format_cents(model.amount_cents),
            currency: model.currency,
            method: model.method.to_value(),
            status: model.status.to_value(),
            reference: model.reference,
            paid_at: model.paid_at.with_timezone(&Utc),
        }
    }
}

#[derive(Clone, Debug, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryView {
    pub id: Uuid,
    pub action: String,
    pub description: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub severity: String,
    pub metadata: async_graphql::Json<Value>,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<audit_log::Model> for AuditEntryView {
    fn from(model: audit_log::Model) -> Self {
        Self {
            id: model.id,
            action: model.action.to_value(),
            description: model.description,
            entity_type: model.entity_type,
            entity_id: model.entity_id,
            severity: model.severity.to_value(),
            metadata: async_graphql::Json(model.metadata),
            actor_id: model.actor_id,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
