use chrono::{DateTime, Utc};
use entity::audit_log::Action;
use entity::{invoice, lead};
use platform_db::is_unique_violation;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    AuditEntry, Enrollment,
    error::{EnrollmentError, EnrollmentResult},
    money,
};

const NUMBER_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_NUMBER_ATTEMPTS: usize = 5;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub total_amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

/// `INV-YYYYMMDD-XXXXXX`.
pub fn invoice_number(issued_at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| NUMBER_ALPHABET[rng.gen_range(0..NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("INV-{}-{suffix}", issued_at.format("%Y%m%d"))
}

impl Enrollment {
    #[instrument(skip_all, fields(%lead_id))]
    pub async fn create_invoice(
        &self,
        lead_id: Uuid,
        input: NewInvoice,
        actor: Option<Uuid>,
    ) -> EnrollmentResult<invoice::Model> {
        let total_cents = money::validate_amount("totalAmount", input.total_amount)?;
        let currency = match input.currency.as_deref() {
            Some(raw) => money::normalize_currency(raw)?,
            None => self.base_currency.clone(),
        };
        let lead = lead::Entity::find_by_id(lead_id)
            .one(self.db())
            .await?
            .ok_or(EnrollmentError::NotFound("lead"))?;
        if lead.converted {
            return Err(EnrollmentError::conflict("lead is already converted"));
        }
        if lead.status == lead::Status::Lost {
            return Err(EnrollmentError::conflict("cannot invoice a lost lead"));
        }

        let now = Utc::now();
        let mut attempts = 0;
        let created = loop {
            attempts += 1;
            let id = Uuid::new_v4();
            let row = invoice::ActiveModel {
                id: Set(id),
                invoice_number: Set(invoice_number(now)),
                lead_id: Set(Some(lead.id)),
                student_id: Set(None),
                total_amount_cents: Set(total_cents),
                paid_amount_cents: Set(None),
                remaining_amount_cents: Set(None),
                currency: Set(currency.clone()),
                status: Set(invoice::Status::Pending),
                paid_at: Set(None),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            };
            match invoice::Entity::insert(row).exec_without_returning(self.db()).await {
                Ok(_) => break self.get_invoice(id).await?,
                Err(err) if is_unique_violation(&err) && attempts < MAX_NUMBER_ATTEMPTS => {
                    tracing::debug!(attempts, "invoice number collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        };

        self.audit
            .record(
                AuditEntry::new(
                    Action::InvoiceCreated,
                    "invoice",
                    Some(created.id),
                    format!("Invoice {} issued to {}", created.invoice_number, lead.name),
                )
                .metadata(json!({
                    "leadId": lead.id,
                    "totalAmount": money::format_cents(created.total_amount_cents),
                    "currency": created.currency,
                }))
                .actor(actor),
            )
            .await;
        Ok(created)
    }

    #[instrument(skip_all, fields(%invoice_id))]
    pub async fn cancel_invoice(
        &self,
        invoice_id: Uuid,
        actor: Option<Uuid>,
    ) -> EnrollmentResult<invoice::Model> {
        let existing = self.get_invoice(invoice_id).await?;
        if existing.status != invoice::Status::Pending {
            return Err(EnrollmentError::conflict(format!(
                "invoice is {}; only PENDING invoices can be cancelled",
                existing.status.as_str()
            )));
        }
        let patch = invoice::ActiveModel {
            status: Set(invoice::Status::Cancelled),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        let res = invoice::Entity::update_many()
            .set(patch)
            .filter(invoice::Column::Id.eq(invoice_id))
            .filter(invoice::Column::Status.eq(invoice::Status::Pending))
            .exec(self.db())
            .await?;
        if res.rows_affected == 0 {
            return Err(EnrollmentError::conflict("invoice is no longer PENDING"));
        }
        let cancelled = self.get_invoice(invoice_id).await?;
        self.audit
            .record(
                AuditEntry::new(
                    Action::InvoiceCancelled,
                    "invoice",
                    Some(cancelled.id),
                    format!("Invoice {} cancelled", cancelled.invoice_number),
                )
                .actor(actor),
            )
            .await;
        Ok(cancelled)
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> EnrollmentResult<invoice::Model> {
        invoice::Entity::find_by_id(invoice_id)
            .one(self.db())
            .await?
            .ok_or(EnrollmentError::NotFound("invoice"))
    }

    pub async fn invoices_for_lead(&self, lead_id: Uuid) -> EnrollmentResult<Vec<invoice::Model>> {
        Ok(invoice::Entity::find()
            .filter(invoice::Column::LeadId.eq(lead_id))
            .order_by_desc(invoice::Column::CreatedAt)
            .all(self.db())
            .await?)
    }
}
