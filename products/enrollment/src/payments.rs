use chrono::Utc;
use entity::audit_log::Action;
use entity::{payment, student};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    TransactionTrait,
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

/// A tuition payment received after enrollment.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuitionPayment {
    pub amount: Decimal,
    /// Defaults to the student's currency.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub method: Option<payment::Method>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PaymentReceipt {
    pub payment: payment::Model,
    pub student: student::Model,
    /// Amount credited against the balance, in the student's currency.
    pub credited_cents: i64,
}

impl Enrollment {
    #[instrument(skip_all, fields(%student_id))]
    pub async fn record_payment(
        &self,
        student_id: Uuid,
        input: TuitionPayment,
        actor: Option<Uuid>,
    ) -> EnrollmentResult<PaymentReceipt> {
        let amount_cents = money::validate_amount("amount", input.amount)?;
        let currency = input
            .currency
            .as_deref()
            .map(money::normalize_currency)
            .transpose()?;

        let txn = self.db().begin().await?;
        let receipt = match self
            .apply_payment(&txn, student_id, &input, amount_cents, currency)
            .await
        {
            Ok(receipt) => {
                txn.commit().await?;
                receipt
            }
            Err(err) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "rollback after failed payment");
                }
                return Err(err);
            }
        };

        self.report_cache.invalidate_all().await;
        self.audit
            .record(
                AuditEntry::new(
                    Action::PaymentRecorded,
                    "payment",
                    Some(receipt.payment.id),
                    format!(
                        "Recorded {} {} from {}",
                        money::format_cents(receipt.payment.amount_cents),
                        receipt.payment.currency,
                        receipt.student.student_code
                    ),
                )
                .metadata(json!({
                    "studentId": receipt.student.id,
                    "credited": money::format_cents(receipt.credited_cents),
                    "studentCurrency": receipt.student.currency,
                    "balance": money::format_cents(receipt.student.balance_cents),
                }))
                .actor(actor),
            )
            .await;
        Ok(receipt)
    }

    async fn apply_payment(
        &self,
        txn: &DatabaseTransaction,
        student_id: Uuid,
        input: &TuitionPayment,
        amount_cents: i64,
        currency: Option<String>,
    ) -> EnrollmentResult<PaymentReceipt> {
        // Re-read inside the transaction; the balance may have moved since
        // the caller last looked.
        let current = student::Entity::find_by_id(student_id)
            .one(txn)
            .await?
            .ok_or(EnrollmentError::NotFound("student"))?;
        let currency = currency.unwrap_or_else(|| current.currency.clone());
        let credited_cents = self
            .rates
            .convert_cents(amount_cents, &currency, &current.currency)?;
        if credited_cents == 0 {
            return Err(EnrollmentError::validation(format!(
                "amount is below one cent once converted to {}",
                current.currency
            )));
        }
        if credited_cents > current.balance_cents {
            return Err(EnrollmentError::exceeds(
                money::from_cents(current.balance_cents),
                money::from_cents(credited_cents),
            ));
        }

        let total_paid = current.total_paid_cents + credited_cents;
        let balance = current.balance_cents - credited_cents;
        let now = Utc::now();
        let updated = student::Entity::update_many()
            .set(student::ActiveModel {
                total_paid_cents: Set(total_paid),
                balance_cents: Set(balance),
                payment_status: Set(student::PaymentStatus::for_balance(balance, total_paid)),
                updated_at: Set(now.into()),
                ..Default::default()
            })
            .filter(student::Column::Id.eq(student_id))
            .filter(student::Column::BalanceCents.eq(current.balance_cents))
            .exec(txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(EnrollmentError::conflict(
                "student balance changed concurrently; retry the payment",
            ));
        }

        let payment_id = Uuid::new_v4();
        payment::Entity::insert(payment::ActiveModel {
            id: Set(payment_id),
            student_id: Set(Some(student_id)),
            invoice_id: Set(None),
            amount_cents: Set(amount_cents),
            currency: Set(currency),
            method: Set(input.method.unwrap_or_default()),
            status: Set(payment::Status::Completed),
            reference: Set(input
                .reference
                .as_ref()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())),
            paid_at: Set(now.into()),
            created_at: Set(now.into()),
        })
        .exec_without_returning(txn)
        .await?;

        let payment = payment::Entity::find_by_id(payment_id)
            .one(txn)
            .await?
            .ok_or_else(|| EnrollmentError::Internal("inserted payment not readable".into()))?;
        let student = student::Entity::find_by_id(student_id)
            .one(txn)
            .await?
            .ok_or(EnrollmentError::NotFound("student"))?;
        Ok(PaymentReceipt {
            payment,
            student,
            credited_cents,
        })
    }
}
