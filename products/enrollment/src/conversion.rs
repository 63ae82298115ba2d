//! Pay-and-convert: settle a lead's invoice and enroll the lead as a
//! student in one transaction, at most once per idempotency key.

use chrono::{DateTime, Utc};
use entity::audit_log::{Action, Severity};
use entity::{batch, invoice, lead, payment, student};
use platform_db::is_unique_violation;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    TransactionTrait, prelude::DateTimeWithTimeZone, sea_query::Expr,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    AuditEntry, Enrollment,
    error::{EnrollmentError, EnrollmentResult},
    idempotency::{Admission, normalize_key},
    money,
    notify::Notification,
    student_id::MAX_STUDENT_CODE_ATTEMPTS,
    views::StudentView,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayAndConvertRequest {
    pub paid_amount: Decimal,
    #[serde(default)]
    pub batch_id: Option<Uuid>,
    #[serde(default)]
    pub enrollment_type: Option<student::EnrollmentType>,
    #[serde(default)]
    pub idempotency_key: String,
    #[serde(default)]
    pub payment_method: Option<payment::Method>,
}

#[derive(Clone, Debug)]
pub struct ConversionOutcome {
    pub body: Value,
    /// The body came from a previously completed attempt.
    pub replayed: bool,
}

struct Converted {
    student: student::Model,
    payment_id: Uuid,
    remaining_cents: i64,
}

impl Enrollment {
    #[instrument(skip_all, fields(%invoice_id, key = %request.idempotency_key.trim()))]
    pub async fn pay_and_convert(
        &self,
        invoice_id: Uuid,
        request: PayAndConvertRequest,
        actor: Option<Uuid>,
    ) -> EnrollmentResult<ConversionOutcome> {
        let key = normalize_key(&request.idempotency_key)?;
        let paid_cents = money::validate_amount("paidAmount", request.paid_amount)?;

        let invoice = self.get_invoice(invoice_id).await?;
        let lead_id = invoice.lead_id.ok_or(EnrollmentError::NotFound("lead"))?;
        let lead = self.get_lead(lead_id).await?;
        if paid_cents > invoice.total_amount_cents {
            return Err(EnrollmentError::exceeds(
                money::from_cents(invoice.total_amount_cents),
                money::from_cents(paid_cents),
            ));
        }
        if let Some(batch_id) = request.batch_id {
            self.get_batch(batch_id).await?;
        }

        let attempt = match self.guard.admit(self.db(), &key, invoice.id).await? {
            Admission::Replay(body) => {
                return Ok(ConversionOutcome {
                    body,
                    replayed: true,
                });
            }
            Admission::Proceed(attempt) => attempt,
        };

        if let Err(err) = ensure_convertible(&invoice, &lead) {
            if let Err(mark) = self.guard.fail(self.db(), attempt.id, &err.to_string()).await {
                tracing::error!(error = %mark, attempt_id = %attempt.id, "failed to mark attempt as failed");
            }
            return Err(err);
        }

        let now = Utc::now();
        let txn = self.db().begin().await?;
        let written = self
            .write_conversion(&txn, &invoice, &lead, &request, paid_cents, now)
            .await;
        let converted = match written {
            Ok(converted) => txn.commit().await.map(|_| converted).map_err(Into::into),
            Err(err) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "rollback after failed conversion");
                }
                Err(err)
            }
        };

        match converted {
            Ok(converted) => {
                let body = success_body(&lead, &converted);
                if let Err(err) = self.guard.complete(self.db(), attempt.id, &body).await {
                    tracing::error!(error = %err, attempt_id = %attempt.id, "failed to cache conversion result");
                }
                self.after_conversion(&key, &invoice, &lead, &converted, actor)
                    .await;
                Ok(ConversionOutcome {
                    body,
                    replayed: false,
                })
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(mark) = self.guard.fail(self.db(), attempt.id, &message).await {
                    tracing::error!(error = %mark, attempt_id = %attempt.id, "failed to mark attempt as failed");
                }
                let severity = if err.is_client_error() {
                    Severity::Warning
                } else {
                    Severity::Critical
                };
                self.audit
                    .record(
                        AuditEntry::new(
                            Action::ConversionFailed,
                            "invoice",
                            Some(invoice.id),
                            format!("Conversion of invoice {} failed", invoice.invoice_number),
                        )
                        .severity(severity)
                        .metadata(json!({
                            "leadId": lead.id,
                            "idempotencyKey": key,
                            "error": message,
                        }))
                        .actor(actor),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn write_conversion(
        &self,
        txn: &DatabaseTransaction,
        invoice: &invoice::Model,
        lead: &lead::Model,
        request: &PayAndConvertRequest,
        paid_cents: i64,
        now: DateTime<Utc>,
    ) -> EnrollmentResult<Converted> {
        let stamp: DateTimeWithTimeZone = now.into();
        let remaining_cents = invoice.total_amount_cents - paid_cents;

        let settled = invoice::Entity::update_many()
            .set(invoice::ActiveModel {
                status: Set(invoice::Status::Paid),
                paid_amount_cents: Set(Some(paid_cents)),
                remaining_amount_cents: Set(Some(remaining_cents)),
                paid_at: Set(Some(stamp)),
                updated_at: Set(stamp),
                ..Default::default()
            })
            .filter(invoice::Column::Id.eq(invoice.id))
            .filter(invoice::Column::Status.eq(invoice::Status::Pending))
            .exec(txn)
            .await?;
        if settled.rows_affected == 0 {
            return Err(EnrollmentError::conflict("invoice is no longer PENDING"));
        }

        let student_id = Uuid::new_v4();
        let batch_id = request.batch_id.or(lead.batch_id);
        let draft = student::ActiveModel {
            id: Set(student_id),
            name: Set(lead.name.clone()),
            email: Set(lead.email.clone()),
            phone: Set(lead.phone.clone()),
            whatsapp: Set(lead.whatsapp.clone()),
            level: Set(lead.interested_level.clone()),
            source: Set(Some(lead.source)),
            batch_id: Set(batch_id),
            enrollment_type: Set(request.enrollment_type.unwrap_or_default()),
            final_price_cents: Set(invoice.total_amount_cents),
            total_paid_cents: Set(paid_cents),
            balance_cents: Set(remaining_cents),
            payment_status: Set(student::PaymentStatus::for_balance(
                remaining_cents,
                paid_cents,
            )),
            currency: Set(invoice.currency.clone()),
            lead_id: Set(Some(lead.id)),
            enrolled_at: Set(stamp),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        };
        self.insert_student(txn, draft, now).await?;

        let converted = lead::Entity::update_many()
            .set(lead::ActiveModel {
                converted: Set(true),
                status: Set(lead::Status::Converted),
                converted_date: Set(Some(stamp)),
                student_id: Set(Some(student_id)),
                updated_at: Set(stamp),
                ..Default::default()
            })
            .filter(lead::Column::Id.eq(lead.id))
            .filter(lead::Column::Converted.eq(false))
            .filter(lead::Column::Status.ne(lead::Status::Lost))
            .exec(txn)
            .await?;
        if converted.rows_affected == 0 {
            return Err(EnrollmentError::conflict(
                "lead is already converted or was marked LOST",
            ));
        }

        invoice::Entity::update_many()
            .set(invoice::ActiveModel {
                student_id: Set(Some(student_id)),
                ..Default::default()
            })
            .filter(invoice::Column::Id.eq(invoice.id))
            .exec(txn)
            .await?;

        let payment_id = Uuid::new_v4();
        payment::Entity::insert(payment::ActiveModel {
            id: Set(payment_id),
            student_id: Set(Some(student_id)),
            invoice_id: Set(Some(invoice.id)),
            amount_cents: Set(paid_cents),
            currency: Set(invoice.currency.clone()),
            method: Set(request.payment_method.unwrap_or_default()),
            status: Set(payment::Status::Completed),
            reference: Set(Some(invoice.invoice_number.clone())),
            paid_at: Set(stamp),
            created_at: Set(stamp),
        })
        .exec_without_returning(txn)
        .await?;

        if let Some(batch_id) = batch_id {
            let seated = batch::Entity::update_many()
                .col_expr(
                    batch::Column::EnrolledCount,
                    Expr::col(batch::Column::EnrolledCount).add(1),
                )
                .col_expr(batch::Column::UpdatedAt, Expr::value(stamp))
                .filter(batch::Column::Id.eq(batch_id))
                .exec(txn)
                .await?;
            if seated.rows_affected == 0 {
                return Err(EnrollmentError::Internal(format!(
                    "batch {batch_id} vanished during conversion"
                )));
            }
        }

        let student = student::Entity::find_by_id(student_id)
            .one(txn)
            .await?
            .ok_or_else(|| EnrollmentError::Internal("inserted student not readable".into()))?;
        Ok(Converted {
            student,
            payment_id,
            remaining_cents,
        })
    }

    /// Insert the student under a fresh code, retrying inside a savepoint
    /// when the code is already taken.
    async fn insert_student(
        &self,
        txn: &DatabaseTransaction,
        draft: student::ActiveModel,
        now: DateTime<Utc>,
    ) -> EnrollmentResult<()> {
        for attempt in 1..=MAX_STUDENT_CODE_ATTEMPTS {
            let mut row = draft.clone();
            row.student_code = Set(self.student_ids.generate(now));
            let savepoint = txn.begin().await?;
            match student::Entity::insert(row)
                .exec_without_returning(&savepoint)
                .await
            {
                Ok(_) => {
                    savepoint.commit().await?;
                    return Ok(());
                }
                Err(err) if is_unique_violation(&err) => {
                    savepoint.rollback().await?;
                    tracing::debug!(attempt, "student code collision, regenerating");
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    return Err(err.into());
                }
            }
        }
        Err(EnrollmentError::Internal(format!(
            "no unique student code after {MAX_STUDENT_CODE_ATTEMPTS} attempts"
        )))
    }

    async fn after_conversion(
        &self,
        key: &str,
        invoice: &invoice::Model,
        lead: &lead::Model,
        converted: &Converted,
        actor: Option<Uuid>,
    ) {
        let student = &converted.student;
        let paid = money::format_cents(student.total_paid_cents);
        self.audit
            .record(
                AuditEntry::new(
                    Action::ConversionStarted,
                    "lead",
                    Some(lead.id),
                    format!("Conversion of {} started", lead.name),
                )
                .metadata(json!({
                    "invoiceId": invoice.id,
                    "idempotencyKey": key,
                    "paidAmount": paid,
                }))
                .actor(actor),
            )
            .await;
        self.audit
            .record(
                AuditEntry::new(
                    Action::PaymentReceived,
                    "payment",
                    Some(converted.payment_id),
                    format!(
                        "Received {paid} {} for invoice {}",
                        invoice.currency, invoice.invoice_number
                    ),
                )
                .metadata(json!({
                    "invoiceId": invoice.id,
                    "amount": paid,
                    "currency": invoice.currency,
                    "remainingAmount": money::format_cents(converted.remaining_cents),
                }))
                .actor(actor),
            )
            .await;
        self.audit
            .record(
                AuditEntry::new(
                    Action::LeadConverted,
                    "lead",
                    Some(lead.id),
                    format!("{} enrolled as {}", lead.name, student.student_code),
                )
                .metadata(json!({
                    "studentId": student.id,
                    "studentCode": student.student_code,
                    "batchId": student.batch_id,
                }))
                .actor(actor),
            )
            .await;

        self.report_cache.invalidate_all().await;

        if let Some(notification) = Notification::welcome(
            &student.name,
            &student.student_code,
            student.email.as_deref(),
            student.whatsapp.as_deref(),
        ) {
            if let Err(err) = self.notifier.notify(&notification).await {
                tracing::warn!(error = %err, student_id = %student.id, "welcome notification failed");
            }
        }
    }
}

/// State checks that need no lock: the transaction re-checks both with
/// conditional updates.
fn ensure_convertible(invoice: &invoice::Model, lead: &lead::Model) -> EnrollmentResult<()> {
    if invoice.status != invoice::Status::Pending {
        return Err(EnrollmentError::conflict(format!(
            "invoice is already {}",
            invoice.status.as_str()
        )));
    }
    if lead.converted {
        return Err(EnrollmentError::conflict("lead is already converted"));
    }
    if lead.status == lead::Status::Lost {
        return Err(EnrollmentError::conflict(
            "lead is marked LOST; reopen it before converting",
        ));
    }
    Ok(())
}

fn success_body(lead: &lead::Model, converted: &Converted) -> Value {
    let student = &converted.student;
    json!({
        "success": true,
        "message": format!("{} converted to student {}", lead.name, student.student_code),
        "studentId": student.student_code,
        "invoiceStatus": invoice::Status::Paid.as_str(),
        "student": StudentView::from(student.clone()),
    })
}
