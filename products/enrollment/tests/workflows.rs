mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{dec, invoiced_lead, lead_named, request, setup};
use entity::{audit_log, invoice, lead, payment, student};
use products_enrollment::{
    EnrollmentError, FixedRates, InMemoryCache,
    batches::NewBatch,
    invoices::NewInvoice,
    leads::{LeadPatch, NewLead},
    payments::TuitionPayment,
    students::StudentFilter,
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, PaginatorTrait};
use uuid::Uuid;

fn tuition(amount: &str, currency: Option<&str>) -> TuitionPayment {
    TuitionPayment {
        amount: dec(amount),
        currency: currency.map(str::to_string),
        method: Some(payment::Method::Cash),
        reference: Some(" receipt-7 ".into()),
    }
}

#[tokio::test]
async fn leads_start_new_and_follow_transition_rules() {
    let enrollment = setup().await;
    let created = enrollment
        .create_lead(
            NewLead {
                name: "  Rhea  ".into(),
                email: Some("Rhea@Example.com".into()),
                source: Some(lead::Source::Instagram),
                quality: Some(lead::Quality::Hot),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(created.name, "Rhea");
    assert_eq!(created.email.as_deref(), Some("rhea@example.com"));
    assert_eq!(created.status, lead::Status::New);
    assert!(!created.converted);

    let blank = enrollment
        .create_lead(NewLead::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(blank, EnrollmentError::Validation(_)));

    let contacted = enrollment
        .update_lead(
            created.id,
            LeadPatch {
                status: Some(lead::Status::Contacted),
                notes: Some("called twice".into()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(contacted.status, lead::Status::Contacted);
    assert_eq!(contacted.notes.as_deref(), Some("called twice"));

    let manual = enrollment
        .update_lead(
            created.id,
            LeadPatch {
                status: Some(lead::Status::Converted),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(manual, EnrollmentError::Validation(_)));

    let lost = LeadPatch {
        status: Some(lead::Status::Lost),
        ..Default::default()
    };
    enrollment.update_lead(created.id, lost, None).await.unwrap();
    let revive = LeadPatch {
        status: Some(lead::Status::Interested),
        ..Default::default()
    };
    assert!(matches!(
        enrollment.update_lead(created.id, revive, None).await,
        Err(EnrollmentError::Conflict(_))
    ));
    let reopen = LeadPatch {
        status: Some(lead::Status::New),
        ..Default::default()
    };
    let reopened = enrollment.update_lead(created.id, reopen, None).await.unwrap();
    assert_eq!(reopened.status, lead::Status::New);

    let listed = enrollment
        .list_leads(Some(lead::Status::New), 10, 0)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(matches!(
        enrollment.get_lead(Uuid::new_v4()).await,
        Err(EnrollmentError::NotFound("lead"))
    ));
}

#[tokio::test]
async fn converted_leads_keep_conversion_fields() {
    let enrollment = setup().await;
    let (lead, invoice) = invoiced_lead(&enrollment, "Sam", "120.00").await;
    enrollment
        .pay_and_convert(invoice.id, request("120.00", "sam"), None)
        .await
        .unwrap();

    let err = enrollment
        .update_lead(
            lead.id,
            LeadPatch {
                status: Some(lead::Status::Lost),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentError::Conflict(_)));

    let noted = enrollment
        .update_lead(
            lead.id,
            LeadPatch {
                notes: Some("prefers evenings".into()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert!(noted.converted);
    assert_eq!(noted.status, lead::Status::Converted);

    let again = enrollment
        .create_invoice(
            lead.id,
            NewInvoice {
                total_amount: dec("10"),
                currency: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(again, EnrollmentError::Conflict(_)));
}

#[tokio::test]
async fn invoices_are_numbered_and_cancel_only_from_pending() {
    let enrollment = setup().await;
    let lead = lead_named(&enrollment, "Tara").await;
    let created = enrollment
        .create_invoice(
            lead.id,
            NewInvoice {
                total_amount: dec("450.50"),
                currency: Some("inr".into()),
            },
            None,
        )
        .await
        .unwrap();
    assert!(created.invoice_number.starts_with("INV-"));
    assert_eq!(created.total_amount_cents, 45_050);
    assert_eq!(created.currency, "INR");
    assert_eq!(created.status, invoice::Status::Pending);

    let default_currency = enrollment
        .create_invoice(
            lead.id,
            NewInvoice {
                total_amount: dec("10"),
                currency: None,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(default_currency.currency, "EUR");
    assert_eq!(enrollment.invoices_for_lead(lead.id).await.unwrap().len(), 2);

    let cancelled = enrollment.cancel_invoice(created.id, None).await.unwrap();
    assert_eq!(cancelled.status, invoice::Status::Cancelled);
    assert!(matches!(
        enrollment.cancel_invoice(created.id, None).await,
        Err(EnrollmentError::Conflict(_))
    ));

    for bad in ["0", "100000.01", "1.234"] {
        let err = enrollment
            .create_invoice(
                lead.id,
                NewInvoice {
                    total_amount: dec(bad),
                    currency: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::Validation(_)), "{bad}");
    }
    assert!(matches!(
        enrollment
            .create_invoice(
                Uuid::new_v4(),
                NewInvoice {
                    total_amount: dec("10"),
                    currency: None,
                },
                None,
            )
            .await,
        Err(EnrollmentError::NotFound("lead"))
    ));
}

#[tokio::test]
async fn batches_require_seats() {
    let enrollment = setup().await;
    let err = enrollment
        .create_batch(
            NewBatch {
                name: "B2 Weekend".into(),
                level: None,
                total_seats: 0,
                starts_on: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentError::Validation(_)));

    let batch = enrollment
        .create_batch(
            NewBatch {
                name: "B2 Weekend".into(),
                level: Some("B2".into()),
                total_seats: 8,
                starts_on: None,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(batch.enrolled_count, 0);
    assert_eq!(enrollment.list_batches().await.unwrap().len(), 1);
    assert_eq!(enrollment.get_batch(batch.id).await.unwrap().name, "B2 Weekend");
}

#[tokio::test]
async fn tuition_payments_reduce_balance_until_paid() {
    let enrollment = setup().await;
    let (_, invoice) = invoiced_lead(&enrollment, "Uma", "500.00").await;
    enrollment
        .pay_and_convert(invoice.id, request("200.00", "uma"), None)
        .await
        .unwrap();
    let student = enrollment
        .list_students(StudentFilter::default(), 10, 0)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(student.payment_status, student::PaymentStatus::Partial);

    let receipt = enrollment
        .record_payment(student.id, tuition("120.50", None), None)
        .await
        .unwrap();
    assert_eq!(receipt.student.total_paid_cents, 32_050);
    assert_eq!(receipt.student.balance_cents, 17_950);
    assert_eq!(receipt.payment.reference.as_deref(), Some("receipt-7"));
    assert_eq!(receipt.payment.method, payment::Method::Cash);

    let err = enrollment
        .record_payment(student.id, tuition("180.00", None), None)
        .await
        .unwrap_err();
    match err {
        EnrollmentError::AmountExceedsTotal { excess, .. } => {
            assert_eq!(excess.to_string(), "0.50")
        }
        other => panic!("unexpected {other:?}"),
    }

    let settled = enrollment
        .record_payment(student.id, tuition("179.50", None), None)
        .await
        .unwrap();
    assert_eq!(settled.student.balance_cents, 0);
    assert_eq!(settled.student.payment_status, student::PaymentStatus::Paid);
    assert_eq!(
        settled.student.final_price_cents,
        settled.student.total_paid_cents + settled.student.balance_cents
    );
    assert_eq!(
        enrollment.payments_for_student(student.id).await.unwrap().len(),
        3
    );
    let recorded = audit_log::Entity::find()
        .all(enrollment.db())
        .await
        .unwrap()
        .into_iter()
        .filter(|row| row.action == audit_log::Action::PaymentRecorded)
        .count();
    assert_eq!(recorded, 2);

    assert!(matches!(
        enrollment
            .record_payment(Uuid::new_v4(), tuition("1", None), None)
            .await,
        Err(EnrollmentError::NotFound("student"))
    ));
}

#[tokio::test]
async fn foreign_currency_payments_go_through_exchange_rates() {
    let rates = FixedRates::parse("EUR/INR=90.00").unwrap();
    let enrollment = setup().await.with_exchange_rates(Arc::new(rates));
    let (_, invoice) = invoiced_lead(&enrollment, "Vik", "300.00").await;
    enrollment
        .pay_and_convert(invoice.id, request("100.00", "vik"), None)
        .await
        .unwrap();
    let student = enrollment
        .list_students(StudentFilter::default(), 1, 0)
        .await
        .unwrap()
        .remove(0);

    // 4500 INR at 90 INR per EUR is 50 EUR.
    let receipt = enrollment
        .record_payment(student.id, tuition("4500", Some("INR")), None)
        .await
        .unwrap();
    assert_eq!(receipt.credited_cents, 5_000);
    assert_eq!(receipt.payment.currency, "INR");
    assert_eq!(receipt.payment.amount_cents, 450_000);
    assert_eq!(receipt.student.balance_cents, 15_000);

    let err = enrollment
        .record_payment(student.id, tuition("10", Some("USD")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentError::Validation(_)));

    // 0.01 INR is worth less than a euro cent.
    let err = enrollment
        .record_payment(student.id, tuition("0.01", Some("INR")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentError::Validation(_)), "{err:?}");
    let unchanged = enrollment.get_student(student.id).await.unwrap();
    assert_eq!(unchanged.balance_cents, 15_000);
    assert_eq!(
        enrollment
            .payments_for_student(student.id)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn outstanding_report_is_cached_until_money_moves() {
    let rates = FixedRates::parse("EUR/INR=90.00").unwrap();
    let enrollment = setup()
        .await
        .with_exchange_rates(Arc::new(rates))
        .with_report_cache(Arc::new(InMemoryCache::new(Duration::minutes(10))));

    let (_, eur) = invoiced_lead(&enrollment, "Wen", "500.00").await;
    enrollment
        .pay_and_convert(eur.id, request("100.00", "wen"), None)
        .await
        .unwrap();
    let inr_lead = lead_named(&enrollment, "Xia").await;
    let inr = enrollment
        .create_invoice(
            inr_lead.id,
            NewInvoice {
                total_amount: dec("9000"),
                currency: Some("INR".into()),
            },
            None,
        )
        .await
        .unwrap();
    enrollment
        .pay_and_convert(inr.id, request("4500", "xia"), None)
        .await
        .unwrap();

    let report = enrollment.outstanding_report(None).await.unwrap();
    assert_eq!(report.base_currency, "EUR");
    // 400 EUR + 4500 INR (50 EUR).
    assert_eq!(report.total_outstanding, "450.00");
    assert_eq!(report.by_currency.len(), 2);

    // A write that bypasses the workflows is not seen until invalidation.
    let wen = enrollment
        .list_students(
            StudentFilter {
                payment_status: Some(student::PaymentStatus::Partial),
                batch_id: None,
            },
            10,
            0,
        )
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.name == "Wen")
        .unwrap();
    let mut active: student::ActiveModel = wen.clone().into();
    active.balance_cents = Set(30_000);
    active.update(enrollment.db()).await.unwrap();
    let cached = enrollment.outstanding_report(Some("eur")).await.unwrap();
    assert_eq!(cached.total_outstanding, "450.00");
    assert_eq!(cached.generated_at, report.generated_at);

    enrollment
        .record_payment(wen.id, tuition("100.00", None), None)
        .await
        .unwrap();
    let fresh = enrollment.outstanding_report(None).await.unwrap();
    assert_eq!(fresh.total_outstanding, "250.00");

    let in_inr = enrollment.outstanding_report(Some("INR")).await.unwrap();
    assert_eq!(in_inr.total_outstanding, "22500.00");
    assert_eq!(
        student::Entity::find().count(enrollment.db()).await.unwrap(),
        2
    );
}
