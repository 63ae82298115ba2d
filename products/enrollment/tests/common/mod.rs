#![allow(dead_code)]

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::{DateTime, Utc};
use entity::{invoice, lead};
use migration::{Migrator, MigratorTrait};
use platform_db::DatabaseSettings;
use products_enrollment::{
    Enrollment, StudentIdGenerator,
    batches::NewBatch,
    conversion::PayAndConvertRequest,
    invoices::NewInvoice,
    leads::NewLead,
};
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

pub async fn setup() -> Enrollment {
    let settings = DatabaseSettings::new("sqlite::memory:").with_max_connections(1);
    let db = platform_db::connect(&settings).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    Enrollment::new(Arc::new(db))
}

pub async fn lead_named(enrollment: &Enrollment, name: &str) -> lead::Model {
    enrollment
        .create_lead(
            NewLead {
                name: name.into(),
                email: Some(format!("{}@example.com", name.to_lowercase())),
                phone: Some("+49 170 000000".into()),
                interested_level: Some("A1".into()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap()
}

pub async fn invoiced_lead(
    enrollment: &Enrollment,
    name: &str,
    total: &str,
) -> (lead::Model, invoice::Model) {
    let lead = lead_named(enrollment, name).await;
    let invoice = enrollment
        .create_invoice(
            lead.id,
            NewInvoice {
                total_amount: dec(total),
                currency: Some("EUR".into()),
            },
            None,
        )
        .await
        .unwrap();
    (lead, invoice)
}

pub async fn batch_with_seats(enrollment: &Enrollment, name: &str, seats: i32) -> Uuid {
    enrollment
        .create_batch(
            NewBatch {
                name: name.into(),
                level: Some("A1".into()),
                total_seats: seats,
                starts_on: None,
            },
            None,
        )
        .await
        .unwrap()
        .id
}

pub fn request(paid: &str, key: &str) -> PayAndConvertRequest {
    PayAndConvertRequest {
        paid_amount: dec(paid),
        batch_id: None,
        enrollment_type: None,
        idempotency_key: key.into(),
        payment_method: None,
    }
}

/// Hands out the same code every time and counts how often it was asked.
pub struct FixedIds {
    code: String,
    pub calls: AtomicUsize,
}

impl FixedIds {
    pub fn new(code: &str) -> Arc<Self> {
        Arc::new(Self {
            code: code.into(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StudentIdGenerator for FixedIds {
    fn generate(&self, _enrolled_at: DateTime<Utc>) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.code.clone()
    }
}
