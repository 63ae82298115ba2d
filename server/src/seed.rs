//! Demo fixtures for local development.

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use entity::{batch, lead};
use products_enrollment::{
    Enrollment, batches::NewBatch, invoices::NewInvoice, leads::NewLead,
};
use rust_decimal::Decimal;
use sea_orm::{EntityTrait, PaginatorTrait};
use tracing::info;

#[derive(Debug)]
pub struct SeededRecords {
    pub batches: usize,
    pub leads: usize,
    pub invoices: usize,
}

/// Insert a couple of batches and invoiced leads. Does nothing when the
/// database already holds batches.
pub async fn seed_demo(enrollment: &Enrollment) -> Result<SeededRecords> {
    let existing = batch::Entity::find().count(enrollment.db()).await?;
    if existing > 0 {
        info!(existing, "database already seeded; skipping");
        return Ok(SeededRecords {
            batches: 0,
            leads: 0,
            invoices: 0,
        });
    }

    let month = Utc::now().date_naive().with_day(1);
    let mut batches = Vec::new();
    for (name, level, seats) in [("A1 Morning", "A1", 12), ("B1 Evening", "B1", 10)] {
        let created = enrollment
            .create_batch(
                NewBatch {
                    name: name.into(),
                    level: Some(level.into()),
                    total_seats: seats,
                    starts_on: month,
                },
                None,
            )
            .await
            .with_context(|| format!("seeding batch {name}"))?;
        batches.push(created);
    }

    let fixtures = [
        ("Anika Sharma", "anika@example.com", lead::Source::Instagram, 0, 50_000),
        ("Jonas Weber", "jonas@example.com", lead::Source::Referral, 1, 62_500),
        ("Priya Nair", "priya@example.com", lead::Source::Website, 0, 50_000),
    ];
    let mut invoices = 0;
    for (name, email, source, batch_index, total_cents) in fixtures {
        let created = enrollment
            .create_lead(
                NewLead {
                    name: name.into(),
                    email: Some(email.into()),
                    source: Some(source),
                    interested_level: batches[batch_index].level.clone(),
                    batch_id: Some(batches[batch_index].id),
                    ..Default::default()
                },
                None,
            )
            .await
            .with_context(|| format!("seeding lead {name}"))?;
        enrollment
            .create_invoice(
                created.id,
                NewInvoice {
                    total_amount: Decimal::new(total_cents, 2),
                    currency: None,
                },
                None,
            )
            .await
            .with_context(|| format!("seeding invoice for {name}"))?;
        invoices += 1;
    }

    Ok(SeededRecords {
        batches: batches.len(),
        leads: fixtures.len(),
        invoices,
    })
}
