use std::collections::BTreeMap;

use async_graphql::SimpleObject;
use chrono::{DateTime, Utc};
use entity::student;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;

use crate::{Enrollment, error::EnrollmentResult, money};

#[derive(Clone, Debug, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyBalance {
    pub currency: String,
    pub students: i32,
    pub outstanding: String,
}

/// Open student balances, per currency and consolidated into one base
/// currency.
#[derive(Clone, Debug, Serialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingReport {
    pub base_currency: String,
    pub total_outstanding: String,
    pub by_currency: Vec<CurrencyBalance>,
    pub generated_at: DateTime<Utc>,
}

impl Enrollment {
    pub async fn outstanding_report(
        &self,
        base_currency: Option<&str>,
    ) -> EnrollmentResult<OutstandingReport> {
        let base = match base_currency {
            Some(raw) => money::normalize_currency(raw)?,
            None => self.base_currency.clone(),
        };
        let cache_key = format!("outstanding:{base}");
        if let Some(hit) = self.report_cache.get(&cache_key).await {
            return Ok(hit);
        }

        let open = student::Entity::find()
            .filter(student::Column::BalanceCents.gt(0))
            .all(self.db())
            .await?;
        let mut buckets: BTreeMap<String, (i32, i64)> = BTreeMap::new();
        for row in &open {
            let bucket = buckets.entry(row.currency.clone()).or_default();
            bucket.0 += 1;
            bucket.1 += row.balance_cents;
        }
        let mut total_cents = 0_i64;
        let mut by_currency = Vec::with_capacity(buckets.len());
        for (currency, (students, cents)) in buckets {
            total_cents += self.rates.convert_cents(cents, &currency, &base)?;
            by_currency.push(CurrencyBalance {
                currency,
                students,
                outstanding: money::format_cents(cents),
            });
        }

        let report = OutstandingReport {
            base_currency: base,
            total_outstanding: money::format_cents(total_cents),
            by_currency,
            generated_at: Utc::now(),
        };
        self.report_cache.put(&cache_key, report.clone()).await;
        Ok(report)
    }
}
