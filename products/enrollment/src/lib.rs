//! Lead intake, invoicing and the lead-to-student conversion workflow of
//! the school backend.
//!
//! [`Enrollment`] bundles the database handle with every collaborator the
//! workflows need. Collaborators are trait objects so tests and deployments
//! can swap them without touching the workflows.

pub mod audit;
pub mod batches;
pub mod cache;
pub mod conversion;
pub mod error;
pub mod exchange;
pub mod idempotency;
pub mod invoices;
pub mod leads;
pub mod money;
pub mod notify;
pub mod payments;
pub mod report;
pub mod student_id;
pub mod students;
pub mod views;

use std::sync::Arc;

use chrono::Duration;
use sea_orm::DatabaseConnection;

pub use audit::{AuditEntry, AuditSink, DbAuditSink};
pub use cache::{Cache, InMemoryCache};
pub use conversion::{ConversionOutcome, PayAndConvertRequest};
pub use error::{EnrollmentError, EnrollmentResult};
pub use exchange::{ExchangeRates, FixedRates};
pub use idempotency::IdempotencyGuard;
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use report::OutstandingReport;
pub use student_id::{RandomStudentIds, StudentIdGenerator};

pub const DEFAULT_BASE_CURRENCY: &str = "EUR";

#[derive(Clone)]
pub struct Enrollment {
    db: Arc<DatabaseConnection>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    student_ids: Arc<dyn StudentIdGenerator>,
    rates: Arc<dyn ExchangeRates>,
    report_cache: Arc<dyn Cache<OutstandingReport>>,
    guard: IdempotencyGuard,
    base_currency: String,
}

impl Enrollment {
    /// Defaults: audit rows in the same database, log-only notifications,
    /// random student codes, no exchange rates, a five minute report cache.
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            audit: Arc::new(DbAuditSink::new(db.clone())),
            db,
            notifier: Arc::new(LogNotifier),
            student_ids: Arc::new(RandomStudentIds),
            rates: Arc::new(FixedRates::new()),
            report_cache: Arc::new(InMemoryCache::new(Duration::minutes(5))),
            guard: IdempotencyGuard::default(),
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_student_ids(mut self, student_ids: Arc<dyn StudentIdGenerator>) -> Self {
        self.student_ids = student_ids;
        self
    }

    pub fn with_exchange_rates(mut self, rates: Arc<dyn ExchangeRates>) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_report_cache(mut self, cache: Arc<dyn Cache<OutstandingReport>>) -> Self {
        self.report_cache = cache;
        self
    }

    pub fn with_guard(mut self, guard: IdempotencyGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_base_currency(mut self, currency: impl Into<String>) -> Self {
        self.base_currency = currency.into();
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }
}
