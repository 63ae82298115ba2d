//! Ledger entities: leads, invoices, students, payments, batches, conversion
//! attempts and the audit log.
//!
//! Money columns hold integer minor units (`*_cents`); services convert them
//! to exact decimals at the edges.

pub mod audit_log;
pub mod batch;
pub mod conversion_attempt;
pub mod invoice;
pub mod lead;
pub mod payment;
pub mod student;
