pub use sea_orm_migration::prelude::*;

mod m20260105_000001_school_core;
mod m20260105_000002_conversion_attempts;
mod m20260105_000003_audit_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260105_000001_school_core::Migration),
            Box::new(m20260105_000002_conversion_attempts::Migration),
            Box::new(m20260105_000003_audit_log::Migration),
        ]
    }
}
