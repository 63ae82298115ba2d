pub mod config;
pub mod graphql;
pub mod http;
pub mod seed;

use std::sync::Arc;

use platform_db::DbPool;
use products_enrollment::{
    Enrollment, IdempotencyGuard, InMemoryCache, LogNotifier, Notifier, WebhookNotifier,
};

use crate::config::AppConfig;

/// Wire the enrollment workflows to the collaborators named in `config`.
pub fn build_enrollment(db: Arc<DbPool>, config: &AppConfig) -> Enrollment {
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };
    Enrollment::new(db)
        .with_notifier(notifier)
        .with_exchange_rates(Arc::new(config.exchange_rates.clone()))
        .with_report_cache(Arc::new(InMemoryCache::new(config.report_cache_ttl)))
        .with_guard(IdempotencyGuard::new(config.attempt_stale_after))
        .with_base_currency(config.base_currency.clone())
}
