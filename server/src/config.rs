use std::time::Duration as StdDuration;

use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Duration;
use platform_authn::AuthConfig;
use products_enrollment::{FixedRates, money};

const MIN_SECRET_BYTES: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub cors_allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub base_currency: String,
    pub exchange_rates: FixedRates,
    pub notify_webhook_url: Option<String>,
    pub attempt_stale_after: Duration,
    pub report_cache_ttl: Duration,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = lookup("AUTH_SECRET_BASE64").context("AUTH_SECRET_BASE64 missing")?;
        let secret_bytes = STANDARD
            .decode(secret.trim())
            .context("invalid AUTH_SECRET_BASE64")?;
        if secret_bytes.len() < MIN_SECRET_BYTES {
            return Err(anyhow!(
                "AUTH_SECRET_BASE64 must decode to at least {MIN_SECRET_BYTES} bytes"
            ));
        }
        let token_ttl_minutes = parse_or(&lookup, "TOKEN_TTL_MINUTES", 12 * 60_i64)?;

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        let rate_limit_per_minute = parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", 60_u32)?;
        if rate_limit_per_minute == 0 {
            return Err(anyhow!("RATE_LIMIT_PER_MINUTE must be positive"));
        }

        let base_currency = money::normalize_currency(
            &lookup("BASE_CURRENCY").unwrap_or_else(|| "EUR".into()),
        )
        .map_err(|err| anyhow!("BASE_CURRENCY: {err}"))?;
        let exchange_rates = FixedRates::parse(&lookup("EXCHANGE_RATES").unwrap_or_default())
            .map_err(|err| anyhow!("EXCHANGE_RATES: {err}"))?;

        let notify_webhook_url = lookup("NOTIFY_WEBHOOK_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let attempt_stale_after =
            Duration::minutes(parse_or(&lookup, "ATTEMPT_STALE_MINUTES", 15_i64)?);
        let report_cache_ttl = Duration::from_std(StdDuration::from_secs(parse_or(
            &lookup,
            "REPORT_CACHE_TTL_SECONDS",
            300_u64,
        )?))
        .context("REPORT_CACHE_TTL_SECONDS out of range")?;

        Ok(Self {
            auth: AuthConfig::new(secret_bytes, token_ttl_minutes),
            cors_allowed_origins,
            rate_limit_per_minute,
            base_currency,
            exchange_rates,
            notify_webhook_url,
            attempt_stale_after,
            report_cache_ttl,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{key} has an invalid value {raw:?}")),
        _ => Ok(default),
    }
}
