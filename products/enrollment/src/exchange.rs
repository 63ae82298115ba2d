//! Single source of currency conversion for every money flow.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::{EnrollmentError, EnrollmentResult};
use crate::money;

pub trait ExchangeRates: Send + Sync {
    /// Units of `to` per one unit of `from`.
    fn rate(&self, from: &str, to: &str) -> EnrollmentResult<Decimal>;

    fn convert_cents(&self, cents: i64, from: &str, to: &str) -> EnrollmentResult<i64> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(cents);
        }
        let rate = self.rate(from, to)?;
        money::round_to_cents(money::from_cents(cents) * rate)
    }
}

/// Static rate table, typically loaded from configuration.
#[derive(Clone, Debug, Default)]
pub struct FixedRates {
    rates: HashMap<(String, String), Decimal>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: Decimal) -> Self {
        self.rates
            .insert((from.to_ascii_uppercase(), to.to_ascii_uppercase()), rate);
        self
    }

    /// Parse `EUR/INR=90.00,USD/INR=83.10`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut rates = Self::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (pair, value) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected FROM/TO=RATE, got {entry:?}"))?;
            let (from, to) = pair
                .split_once('/')
                .ok_or_else(|| format!("expected FROM/TO, got {pair:?}"))?;
            let from = money::normalize_currency(from).map_err(|e| e.to_string())?;
            let to = money::normalize_currency(to).map_err(|e| e.to_string())?;
            let rate: Decimal = value
                .trim()
                .parse()
                .map_err(|_| format!("invalid rate {value:?} for {pair}"))?;
            if rate <= Decimal::ZERO {
                return Err(format!("rate for {pair} must be positive"));
            }
            rates = rates.with_rate(&from, &to, rate);
        }
        Ok(rates)
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl ExchangeRates for FixedRates {
    fn rate(&self, from: &str, to: &str) -> EnrollmentResult<Decimal> {
        let from = from.to_ascii_uppercase();
        let to = to.to_ascii_uppercase();
        if from == to {
            return Ok(Decimal::ONE);
        }
        if let Some(rate) = self.rates.get(&(from.clone(), to.clone())) {
            return Ok(*rate);
        }
        if let Some(inverse) = self.rates.get(&(to.clone(), from.clone())) {
            return Ok((Decimal::ONE / *inverse).round_dp(10));
        }
        Err(EnrollmentError::validation(format!(
            "no exchange rate configured for {from}/{to}"
        )))
    }
}
