//! Exact money handling. Amounts travel as [`Decimal`] and are stored as
//! integer minor units; nothing here touches floating point.

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use crate::error::{EnrollmentError, EnrollmentResult};

/// Largest single amount accepted from a client.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

const MINOR_UNITS: Decimal = Decimal::ONE_HUNDRED;

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Render minor units as a two-place decimal string, e.g. `500.00`.
pub fn format_cents(cents: i64) -> String {
    from_cents(cents).to_string()
}

/// Convert an amount to minor units, rejecting sub-cent precision.
pub fn to_cents(amount: Decimal) -> EnrollmentResult<i64> {
    if amount.normalize().scale() > 2 {
        return Err(EnrollmentError::validation(
            "amounts may have at most two decimal places",
        ));
    }
    (amount * MINOR_UNITS)
        .to_i64()
        .ok_or_else(|| EnrollmentError::validation("amount out of range"))
}

/// Round to two places using banker's rounding, then convert to minor units.
pub fn round_to_cents(amount: Decimal) -> EnrollmentResult<i64> {
    to_cents(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
}

/// Validate a client-supplied amount: strictly positive, within
/// [`MAX_AMOUNT`], at most two decimal places.
pub fn validate_amount(field: &str, amount: Decimal) -> EnrollmentResult<i64> {
    if amount <= Decimal::ZERO {
        return Err(EnrollmentError::validation(format!(
            "{field} must be greater than zero"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(EnrollmentError::validation(format!(
            "{field} must not exceed {MAX_AMOUNT}"
        )));
    }
    to_cents(amount)
}

/// Normalise an ISO-4217 style currency code.
pub fn normalize_currency(raw: &str) -> EnrollmentResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(EnrollmentError::validation(format!(
            "invalid currency code {raw:?}"
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn cents_round_trip_is_exact() {
        assert_eq!(to_cents(dec("499.99")).unwrap(), 49_999);
        assert_eq!(format_cents(49_999), "499.99");
        assert_eq!(format_cents(50_000), "500.00");
        assert_eq!(to_cents(dec("0.10")).unwrap() + to_cents(dec("0.20")).unwrap(), 30);
    }

    #[test]
    fn sub_cent_amounts_are_rejected() {
        assert!(matches!(
            to_cents(dec("1.005")),
            Err(EnrollmentError::Validation(_))
        ));
        // Trailing zeros beyond two places are still whole cents.
        assert_eq!(to_cents(dec("1.2500")).unwrap(), 125);
    }

    #[test]
    fn validate_amount_enforces_bounds() {
        assert!(validate_amount("paidAmount", Decimal::ZERO).is_err());
        assert!(validate_amount("paidAmount", dec("-5")).is_err());
        assert!(validate_amount("paidAmount", dec("100000.01")).is_err());
        assert_eq!(validate_amount("paidAmount", dec("100000")).unwrap(), 10_000_000);
    }

    #[test]
    fn rounding_is_half_even() {
        assert_eq!(round_to_cents(dec("0.125")).unwrap(), 12);
        assert_eq!(round_to_cents(dec("0.135")).unwrap(), 14);
    }

    #[test]
    fn currency_codes_are_normalised() {
        assert_eq!(normalize_currency(" eur ").unwrap(), "EUR");
        assert!(normalize_currency("EURO").is_err());
        assert!(normalize_currency("E1R").is_err());
    }
}
