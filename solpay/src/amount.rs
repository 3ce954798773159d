//! Exact decimal ↔ base-unit conversion.
//!
//! All amount arithmetic goes through [`Decimal`] so that a request for
//! `0.01` SOL converts to exactly `10_000_000` lamports, never a float
//! approximation. Conversion rejects amounts whose precision exceeds the
//! unit's granularity instead of silently rounding.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::PaymentError;

/// Converts a host-supplied float into an exact decimal amount.
///
/// Uses the shortest decimal representation of the float, so `0.1` becomes
/// exactly `0.1` rather than the binary approximation's full expansion.
///
/// # Errors
///
/// Returns [`PaymentError::InvalidAmount`] for NaN, infinities, and
/// non-positive values.
pub fn from_f64(value: f64) -> Result<Decimal, PaymentError> {
    let amount = Decimal::from_f64(value)
        .ok_or_else(|| PaymentError::InvalidAmount(format!("{value} is not a finite number")))?;
    if amount <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!(
            "{value} is not a positive amount"
        )));
    }
    Ok(amount)
}

/// Converts a decimal amount to integer base units at the given precision.
///
/// The product `amount × 10^decimals` must be a whole number: `0.0000001`
/// USDC (6 decimals) is not representable and is rejected rather than
/// rounded.
///
/// # Errors
///
/// Returns [`PaymentError::InvalidAmount`] if the amount is non-positive,
/// fractional at base-unit granularity, or overflows `u64`.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<u64, PaymentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!(
            "{amount} is not a positive amount"
        )));
    }
    let scale = Decimal::from(10u64.pow(u32::from(decimals)));
    let scaled = amount
        .checked_mul(scale)
        .ok_or_else(|| PaymentError::InvalidAmount(format!("{amount} overflows at {decimals} decimals")))?;
    if !scaled.fract().is_zero() {
        return Err(PaymentError::InvalidAmount(format!(
            "{amount} has more than {decimals} decimal places"
        )));
    }
    scaled.to_u64().ok_or_else(|| {
        PaymentError::InvalidAmount(format!("{amount} exceeds the representable range"))
    })
}

/// Converts integer base units back to a decimal amount.
#[must_use]
pub fn from_base_units(units: u64, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(units), u32::from(decimals))
}

/// Renders an amount for a payment URI: truncated to at most nine
/// fractional digits, trailing zeros trimmed.
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    amount
        .round_dp_with_strategy(9, RoundingStrategy::ToZero)
        .normalize()
        .to_string()
}
