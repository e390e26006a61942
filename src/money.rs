//! Money Conversion Module
//!
//! Every amount that crosses the saga boundary goes through here:
//!
//! - Display amounts (`"100"`, `"12.5"`) arrive on the inbound event and are
//!   persisted verbatim.
//! - Vault withdrawals, swap signatures and the deposit-back transfer need
//!   the amount in base units (`amount * 10^decimals`). ICY has 18 decimals,
//!   which overflows `u64`, so scaling is done on strings + `BigUint`.
//! - Satoshi figures come from `rust_decimal` arithmetic, never `f64`.
//!
//! ## Usage
//! ```rust
//! use icy_swap::money::{to_base_units, satoshi_for};
//! use rust_decimal::Decimal;
//! use std::str::FromStr;
//!
//! assert_eq!(to_base_units("1.5", 18).unwrap(), "1500000000000000000");
//! let sat = satoshi_for("100", Decimal::from_str("12.5").unwrap()).unwrap();
//! assert_eq!(sat.to_string(), "1250");
//! ```

use num_bigint::BigUint;
use rust_decimal::prelude::*;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: Display string -> Decimal / base units
// ============================================================================

/// Split a display amount into whole and fractional digit strings.
///
/// Strict: rejects signs, empty parts (`".5"`, `"5."`), multiple dots and
/// non-digit characters.
fn split_amount(amount_str: &str) -> Result<(&str, &str), MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let parts: Vec<&str> = amount_str.split('.').collect();
    let (whole, frac) = match parts.len() {
        1 => (parts[0], ""),
        2 => {
            if parts[0].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if parts[1].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            (parts[0], parts[1])
        }
        _ => return Err(MoneyError::InvalidFormat("multiple decimal points".into())),
    };

    if !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in whole part: {}",
            whole
        )));
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in fractional part: {}",
            frac
        )));
    }

    Ok((whole, frac))
}

/// Parse a display amount into a positive `Decimal`.
pub fn parse_display(amount_str: &str) -> Result<Decimal, MoneyError> {
    split_amount(amount_str)?;
    let value = Decimal::from_str(amount_str.trim()).map_err(|e| match e {
        rust_decimal::Error::ExceedsMaximumPossibleValue => MoneyError::Overflow,
        other => MoneyError::InvalidFormat(other.to_string()),
    })?;

    if value.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }
    Ok(value)
}

/// Convert a display amount to its base-unit integer string.
///
/// `"1.5"` with 18 decimals becomes `"1500000000000000000"`. Fractions
/// longer than `decimals` are rejected rather than truncated.
pub fn to_base_units(amount_str: &str, decimals: u32) -> Result<String, MoneyError> {
    let (whole, frac) = split_amount(amount_str)?;

    if frac.len() > decimals as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: decimals,
        });
    }

    let frac_padded = format!("{:0<width$}", frac, width = decimals as usize);
    let digits = format!("{}{}", whole, frac_padded);

    let value = BigUint::parse_bytes(digits.as_bytes(), 10)
        .ok_or_else(|| MoneyError::InvalidFormat(format!("not a number: {}", amount_str)))?;

    if value == BigUint::ZERO {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(value.to_str_radix(10))
}

// ============================================================================
// Satoshi math
// ============================================================================

/// Satoshi owed for `icy_amount` at `icy_satoshi_rate` satoshi per ICY,
/// rounded half away from zero to a whole satoshi.
pub fn satoshi_for(icy_amount: &str, icy_satoshi_rate: Decimal) -> Result<Decimal, MoneyError> {
    let icy = parse_display(icy_amount)?;
    let raw = icy.checked_mul(icy_satoshi_rate).ok_or(MoneyError::Overflow)?;
    Ok(raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
}

/// Satoshi actually delivered to the user after the service fee.
///
/// Both inputs are decimal strings reported by external services. An input
/// that does not parse counts as zero and is logged; the swap already
/// happened, so this value is best-effort display data only.
pub fn delivered_satoshi(btc_amount: &str, min_satoshi_fee: &str) -> String {
    let parse_or_zero = |label: &str, raw: &str| -> Decimal {
        match Decimal::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(field = label, value = raw, error = %e, "Unparsable satoshi amount, using 0");
                Decimal::ZERO
            }
        }
    };

    let btc = parse_or_zero("btc_amount", btc_amount);
    let fee = parse_or_zero("min_satoshi_fee", min_satoshi_fee);
    let delivered = (btc - fee).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.0}", delivered)
}

/// Shorten a hash for display: `0x7dff46370e9ea5f0bad3c4e29711ad50062ea7a4`
/// becomes `0x7df..ea7a4`. Short or already shortened input is unchanged.
pub fn shorten(s: &str) -> String {
    if s.len() < 12 || s.contains("..") || !s.is_ascii() {
        return s.to_string();
    }
    format!("{}..{}", &s[..5], &s[s.len() - 5..])
}
