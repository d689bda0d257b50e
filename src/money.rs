//! Money Conversion Module
//!
//! Unified conversion between the internal scaled representation and the
//! client-facing string/Decimal representation. All conversions MUST go
//! through this module.
//!
//! ## Internal Representation
//! - All amounts are stored as `u64` micro-USDT (`i64` for signed ledger
//!   positions)
//! - The scale factor is `10^6`; the platform settles a single asset (USDT)
//! - PostgreSQL NUMERIC columns hold the scaled integer value

use rust_decimal::prelude::*;
use thiserror::Error;

/// Fractional digits carried by every monetary value in the system.
pub const USDT_DECIMALS: u32 = 6;

/// Scale factor for micro-USDT.
pub const USDT_SCALE: u64 = 1_000_000;

/// Money conversion errors
#[derive(Debug, Error)]
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

/// Convert a client amount string to internal micro-USDT.
///
/// Rejects zero, negatives, and anything with more than six fractional
/// digits. No silent truncation.
pub fn parse_amount(amount_str: &str) -> Result<u64, MoneyError> {
    let amount = parse_non_negative(amount_str)?;
    if amount == 0 {
        return Err(MoneyError::InvalidAmount);
    }
    Ok(amount)
}

/// Like [`parse_amount`] but zero is allowed (fees, thresholds).
pub fn parse_non_negative(amount_str: &str) -> Result<u64, MoneyError> {
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
            // Require both sides of the dot: ".5" and "5." are ambiguous
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

    if frac.len() > USDT_DECIMALS as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: USDT_DECIMALS,
        });
    }

    let whole_num: u64 = whole.parse::<u64>().map_err(|e| {
        let err_str = e.to_string();
        if err_str.contains("too large") || err_str.contains("overflow") {
            MoneyError::Overflow
        } else {
            MoneyError::InvalidFormat(format!("invalid character in whole part: {}", whole))
        }
    })?;

    let frac_num: u64 = if frac.is_empty() {
        0
    } else {
        let frac_padded = format!("{:0<width$}", frac, width = USDT_DECIMALS as usize);
        frac_padded[..USDT_DECIMALS as usize]
            .parse::<u64>()
            .map_err(|_| MoneyError::InvalidFormat("invalid fractional part".into()))?
    };

    whole_num
        .checked_mul(USDT_SCALE)
        .and_then(|v: u64| v.checked_add(frac_num))
        .ok_or(MoneyError::Overflow)
}

/// Convert a NUMERIC column value (the scaled integer) to micro-USDT.
///
/// Used at the database row boundary where sqlx decodes NUMERIC into
/// `rust_decimal::Decimal`.
pub fn from_db_decimal(decimal: Decimal) -> Result<u64, MoneyError> {
    if decimal.is_sign_negative() {
        return Err(MoneyError::InvalidAmount);
    }

    if !decimal.fract().is_zero() {
        return Err(MoneyError::InvalidFormat(format!(
            "scaled amount has fractional part: {}",
            decimal
        )));
    }

    decimal.trunc().to_u64().ok_or(MoneyError::Overflow)
}

/// Convert micro-USDT to the NUMERIC value stored in the database.
pub fn to_db_decimal(amount: u64) -> Decimal {
    Decimal::from(amount)
}

/// Render micro-USDT for clients: always six fractional digits.
pub fn format_amount(value: u64) -> String {
    let decimal_value = Decimal::from(value) / Decimal::from(USDT_SCALE);
    format!("{:.prec$}", decimal_value, prec = USDT_DECIMALS as usize)
}

/// Render a signed micro-USDT value (ledger positions, balance deltas).
pub fn format_amount_signed(value: i64) -> String {
    let formatted = format_amount(value.unsigned_abs());
    if value < 0 {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.0").unwrap(), 1_000_000);
        assert_eq!(parse_amount("0.5").unwrap(), 500_000);
        assert_eq!(parse_amount("100").unwrap(), 100_000_000);
        assert_eq!(parse_amount("0.000001").unwrap(), 1);
        assert_eq!(parse_amount("10").unwrap(), 10_000_000);
        assert_eq!(parse_amount("25.000000").unwrap(), 25_000_000);
    }

    #[test]
    fn test_parse_amount_rejects_invalid() {
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("0.0").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("   ").is_err());
        assert!(parse_amount("-1").is_err());
        assert!(parse_amount("+1").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("1.0.0").is_err());
        assert!(parse_amount(".5").is_err());
        assert!(parse_amount("5.").is_err());
        assert!(parse_amount("1e6").is_err());
    }

    #[test]
    fn test_parse_amount_precision_reject() {
        // Seven fractional digits must be rejected, not truncated
        assert!(matches!(
            parse_amount("1.0000001"),
            Err(MoneyError::PrecisionOverflow { provided: 7, max: 6 })
        ));
        assert_eq!(parse_amount("1.123456").unwrap(), 1_123_456);
    }

    #[test]
    fn test_parse_non_negative_allows_zero() {
        assert_eq!(parse_non_negative("0").unwrap(), 0);
        assert_eq!(parse_non_negative("0.000000").unwrap(), 0);
        assert_eq!(parse_non_negative("1.5").unwrap(), 1_500_000);
        assert!(parse_non_negative("-0.5").is_err());
    }

    #[test]
    fn test_parse_amount_overflow() {
        assert!(parse_amount("18446744073709551615").is_err());
        assert!(parse_amount("1000000000000").is_ok());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1_000_000), "1.000000");
        assert_eq!(format_amount(500_000), "0.500000");
        assert_eq!(format_amount(1), "0.000001");
        assert_eq!(format_amount(0), "0.000000");
        assert_eq!(format_amount(25_000_000), "25.000000");
    }

    #[test]
    fn test_format_amount_signed() {
        assert_eq!(format_amount_signed(-1_500_000), "-1.500000");
        assert_eq!(format_amount_signed(1_500_000), "1.500000");
        assert_eq!(format_amount_signed(0), "0.000000");
    }

    #[test]
    fn test_db_decimal_roundtrip() {
        let d = to_db_decimal(15_000_000);
        assert_eq!(from_db_decimal(d).unwrap(), 15_000_000);
    }

    #[test]
    fn test_from_db_decimal_rejects_fractional() {
        let d = Decimal::new(15, 1); // 1.5 - not a scaled integer
        assert!(from_db_decimal(d).is_err());
        assert!(from_db_decimal(Decimal::from(-5)).is_err());
    }
}
