//! Decimal amounts as typed by users.
//!
//! The ledger counts base units; the CLI reads and prints amounts with
//! [`AMOUNT_DECIMALS`] fractional digits, so `1.5` is `150_000_000`.

use anyhow::{bail, Context, Result};

use shard_wallet::config::AMOUNT_DECIMALS;

fn scale() -> u64 {
    10u64.pow(AMOUNT_DECIMALS)
}

/// Parses `"12"`, `"12.5"` or `"0.00000001"` into base units.
pub fn parse_amount(s: &str) -> Result<u64> {
    let s = s.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        bail!("empty amount");
    }
    if frac.len() > AMOUNT_DECIMALS as usize {
        bail!("amount '{s}' has more than {AMOUNT_DECIMALS} decimal places");
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        bail!("amount '{s}' is not a decimal number");
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().with_context(|| format!("amount '{s}' is too large"))?
    };
    let padded = format!("{frac:0<width$}", width = AMOUNT_DECIMALS as usize);
    let frac: u64 = padded.parse().context("invalid fractional part")?;

    whole
        .checked_mul(scale())
        .and_then(|v| v.checked_add(frac))
        .with_context(|| format!("amount '{s}' is too large"))
}

/// Formats base units with trailing fractional zeros removed.
pub fn format_amount(value: u64) -> String {
    let whole = value / scale();
    let frac = value % scale();
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{frac:0width$}", width = AMOUNT_DECIMALS as usize);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_amount("1").unwrap(), 100_000_000);
        assert_eq!(parse_amount("1.5").unwrap(), 150_000_000);
        assert_eq!(parse_amount(".25").unwrap(), 25_000_000);
        assert_eq!(parse_amount("0.00000001").unwrap(), 1);
        assert_eq!(parse_amount("150").unwrap(), 15_000_000_000);
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", ".", "1.000000001", "-1", "1e5", "abc", "184467440738"] {
            assert!(parse_amount(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn formats_without_trailing_zeros() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(100_000_000), "1");
        assert_eq!(format_amount(150_000_000), "1.5");
        assert_eq!(format_amount(1), "0.00000001");
    }
}
