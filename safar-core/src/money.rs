//! Amounts are carried as integer minor units (halalas, fils, cents) next to an
//! ISO-4217 code. The gateway wire format is a two-decimal string.

use crate::{invalid, CoreResult};

pub fn validate_currency(code: &str) -> CoreResult<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(invalid(format!("'{}' is not an ISO-4217 currency code", code)))
    }
}

pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub fn parse_minor(value: &str) -> Option<i64> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // "1250.000" is fine, "10.005" is not representable
    if fraction.len() > 2 && fraction[2..].chars().any(|c| c != '0') {
        return None;
    }

    let mut cents = fraction.chars().take(2).collect::<String>();
    while cents.len() < 2 {
        cents.push('0');
    }

    let whole: i64 = whole.parse().ok()?;
    let cents: i64 = cents.parse().ok()?;
    let total = whole.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_two_decimals() {
        assert_eq!(format_minor(125_050), "1250.50");
        assert_eq!(format_minor(7), "0.07");
        assert_eq!(format_minor(-105), "-1.05");
    }

    #[test]
    fn parses_gateway_amounts() {
        assert_eq!(parse_minor("1250.50"), Some(125_050));
        assert_eq!(parse_minor("1250"), Some(125_000));
        assert_eq!(parse_minor("1250.5"), Some(125_050));
        assert_eq!(parse_minor("1250.000"), Some(125_000));
        assert_eq!(parse_minor("10.005"), None);
        assert_eq!(parse_minor("abc"), None);
        assert_eq!(parse_minor(".50"), None);
    }

    #[test]
    fn currency_codes() {
        assert!(validate_currency("SAR").is_ok());
        assert!(validate_currency("sar").is_err());
        assert!(validate_currency("SARS").is_err());
    }
}
