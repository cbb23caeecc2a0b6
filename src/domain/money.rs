use thiserror::Error;

/// Balances and prices are integer minor units; 1.00 is stored as 100.
pub type Cents = i64;

/// Render cents as a decimal amount with two fractional digits.
/// Example: 9800 -> "98.00", 150 -> "1.50", -5 -> "-0.05"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let magnitude = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, magnitude / 100, magnitude % 100)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("amount is empty")]
    Empty,

    #[error("invalid amount: {0}")]
    InvalidFormat(String),

    #[error("amount {0} has more than two decimal places")]
    TooPrecise(String),

    #[error("amount {0} is out of range")]
    OutOfRange(String),
}

/// Parse a non-negative decimal amount into cents.
/// Example: "2.5" -> 250, "100" -> 10000, ".75" -> 75
///
/// Prices and opening balances are never negative, and a third decimal
/// digit is rejected rather than silently truncated.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseCentsError::Empty);
    }

    let (units, fraction) = input.split_once('.').unwrap_or((input, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (units.is_empty() && fraction.is_empty()) || !all_digits(units) || !all_digits(fraction) {
        return Err(ParseCentsError::InvalidFormat(input.to_string()));
    }
    if fraction.len() > 2 {
        return Err(ParseCentsError::TooPrecise(input.to_string()));
    }

    let units: i64 = if units.is_empty() {
        0
    } else {
        units
            .parse()
            .map_err(|_| ParseCentsError::OutOfRange(input.to_string()))?
    };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().unwrap_or(0) * 10,
        _ => fraction.parse::<i64>().unwrap_or(0),
    };

    units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or_else(|| ParseCentsError::OutOfRange(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_two_decimals() {
        assert_eq!(format_cents(9800), "98.00");
        assert_eq!(format_cents(150), "1.50");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(7), "0.07");
        assert_eq!(format_cents(-250), "-2.50");
    }

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_cents("100"), Ok(10000));
        assert_eq!(parse_cents("2.5"), Ok(250));
        assert_eq!(parse_cents("1.50"), Ok(150));
        assert_eq!(parse_cents(".75"), Ok(75));
        assert_eq!(parse_cents("3."), Ok(300));
        assert_eq!(parse_cents(" 50 "), Ok(5000));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert_eq!(parse_cents(""), Err(ParseCentsError::Empty));
        assert!(matches!(parse_cents("."), Err(ParseCentsError::InvalidFormat(_))));
        assert!(matches!(parse_cents("-1"), Err(ParseCentsError::InvalidFormat(_))));
        assert!(matches!(parse_cents("1.2.3"), Err(ParseCentsError::InvalidFormat(_))));
        assert!(matches!(parse_cents("abc"), Err(ParseCentsError::InvalidFormat(_))));
        assert!(matches!(parse_cents("1.999"), Err(ParseCentsError::TooPrecise(_))));
        assert!(matches!(
            parse_cents("99999999999999999999"),
            Err(ParseCentsError::OutOfRange(_))
        ));
    }
}
