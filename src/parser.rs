//! Numeric extraction from raw balance output lines.
//!
//! A Sartorius balance streams free-form status lines; the only significant
//! content is the first signed decimal number on each line (the mass).
//! Everything else on the line (units, stability flags, padding) is ignored.

use once_cell::sync::Lazy;
use regex::Regex;

/// First signed decimal with at least one digit on each side of the point.
#[allow(clippy::expect_used)]
static VALUE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+\.\d+").expect("value pattern is valid"));

/// Extract the first decimal value from a line of device output.
///
/// Returns `None` when the line carries no well-formed decimal number.
/// Pure; the sole parsing contract for the device's text protocol.
pub fn extract_value(line: &str) -> Option<f64> {
    VALUE_PATTERN
        .find(line)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_value_among_noise() {
        assert_eq!(extract_value("status=OK -3.25 g net"), Some(-3.25));
        assert_eq!(extract_value("N    +   12.3456 g"), Some(12.3456));
    }

    #[test]
    fn returns_none_without_a_decimal() {
        assert_eq!(extract_value("no numbers here"), None);
        assert_eq!(extract_value(""), None);
        // Integers alone do not match; a decimal point is required.
        assert_eq!(extract_value("count 42 items"), None);
    }

    #[test]
    fn first_match_wins() {
        assert_eq!(extract_value("a=1.5 b=2.5"), Some(1.5));
        assert_eq!(extract_value("-1.0 then 2.0"), Some(-1.0));
    }

    #[test]
    fn requires_digits_on_both_sides() {
        assert_eq!(extract_value("x = .5"), None);
        assert_eq!(extract_value("y = 5."), None);
        // "1.5" inside "21.5g" still matches as 21.5.
        assert_eq!(extract_value("21.5g"), Some(21.5));
    }
}
