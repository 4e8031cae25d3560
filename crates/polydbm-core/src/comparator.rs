//! Key comparators for ordered backends.
//!
//! Numeric comparators read the leading numeric expression of each key as
//! text. Keys that compare equal numerically but differ in bytes are ordered
//! lexically, so distinct byte strings never collapse into one record.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Total order applied to record keys by ordered backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyComparator {
    /// Byte-wise lexical order
    #[default]
    Lexical,
    /// Lexical order ignoring ASCII case
    LexicalCase,
    /// Order of decimal integer expressions
    Decimal,
    /// Order of hexadecimal integer expressions
    Hexadecimal,
    /// Order of decimal real number expressions
    RealNumber,
}

impl KeyComparator {
    /// Returns the parameter name of the comparator.
    pub fn name(&self) -> &'static str {
        match self {
            KeyComparator::Lexical => "LexicalKeyComparator",
            KeyComparator::LexicalCase => "LexicalCaseKeyComparator",
            KeyComparator::Decimal => "DecimalKeyComparator",
            KeyComparator::Hexadecimal => "HexadecimalKeyComparator",
            KeyComparator::RealNumber => "RealNumberKeyComparator",
        }
    }

    /// Compares two keys.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let primary = match self {
            KeyComparator::Lexical => return a.cmp(b),
            KeyComparator::LexicalCase => a
                .iter()
                .map(u8::to_ascii_lowercase)
                .cmp(b.iter().map(u8::to_ascii_lowercase)),
            KeyComparator::Decimal => parse_decimal(a).cmp(&parse_decimal(b)),
            KeyComparator::Hexadecimal => parse_hexadecimal(a).cmp(&parse_hexadecimal(b)),
            KeyComparator::RealNumber => parse_real(a).total_cmp(&parse_real(b)),
        };
        primary.then_with(|| a.cmp(b))
    }
}

impl fmt::Display for KeyComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyComparator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LexicalKeyComparator" => Ok(KeyComparator::Lexical),
            "LexicalCaseKeyComparator" => Ok(KeyComparator::LexicalCase),
            "DecimalKeyComparator" => Ok(KeyComparator::Decimal),
            // the truncated spelling circulates in older documentation
            "HexadecimalKeyComparator" | "HexadecimalKeyComparato" => {
                Ok(KeyComparator::Hexadecimal)
            }
            "RealNumberKeyComparator" => Ok(KeyComparator::RealNumber),
            _ => Err(Error::InvalidArgument(format!(
                "unknown key comparator: {}",
                s
            ))),
        }
    }
}

fn skip_space(text: &[u8]) -> &[u8] {
    let start = text
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(text.len());
    &text[start..]
}

/// Reads a leading decimal integer, saturating on overflow.
pub fn parse_decimal(text: &[u8]) -> i64 {
    let text = skip_space(text);
    let (negative, digits) = match text.first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut value: i64 = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        let digit = i64::from(b - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

/// Reads a leading hexadecimal integer, with an optional `0x` prefix.
pub fn parse_hexadecimal(text: &[u8]) -> u64 {
    let text = skip_space(text);
    let digits = text
        .strip_prefix(b"0x")
        .or_else(|| text.strip_prefix(b"0X"))
        .unwrap_or(text);
    let mut value: u64 = 0;
    for &b in digits {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => break,
        };
        value = value.saturating_mul(16).saturating_add(u64::from(digit));
    }
    value
}

/// Reads a leading real number expression; text without one reads as zero.
pub fn parse_real(text: &[u8]) -> f64 {
    let text = skip_space(text);
    let mut end = 0;
    if matches!(text.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < text.len() && text[end].is_ascii_digit() {
        end += 1;
    }
    if end < text.len() && text[end] == b'.' {
        end += 1;
        while end < text.len() && text[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start {
        return 0.0;
    }
    if end < text.len() && (text[end] == b'e' || text[end] == b'E') {
        let mut exp_end = end + 1;
        if matches!(text.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < text.len() && text[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    std::str::from_utf8(&text[..end])
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(cmp: KeyComparator, keys: &[&str]) -> Vec<String> {
        let mut keys: Vec<&str> = keys.to_vec();
        keys.sort_by(|a, b| cmp.compare(a.as_bytes(), b.as_bytes()));
        keys.into_iter().map(String::from).collect()
    }

    #[test]
    fn test_lexical() {
        assert_eq!(
            sorted(KeyComparator::Lexical, &["b", "B", "a"]),
            vec!["B", "a", "b"]
        );
    }

    #[test]
    fn test_lexical_case() {
        assert_eq!(
            sorted(KeyComparator::LexicalCase, &["b", "C", "a"]),
            vec!["a", "b", "C"]
        );
        assert_ne!(
            KeyComparator::LexicalCase.compare(b"A", b"a"),
            Ordering::Equal
        );
    }

    #[test]
    fn test_decimal() {
        assert_eq!(
            sorted(KeyComparator::Decimal, &["10", "2", "30", "-5"]),
            vec!["-5", "2", "10", "30"]
        );
        assert_eq!(parse_decimal(b"  42abc"), 42);
        assert_eq!(parse_decimal(b"abc"), 0);
    }

    #[test]
    fn test_decimal_ties_are_lexical() {
        assert_eq!(KeyComparator::Decimal.compare(b"010", b"10"), Ordering::Less);
        assert_eq!(KeyComparator::Decimal.compare(b"10", b"10"), Ordering::Equal);
    }

    #[test]
    fn test_hexadecimal() {
        assert_eq!(
            sorted(KeyComparator::Hexadecimal, &["ff", "0x10", "a"]),
            vec!["a", "0x10", "ff"]
        );
    }

    #[test]
    fn test_real_number() {
        assert_eq!(
            sorted(KeyComparator::RealNumber, &["1.5", "-0.25", "1e1", "0.3"]),
            vec!["-0.25", "0.3", "1.5", "1e1"]
        );
        assert_eq!(parse_real(b"2.5e"), 2.5);
    }

    #[test]
    fn test_from_str() {
        for cmp in [
            KeyComparator::Lexical,
            KeyComparator::LexicalCase,
            KeyComparator::Decimal,
            KeyComparator::Hexadecimal,
            KeyComparator::RealNumber,
        ] {
            assert_eq!(cmp.name().parse::<KeyComparator>().unwrap(), cmp);
        }
        assert!("Bogus".parse::<KeyComparator>().is_err());
    }
}
