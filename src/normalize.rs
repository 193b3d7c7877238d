use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriceParseError {
    #[error("no digits in price text `{0}`")]
    Empty(String),
    #[error("ambiguous separators in price text `{0}`")]
    Ambiguous(String),
    #[error("unparseable price text `{0}`")]
    Invalid(String),
}

/// Parses locale-ambiguous price text into a canonical decimal value.
///
/// Marketplaces render the same amount as `1 234,56 ₽`, `1,234.56`, or a
/// plain integer, so the rules are explicit rather than heuristic:
/// - everything except digits, `,` and `.` is stripped; spaces (including
///   non-breaking variants) are always thousands separators;
/// - with both `,` and `.` present, the rightmost one is the decimal
///   separator and must occur exactly once; the other's groups must be
///   three digits;
/// - a single separator occurring more than once is a thousands separator
///   with strict three-digit grouping;
/// - a single occurrence followed by exactly three digits is a thousands
///   separator, any other count makes it the decimal separator.
///
/// Anything outside these rules fails instead of returning a wrong number.
pub fn normalize_price(raw: &str) -> Result<Decimal, PriceParseError> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == ',' || *ch == '.')
        .collect();

    if !cleaned.chars().any(|ch| ch.is_ascii_digit()) {
        return Err(PriceParseError::Empty(raw.trim().to_string()));
    }

    let has_comma = cleaned.contains(',');
    let has_dot = cleaned.contains('.');

    let canonical = match (has_comma, has_dot) {
        (false, false) => cleaned,
        (true, true) => {
            let last_comma = cleaned.rfind(',').unwrap_or(0);
            let last_dot = cleaned.rfind('.').unwrap_or(0);
            let (decimal_sep, thousands_sep) = if last_comma > last_dot {
                (',', '.')
            } else {
                ('.', ',')
            };
            split_mixed(&cleaned, decimal_sep, thousands_sep)
                .ok_or_else(|| PriceParseError::Ambiguous(raw.trim().to_string()))?
        }
        (true, false) => resolve_single(&cleaned, ',')
            .ok_or_else(|| PriceParseError::Ambiguous(raw.trim().to_string()))?,
        (false, true) => resolve_single(&cleaned, '.')
            .ok_or_else(|| PriceParseError::Ambiguous(raw.trim().to_string()))?,
    };

    canonical
        .parse::<Decimal>()
        .map_err(|_| PriceParseError::Invalid(raw.trim().to_string()))
}

/// Both separator kinds present: `decimal_sep` is rightmost and unique,
/// `thousands_sep` groups the integer part.
fn split_mixed(cleaned: &str, decimal_sep: char, thousands_sep: char) -> Option<String> {
    if cleaned.matches(decimal_sep).count() != 1 {
        return None;
    }
    let (integer, fraction) = cleaned.split_once(decimal_sep)?;
    if fraction.is_empty() || fraction.contains(thousands_sep) {
        return None;
    }
    let integer = ungroup(integer, thousands_sep)?;
    Some(format!("{integer}.{fraction}"))
}

/// Only one separator kind present; decide decimal vs thousands.
fn resolve_single(cleaned: &str, sep: char) -> Option<String> {
    if cleaned.matches(sep).count() > 1 {
        return ungroup(cleaned, sep);
    }
    let (head, tail) = cleaned.split_once(sep)?;
    if head.is_empty() || tail.is_empty() {
        return None;
    }
    if tail.len() == 3 {
        // `1,234` reads as grouped thousands.
        Some(format!("{head}{tail}"))
    } else {
        // `12,3` and `1234,56` can only be decimals.
        Some(format!("{head}.{tail}"))
    }
}

/// Removes thousands separators, enforcing 3-digit grouping after the
/// first group so `12.34.56` fails rather than collapsing to `123456`.
fn ungroup(integer: &str, sep: char) -> Option<String> {
    let mut groups = integer.split(sep);
    let first = groups.next()?;
    if first.is_empty() || first.len() > 3 {
        return None;
    }
    let mut digits = String::from(first);
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        digits.push_str(group);
    }
    Some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    #[test]
    fn space_grouped_comma_decimal() {
        assert_eq!(normalize_price("1 234,56").unwrap(), dec("1234.56"));
    }

    #[test]
    fn comma_grouped_dot_decimal() {
        assert_eq!(normalize_price("1,234.56").unwrap(), dec("1234.56"));
    }

    #[test]
    fn plain_integer() {
        assert_eq!(normalize_price("1234").unwrap(), dec("1234"));
    }

    #[test]
    fn short_fraction_is_decimal() {
        assert_eq!(normalize_price("12,3").unwrap(), dec("12.3"));
    }

    #[test]
    fn repeated_separator_with_bad_grouping_fails() {
        assert!(matches!(
            normalize_price("12.34.56"),
            Err(PriceParseError::Ambiguous(_))
        ));
    }

    #[test]
    fn currency_symbols_are_stripped() {
        assert_eq!(normalize_price("12\u{a0}500 ₽").unwrap(), dec("12500"));
        assert_eq!(normalize_price("$1,299.99").unwrap(), dec("1299.99"));
    }

    #[test]
    fn dotted_thousands_with_comma_decimal() {
        assert_eq!(normalize_price("1.234.567,89").unwrap(), dec("1234567.89"));
    }

    #[test]
    fn single_separator_three_digit_tail_is_thousands() {
        assert_eq!(normalize_price("1,234").unwrap(), dec("1234"));
        assert_eq!(normalize_price("1.234").unwrap(), dec("1234"));
    }

    #[test]
    fn two_digit_tail_is_decimal() {
        assert_eq!(normalize_price("12,34").unwrap(), dec("12.34"));
    }

    #[test]
    fn garbage_fails() {
        assert!(matches!(
            normalize_price("по запросу"),
            Err(PriceParseError::Empty(_))
        ));
        assert!(matches!(
            normalize_price("12,"),
            Err(PriceParseError::Ambiguous(_))
        ));
        assert!(matches!(normalize_price(""), Err(PriceParseError::Empty(_))));
    }

    #[test]
    fn mixed_separators_with_bad_grouping_fail() {
        assert!(normalize_price("12,34.56").is_err());
        assert!(normalize_price("1,2345.67").is_err());
    }
}
