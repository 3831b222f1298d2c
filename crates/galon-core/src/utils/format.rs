use chrono::{DateTime, NaiveDate};

/// Number of digits in a full Indonesian mobile number (e.g. 0812 3456 7890)
const PHONE_DIGITS: usize = 12;

/// Group the first run of twelve consecutive digits as `XXXX-XXXX-XXXX`.
/// Anything else in the string is kept as-is.
pub fn format_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let start = chars
        .windows(PHONE_DIGITS)
        .position(|w| w.iter().all(char::is_ascii_digit));

    match start {
        Some(i) => {
            let digits: String = chars[i..i + PHONE_DIGITS].iter().collect();
            let before: String = chars[..i].iter().collect();
            let after: String = chars[i + PHONE_DIGITS..].iter().collect();
            format!(
                "{}{}-{}-{}{}",
                before,
                &digits[0..4],
                &digits[4..8],
                &digits[8..12],
                after
            )
        }
        None => phone.to_string(),
    }
}

/// Parse a date from either `YYYY-MM-DD` (optionally followed by a time)
/// or a full RFC 3339 timestamp.
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.date_naive());
    }
    date.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Format a date the way Indonesian locales print it: `d/m/yyyy`.
/// Unparseable input is returned unchanged.
pub fn format_date(date: &str) -> String {
    use chrono::Datelike;

    match parse_date(date) {
        Some(d) => format!("{}/{}/{}", d.day(), d.month(), d.year()),
        None => date.to_string(),
    }
}

/// Length of the leading run of `s` made of sign, digit, and (optionally) float characters.
fn numeric_prefix_len(s: &str, float: bool) -> usize {
    s.char_indices()
        .take_while(|&(i, c)| {
            c.is_ascii_digit()
                || (matches!(c, '+' | '-') && (i == 0 || float))
                || (float && matches!(c, '.' | 'e' | 'E'))
        })
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0)
}

/// Parse the integer at the start of `value`, ignoring anything after it
/// ("12abc" is 12). Leading whitespace is skipped.
pub fn parse_leading_int(value: &str) -> Option<i64> {
    let s = value.trim_start();
    s[..numeric_prefix_len(s, false)].parse().ok()
}

/// Parse the longest number at the start of `value` ("-6.4km" is -6.4).
pub fn parse_leading_float(value: &str) -> Option<f64> {
    let s = value.trim_start();
    (1..=numeric_prefix_len(s, true))
        .rev()
        .find_map(|end| s[..end].parse().ok())
}

/// Case-insensitive substring test
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
