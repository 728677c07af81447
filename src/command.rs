//! Speed command parsing for MQTT payloads.
//!
//! A single payload grammar is shared by every remote source. Rules are
//! tried in order on the trimmed payload:
//!
//! 1. `RAW:<int>` (prefix case-insensitive): raw duty, clamped to
//!    `[0, DUTY_MAX]` and converted to percent.
//! 2. `{ ... }`: flat scan for a `speed` key (or `percent` if there is no
//!    `speed`), then the number after the next `:`. Digits and `.` only,
//!    rounded to the nearest integer.
//! 3. Bare integer: `<= 100` is a percent, `> 100` is a raw duty.
//! 4. Anything else is rejected.
//!
//! The scanner is deliberately not a JSON parser; it only looks at one key.
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::command::parse_speed_command;
//! use rs_fanctl::duty::DutyScale;
//!
//! let scale = DutyScale::default();
//! assert_eq!(parse_speed_command("RAW:511", &scale), Some(50));
//! assert_eq!(parse_speed_command(r#"{"speed": 42}"#, &scale), Some(42));
//! assert_eq!(parse_speed_command("150", &scale), Some(15));
//! assert_eq!(parse_speed_command("not a number", &scale), None);
//! ```

use crate::duty::DutyScale;

const RAW_PREFIX: &str = "raw:";

/// Decode a speed command into a percent in `[0, 100]`.
///
/// Returns `None` for payloads that match no rule; callers drop those.
pub fn parse_speed_command(text: &str, scale: &DutyScale) -> Option<u8> {
    let s = text.trim();

    if let Some(prefix) = s.get(..RAW_PREFIX.len()) {
        if prefix.eq_ignore_ascii_case(RAW_PREFIX) {
            let raw = parse_strict_int(&s[RAW_PREFIX.len()..])?;
            return Some(raw_duty_to_percent(raw, scale));
        }
    }

    if s.starts_with('{') && s.ends_with('}') {
        let value = scan_json_number(s)?;
        return Some(value.clamp(0, 100) as u8);
    }

    let value = parse_strict_int(s)?;
    if value <= 100 {
        Some(value.clamp(0, 100) as u8)
    } else {
        Some(raw_duty_to_percent(value, scale))
    }
}

fn raw_duty_to_percent(raw: i64, scale: &DutyScale) -> u8 {
    scale.duty_to_percent(scale.clamp_duty(raw))
}

/// Whole-string integer with optional leading whitespace and sign.
///
/// Out-of-range values saturate like C `strtol`.
fn parse_strict_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let saturated = if s.starts_with('-') { i64::MIN } else { i64::MAX };
    Some(s.parse::<i64>().unwrap_or(saturated))
}

/// Find the value of `speed` (or `percent`) in a flat object.
fn scan_json_number(s: &str) -> Option<i32> {
    let key = s.find("speed").or_else(|| s.find("percent"))?;
    let colon = key + s[key..].find(':')?;

    let rest = s[colon + 1..].trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let token = &rest[..end];
    if token.is_empty() {
        return None;
    }

    let value: f32 = token.parse().ok()?;
    // Token has no sign, so adding one half then truncating rounds to nearest.
    Some((value + 0.5) as i32)
}

/// Leading-integer parse in the style of C `atoi`.
///
/// Skips leading whitespace, accepts an optional sign, and reads digits up to
/// the first non-digit. Returns 0 when there are no digits. Used for HTTP and
/// portal fields, which are coerced rather than rejected.
///
/// ```
/// use rs_fanctl::command::parse_leading_int;
///
/// assert_eq!(parse_leading_int(" 42abc"), 42);
/// assert_eq!(parse_leading_int("-7"), -7);
/// assert_eq!(parse_leading_int("abc"), 0);
/// ```
pub fn parse_leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = (value * 10 + (b - b'0') as i64).min(i32::MAX as i64 + 1);
    }
    let value = if negative { -value } else { value };
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Option<u8> {
        parse_speed_command(s, &DutyScale::default())
    }

    // =========================================================================
    // RAW:<int>
    // =========================================================================

    #[test]
    fn raw_half_scale() {
        assert_eq!(parse("RAW:511"), Some(50));
    }

    #[test]
    fn raw_prefix_case_insensitive() {
        assert_eq!(parse("raw:1023"), Some(100));
        assert_eq!(parse("Raw:0"), Some(0));
    }

    #[test]
    fn raw_clamps_to_duty_range() {
        assert_eq!(parse("RAW:5000"), Some(100));
        assert_eq!(parse("RAW:-5"), Some(0));
    }

    #[test]
    fn raw_rejects_garbage() {
        assert_eq!(parse("RAW:abc"), None);
        assert_eq!(parse("RAW:"), None);
        assert_eq!(parse("RAW:12x"), None);
    }

    // =========================================================================
    // JSON key scan
    // =========================================================================

    #[test]
    fn json_speed() {
        assert_eq!(parse(r#"{"speed": 42}"#), Some(42));
        assert_eq!(parse(r#"{"speed":7}"#), Some(7));
    }

    #[test]
    fn json_percent_key() {
        assert_eq!(parse(r#"{"percent": 60}"#), Some(60));
    }

    #[test]
    fn json_speed_preferred_over_percent() {
        assert_eq!(parse(r#"{"percent": 10, "speed": 80}"#), Some(80));
    }

    #[test]
    fn json_fraction_rounds() {
        assert_eq!(parse(r#"{"speed": 42.5}"#), Some(43));
        assert_eq!(parse(r#"{"speed": 42.4}"#), Some(42));
    }

    #[test]
    fn json_clamps_above_hundred() {
        assert_eq!(parse(r#"{"speed": 250}"#), Some(100));
    }

    #[test]
    fn json_missing_number_fails() {
        assert_eq!(parse(r#"{"speed": }"#), None);
        assert_eq!(parse(r#"{"speed": "fast"}"#), None);
        assert_eq!(parse(r#"{"speed" 50}"#), None);
    }

    #[test]
    fn json_without_known_key_fails() {
        assert_eq!(parse(r#"{"rpm": 1200}"#), None);
    }

    #[test]
    fn json_needs_closing_brace() {
        assert_eq!(parse(r#"{"speed": 42"#), None);
    }

    #[test]
    fn json_negative_sign_not_part_of_token() {
        assert_eq!(parse(r#"{"speed": -40}"#), None);
    }

    // =========================================================================
    // Bare integer
    // =========================================================================

    #[test]
    fn bare_percent() {
        assert_eq!(parse("0"), Some(0));
        assert_eq!(parse("75"), Some(75));
        assert_eq!(parse("100"), Some(100));
    }

    #[test]
    fn bare_above_hundred_is_raw_duty() {
        assert_eq!(parse("150"), Some(15));
        assert_eq!(parse("1023"), Some(100));
        assert_eq!(parse("4096"), Some(100));
    }

    #[test]
    fn oversized_integers_saturate() {
        assert_eq!(parse("RAW:99999999999999999999"), Some(100));
        assert_eq!(parse("RAW:-99999999999999999999"), Some(0));
        assert_eq!(parse("99999999999999999999"), Some(100));
        assert_eq!(parse("RAW:+-5"), None);
    }

    #[test]
    fn bare_negative_clamps_to_zero() {
        assert_eq!(parse("-20"), Some(0));
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        assert_eq!(parse("  33 \n"), Some(33));
        assert_eq!(parse("\tRAW:511 "), Some(50));
    }

    #[test]
    fn rejects_text() {
        assert_eq!(parse("not a number"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("50%"), None);
        assert_eq!(parse("on"), None);
    }

    // =========================================================================
    // parse_leading_int
    // =========================================================================

    #[test]
    fn leading_int_forms() {
        assert_eq!(parse_leading_int("1883"), 1883);
        assert_eq!(parse_leading_int("  8883 "), 8883);
        assert_eq!(parse_leading_int("+12"), 12);
        assert_eq!(parse_leading_int(""), 0);
        assert_eq!(parse_leading_int("-"), 0);
    }

    #[test]
    fn leading_int_saturates() {
        assert_eq!(parse_leading_int("99999999999999"), i32::MAX);
        assert_eq!(parse_leading_int("-99999999999999"), i32::MIN);
    }
}
