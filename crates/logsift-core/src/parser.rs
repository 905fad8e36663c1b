//! Byte-level parser for one log record.
//!
//! Line shape: `<timestamp> <level> <message>`, where `<message>` may carry a
//! `latency_ms=<digits>` annotation anywhere. Parsing never allocates; the
//! returned view borrows the input line. A line is malformed only when
//! tokenization fails or the timestamp is invalid — an unrecognized level or
//! a missing/garbled latency annotation never rejects the line.
//!
//! Timestamps are strict ISO-8601: `YYYY-MM-DD`, a literal `T`, `HH:MM:SS`,
//! an optional fraction `.d+` (truncated to milliseconds), and a zone of
//! either `Z` or `±HH:MM`, with no trailing characters. The result is
//! normalized to UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::types::LogLevel;

const LATENCY_NEEDLE: &[u8] = b"latency_ms=";

/// Stack-only view over one parsed log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// First whitespace-delimited token of the message segment; empty when
    /// the line has no message.
    pub message_key: &'a [u8],
    pub latency_ms: Option<i32>,
}

/// Parses one line. Returns `None` only when tokenization fails or the
/// timestamp is invalid.
#[must_use]
pub fn parse_line(line: &[u8]) -> Option<ParsedLine<'_>> {
    let (ts_token, rest) = split_token(line);
    let timestamp = parse_timestamp(ts_token)?;
    let (level_token, message) = split_token(rest);
    let level = LogLevel::from_token(level_token);
    let (message_key, _) = split_token(message);
    let latency_ms = parse_latency(message);
    Some(ParsedLine {
        timestamp,
        level,
        message_key,
        latency_ms,
    })
}

/// Splits off the first ASCII-whitespace-delimited token, returning it and
/// the remainder with leading whitespace skipped.
fn split_token(bytes: &[u8]) -> (&[u8], &[u8]) {
    let end = bytes
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let (token, tail) = bytes.split_at(end);
    let skip = tail
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(tail.len());
    (token, &tail[skip..])
}

fn parse_timestamp(b: &[u8]) -> Option<DateTime<Utc>> {
    // Shortest accepted form: "YYYY-MM-DDTHH:MM:SSZ" (20 bytes).
    if b.len() < 20 {
        return None;
    }
    let year = num4(b, 0)?;
    expect(b, 4, b'-')?;
    let month = num2(b, 5)?;
    expect(b, 7, b'-')?;
    let day = num2(b, 8)?;
    expect(b, 10, b'T')?;
    let hour = num2(b, 11)?;
    expect(b, 13, b':')?;
    let minute = num2(b, 14)?;
    expect(b, 16, b':')?;
    let second = num2(b, 17)?;

    let mut pos = 19;
    let mut millis = 0_u32;
    if b.get(pos) == Some(&b'.') {
        pos += 1;
        let frac_start = pos;
        while pos < b.len() && b[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == frac_start {
            return None;
        }
        // Truncate to milliseconds: ".1" is 100ms, ".1234" is 123ms.
        let mut scale = 100;
        for &digit in &b[frac_start..(frac_start + 3).min(pos)] {
            millis += u32::from(digit - b'0') * scale;
            scale /= 10;
        }
    }

    let offset_secs = match *b.get(pos)? {
        b'Z' => {
            pos += 1;
            0
        }
        sign @ (b'+' | b'-') => {
            pos += 1;
            let zone_hours = num2(b, pos)?;
            pos += 2;
            expect(b, pos, b':')?;
            pos += 1;
            let zone_minutes = num2(b, pos)?;
            pos += 2;
            let magnitude = i32::try_from(zone_hours * 3600 + zone_minutes * 60).ok()?;
            if sign == b'+' { magnitude } else { -magnitude }
        }
        _ => return None,
    };
    if pos != b.len() {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
    let naive = date.and_hms_milli_opt(hour, minute, second, millis)?;
    let offset = FixedOffset::east_opt(offset_secs)?;
    let local = offset.from_local_datetime(&naive).single()?;
    Some(local.with_timezone(&Utc))
}

/// First `latency_ms=` occurrence followed by at least one decimal digit.
/// Values beyond `i32::MAX` saturate.
fn parse_latency(message: &[u8]) -> Option<i32> {
    let mut base = 0;
    while let Some(pos) = find_subslice(&message[base..], LATENCY_NEEDLE) {
        let digits_start = base + pos + LATENCY_NEEDLE.len();
        let mut end = digits_start;
        while end < message.len() && message[end].is_ascii_digit() {
            end += 1;
        }
        if end > digits_start {
            let mut value = 0_i64;
            for &digit in &message[digits_start..end] {
                value = value
                    .saturating_mul(10)
                    .saturating_add(i64::from(digit - b'0'));
            }
            return Some(i32::try_from(value).unwrap_or(i32::MAX));
        }
        base += pos + 1;
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn expect(b: &[u8], index: usize, expected: u8) -> Option<()> {
    (b.get(index) == Some(&expected)).then_some(())
}

fn num2(b: &[u8], index: usize) -> Option<u32> {
    let d0 = digit(b, index)?;
    let d1 = digit(b, index + 1)?;
    Some(d0 * 10 + d1)
}

fn num4(b: &[u8], index: usize) -> Option<u32> {
    Some(num2(b, index)? * 100 + num2(b, index + 2)?)
}

fn digit(b: &[u8], index: usize) -> Option<u32> {
    let byte = *b.get(index)?;
    byte.is_ascii_digit().then(|| u32::from(byte - b'0'))
}

#[cfg(test)]
mod tests {
    use super::{parse_line, parse_timestamp};
    use crate::types::LogLevel;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parses_full_record_with_latency() {
        let parsed = parse_line(b"2024-01-15T10:30:02.500Z INFO RequestCompleted latency_ms=42")
            .expect("valid line");
        assert_eq!(parsed.level, LogLevel::Info);
        assert_eq!(parsed.message_key, b"RequestCompleted");
        assert_eq!(parsed.latency_ms, Some(42));
        assert_eq!(
            parsed.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 2).unwrap()
                + chrono::Duration::milliseconds(500)
        );
    }

    #[test]
    fn normalizes_negative_offset_to_utc() {
        let parsed = parse_line(b"2024-01-15T10:30:02-06:00 WARN JobTick").expect("valid line");
        assert_eq!(parsed.level, LogLevel::Warn);
        assert_eq!(parsed.message_key, b"JobTick");
        assert_eq!(parsed.latency_ms, None);
        assert_eq!(
            parsed.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 16, 30, 2).unwrap()
        );
    }

    #[test]
    fn normalizes_positive_offset_to_utc() {
        let parsed = parse_line(b"2024-01-15T10:30:02+02:30 INFO X").expect("valid line");
        assert_eq!(
            parsed.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 2).unwrap()
        );
    }

    #[test]
    fn fraction_truncates_to_milliseconds() {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        for (input, expected_ms) in [
            (&b"2024-01-15T00:00:00.1Z X"[..], 100),
            (b"2024-01-15T00:00:00.12Z X", 120),
            (b"2024-01-15T00:00:00.123Z X", 123),
            (b"2024-01-15T00:00:00.1234Z X", 123),
            (b"2024-01-15T00:00:00.999999Z X", 999),
        ] {
            let parsed = parse_line(input).expect("valid line");
            assert_eq!(
                parsed.timestamp,
                base + chrono::Duration::milliseconds(expected_ms),
                "input: {}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn rejects_bad_timestamps() {
        let cases: &[&[u8]] = &[
            b"",
            b"not-a-timestamp INFO X",
            b"2024-01-15 10:30:02Z INFO X",     // space instead of T
            b"2024-01-15t10:30:02Z INFO X",     // lowercase t
            b"2024-01-15T10:30:02 INFO X",      // missing zone
            b"2024-01-15T10:30:02.Z INFO X",    // empty fraction
            b"2024-01-15T10:30:02Zx INFO X",    // trailing junk in token
            b"2024-02-30T10:30:02Z INFO X",     // not calendar-valid
            b"2024-01-15T24:00:00Z INFO X",     // invalid hour
            b"2024-01-15T10:30:02+0600 INFO X", // zone missing colon
        ];
        for case in cases {
            assert!(
                parse_line(case).is_none(),
                "should reject: {}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn unrecognized_level_is_other_not_malformed() {
        let parsed = parse_line(b"2024-01-15T10:30:02Z NOTICE ThingHappened").expect("valid line");
        assert_eq!(parsed.level, LogLevel::Other);
        assert_eq!(parsed.message_key, b"ThingHappened");
    }

    #[test]
    fn missing_message_yields_empty_key() {
        let parsed = parse_line(b"2024-01-15T10:30:02Z INFO").expect("valid line");
        assert_eq!(parsed.message_key, b"");
        assert_eq!(parsed.latency_ms, None);
    }

    #[test]
    fn timestamp_only_line_parses_with_other_level() {
        let parsed = parse_line(b"2024-01-15T10:30:02Z").expect("valid line");
        assert_eq!(parsed.level, LogLevel::Other);
        assert_eq!(parsed.message_key, b"");
    }

    #[test]
    fn latency_without_digits_is_absent() {
        let parsed =
            parse_line(b"2024-01-15T10:30:02Z INFO Done latency_ms=fast").expect("valid line");
        assert_eq!(parsed.latency_ms, None);
    }

    #[test]
    fn latency_skips_digitless_occurrence_and_uses_next() {
        let parsed = parse_line(b"2024-01-15T10:30:02Z INFO Done latency_ms=x latency_ms=7")
            .expect("valid line");
        assert_eq!(parsed.latency_ms, Some(7));
    }

    #[test]
    fn latency_takes_first_digit_bearing_occurrence() {
        let parsed = parse_line(b"2024-01-15T10:30:02Z INFO Done latency_ms=3 latency_ms=9")
            .expect("valid line");
        assert_eq!(parsed.latency_ms, Some(3));
    }

    #[test]
    fn latency_mid_token_is_still_found() {
        let parsed =
            parse_line(b"2024-01-15T10:30:02Z INFO Done detail=latency_ms=120ms").expect("valid");
        assert_eq!(parsed.latency_ms, Some(120));
    }

    #[test]
    fn oversized_latency_saturates() {
        let parsed = parse_line(b"2024-01-15T10:30:02Z INFO Done latency_ms=99999999999999999999")
            .expect("valid line");
        assert_eq!(parsed.latency_ms, Some(i32::MAX));
    }

    #[test]
    fn formatting_and_reparsing_round_trips() {
        let original = parse_timestamp(b"2024-06-30T23:59:59.875+05:45").expect("valid timestamp");
        let formatted = format!("{}", original.format("%Y-%m-%dT%H:%M:%S%.3fZ"));
        let reparsed = parse_timestamp(formatted.as_bytes()).expect("round-trip reparse");
        assert_eq!(original, reparsed);
    }
}
