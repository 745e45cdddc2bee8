//! logfmt key=value line parser (§4.3).

use super::maybe_detect_timestamp;
use crate::parser::options::ParseOptions;
use crate::parser::traits::Handler;
use crate::record::StructuredRecord;
use crate::time_parser::TimeParser;
use crate::value::{Kv, Value};

#[derive(Debug, Default)]
pub struct LogfmtHandler;

impl LogfmtHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for LogfmtHandler {
    fn try_parse(&self, raw: &[u8], opts: &ParseOptions) -> Option<StructuredRecord> {
        // Cheap rejection: logfmt must contain at least one `=`.
        if !raw.contains(&b'=') {
            return None;
        }
        let text = String::from_utf8_lossy(raw);
        let pairs: Vec<(String, String)> = parse_logfmt_pairs(&text).collect();
        if pairs.is_empty() {
            return None;
        }

        let mut record = StructuredRecord::empty();
        let mut time_found = false;
        let mut level_found = false;
        let mut message_found = false;

        for (key, value) in &pairs {
            let path = [key.clone()];

            if !time_found
                && opts
                    .time_fields
                    .find_and_promote(|fp| if fp.matches_components(&path) { Some(()) } else { None })
                    .is_some()
            {
                if let Some(ts) = extract_time(value) {
                    record.timestamp = Some(ts);
                    time_found = true;
                    continue;
                }
            }

            if !level_found
                && opts
                    .level_fields
                    .find_and_promote(|fp| if fp.matches_components(&path) { Some(()) } else { None })
                    .is_some()
            {
                record.severity = value.clone();
                level_found = true;
                continue;
            }

            if !message_found
                && opts
                    .message_fields
                    .find_and_promote(|fp| if fp.matches_components(&path) { Some(()) } else { None })
                    .is_some()
            {
                record.body = value.clone();
                message_found = true;
                continue;
            }

            record.attributes.push(Kv::new(
                key.clone(),
                maybe_detect_timestamp(value, opts.detect_timestamp),
            ));
        }

        Some(record)
    }

    fn name(&self) -> &'static str {
        "logfmt"
    }
}

/// logfmt has no numeric literals of its own — every value is a string — so
/// time extraction tries the layout list first and falls back to treating
/// the string as a float epoch (§4.3's numeric-via-string caveat).
fn extract_time(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let parser = TimeParser::global();
    if let Some(ts) = parser.parse_string(value) {
        return Some(ts);
    }
    value.trim().parse::<f64>().ok().and_then(TimeParser::parse_number)
}

/// Lex `key=value` pairs out of a logfmt line, in encounter order, retaining
/// duplicates. Supports bare (whitespace-terminated) and double-quoted
/// (backslash-escaped) values; a bare key with no `=` is skipped rather than
/// aborting the whole line, matching the line's recoverable, best-effort
/// contract.
fn parse_logfmt_pairs(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    let mut chars = text.chars().peekable();

    std::iter::from_fn(move || loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            return None;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() {
            chars.next();
            continue;
        }

        if chars.peek() != Some(&'=') {
            // Key with no `=`: not a kv pair, skip and keep scanning.
            continue;
        }
        chars.next(); // consume '='

        let value = if chars.peek() == Some(&'"') {
            chars.next(); // opening quote
            let mut val = String::new();
            let mut escaped = false;
            for c in chars.by_ref() {
                if escaped {
                    val.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    break;
                } else {
                    val.push(c);
                }
            }
            val
        } else {
            let mut val = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                val.push(c);
                chars.next();
            }
            val
        };

        return Some((key, value));
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Option<StructuredRecord> {
        let opts = ParseOptions::default();
        LogfmtHandler::new().try_parse(raw.as_bytes(), &opts)
    }

    #[test]
    fn rejects_lines_with_no_equals() {
        assert!(parse("just some text").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn extracts_canonical_fields() {
        let rec = parse(r#"time=2024-01-01T00:00:00Z level=info msg="hello world" path=/api"#).unwrap();
        assert!(rec.timestamp.is_some());
        assert_eq!(rec.severity, "info");
        assert_eq!(rec.body, "hello world");
        assert_eq!(rec.attributes, vec![Kv::new("path", Value::String("/api".into()))]);
    }

    #[test]
    fn quoted_value_supports_backslash_escapes() {
        let rec = parse(r#"msg="with \"quotes\" inside""#).unwrap();
        assert_eq!(rec.body, "with \"quotes\" inside");
    }

    #[test]
    fn numeric_string_time_falls_back_to_epoch_seconds() {
        let rec = parse(r#"ts=1540369190 msg=hi"#).unwrap();
        assert_eq!(
            rec.timestamp.unwrap().timestamp_nanos_opt().unwrap(),
            1540369190_000_000_000
        );
    }

    #[test]
    fn key_without_equals_is_skipped_not_fatal() {
        let rec = parse("key1=value1 garbage key2=value2").unwrap();
        let keys: Vec<&str> = rec.attributes.iter().map(|kv| kv.key.as_str()).collect();
        assert!(keys.contains(&"key1"));
        assert!(keys.contains(&"key2"));
    }
}
