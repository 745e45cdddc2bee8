//! Thin prefix-peeling handlers that recognize a line shape's envelope and
//! delegate the remainder to an inner handler (§4.4).

use crate::parser::formats::JsonHandler;
use crate::parser::options::ParseOptions;
use crate::parser::traits::Handler;
use crate::record::StructuredRecord;
use crate::value::{Kv, Value};

/// Peels a docker-compose service prefix (`web_1    | <line>`, optionally
/// ANSI-colored) and hands the remainder to an inner handler.
pub struct DockerComposePrefix {
    inner: Box<dyn Handler>,
    name: &'static str,
}

impl DockerComposePrefix {
    pub fn wrapping(inner: Box<dyn Handler>, name: &'static str) -> Self {
        Self { inner, name }
    }
}

impl Handler for DockerComposePrefix {
    fn try_parse(&self, raw: &[u8], opts: &ParseOptions) -> Option<StructuredRecord> {
        let mut cursor = strip_leading_ansi(raw);

        let token_end = cursor
            .iter()
            .position(|&b| !is_service_char(b))
            .unwrap_or(cursor.len());
        if token_end == 0 {
            return None;
        }
        let service = std::str::from_utf8(&cursor[..token_end]).ok()?.to_string();
        cursor = &cursor[token_end..];

        cursor = skip_ascii_spaces(cursor);
        cursor = cursor.strip_prefix(b"|".as_slice())?;
        cursor = strip_leading_ansi(cursor);
        cursor = cursor.strip_prefix(b" ".as_slice())?;

        let mut record = self.inner.try_parse(cursor, opts)?;
        record.attributes.push(Kv::new("service", Value::String(service)));
        Some(record)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

fn is_service_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

fn skip_ascii_spaces(input: &[u8]) -> &[u8] {
    let end = input.iter().position(|&b| b != b' ').unwrap_or(input.len());
    &input[end..]
}

/// Strips one leading ANSI CSI sequence (`ESC [ ... m`), if present.
fn strip_leading_ansi(input: &[u8]) -> &[u8] {
    if input.first() == Some(&0x1b) && input.get(1) == Some(&b'[') {
        if let Some(pos) = input[2..].iter().position(|&b| b == b'm') {
            return &input[2 + pos + 1..];
        }
    }
    input
}

/// Peels a Zap development-encoder prefix (`<ts>\t<LEVEL>\t<caller>\t<msg>\t<json>`)
/// and delegates the trailing JSON body to an inner [`JsonHandler`].
pub struct ZapDevPrefix {
    inner: JsonHandler,
}

impl ZapDevPrefix {
    pub fn new() -> Self {
        Self { inner: JsonHandler::new() }
    }
}

impl Default for ZapDevPrefix {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for ZapDevPrefix {
    fn try_parse(&self, raw: &[u8], opts: &ParseOptions) -> Option<StructuredRecord> {
        let text = std::str::from_utf8(raw).ok()?;
        let brace_pos = text.find('{')?;
        let head = text[..brace_pos].trim_end();

        let mut rest = head.trim_start();
        let ts_str = take_token(&mut rest)?;
        let level_str = take_token(&mut rest)?;
        let caller_str = take_token(&mut rest)?;
        let message = rest.trim();

        if !(4..=5).contains(&level_str.len()) || !level_str.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        let timestamp = parse_zap_timestamp(ts_str)?;

        let json_body = &text[brace_pos..];
        let mut record = self.inner.try_parse(json_body.as_bytes(), opts)?;
        record.timestamp = Some(timestamp);
        record.severity = level_str.to_lowercase();
        record.body = message.to_string();
        record.attributes.push(Kv::new("caller", Value::String(caller_str.to_string())));
        Some(record)
    }

    fn name(&self) -> &'static str {
        "zap_json"
    }
}

fn take_token<'a>(rest: &mut &'a str) -> Option<&'a str> {
    *rest = rest.trim_start();
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let tok = &rest[..end];
    *rest = &rest[end..];
    Some(tok)
}

fn parse_zap_timestamp(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .or_else(|| crate::time_parser::TimeParser::global().parse_string(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::formats::{JsonHandler, LogfmtHandler};

    #[test]
    fn docker_compose_plus_json() {
        let opts = ParseOptions::default();
        let handler = DockerComposePrefix::wrapping(Box::new(JsonHandler::new()), "docker_compose_json");
        let line = br#"web_1    | {"msg":"hi","level":"info","time":"2024-01-01T00:00:00Z"}"#;
        let rec = handler.try_parse(line, &opts).unwrap();
        assert_eq!(rec.body, "hi");
        assert_eq!(rec.severity, "info");
        assert!(rec.timestamp.is_some());
        assert!(rec.attributes.iter().any(|kv| kv.key == "service" && kv.value == Value::String("web_1".into())));
    }

    #[test]
    fn docker_compose_rejects_when_inner_does_not_match() {
        let opts = ParseOptions::default();
        let handler = DockerComposePrefix::wrapping(Box::new(LogfmtHandler::new()), "docker_compose_logfmt");
        assert!(handler.try_parse(b"web_1    | not logfmt at all", &opts).is_none());
    }

    #[test]
    fn docker_compose_with_ansi_colors() {
        let opts = ParseOptions::default();
        let handler = DockerComposePrefix::wrapping(Box::new(LogfmtHandler::new()), "docker_compose_logfmt");
        let line = b"\x1b[36mweb_1\x1b[0m | level=info msg=hi";
        let rec = handler.try_parse(line, &opts).unwrap();
        assert_eq!(rec.body, "hi");
    }

    #[test]
    fn zap_dev_prefix() {
        let opts = ParseOptions::default();
        let handler = ZapDevPrefix::new();
        let line = b"2021-02-05T12:41:48.053-0700\tDEBUG\tzapper/zapper.go:18\tsome message 1\t{\"rand_index\": 1}";
        let rec = handler.try_parse(line, &opts).unwrap();
        assert_eq!(rec.severity, "debug");
        assert_eq!(rec.body, "some message 1");
        assert!(rec.attributes.iter().any(|kv| kv.key == "caller" && kv.value == Value::String("zapper/zapper.go:18".into())));
        assert!(rec.attributes.iter().any(|kv| kv.key == "rand_index" && kv.value == Value::Int(1)));
        assert!(rec.timestamp.is_some());
    }

    #[test]
    fn zap_dev_prefix_rejects_missing_json() {
        let opts = ParseOptions::default();
        let handler = ZapDevPrefix::new();
        assert!(handler.try_parse(b"2021-02-05T12:41:48.053-0700 DEBUG caller.go:1 no json here", &opts).is_none());
    }
}
