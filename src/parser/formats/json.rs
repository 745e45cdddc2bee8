//! JSON object parser (§4.2).

use super::bunyan_level_name;
use crate::parser::options::ParseOptions;
use crate::parser::traits::Handler;
use crate::record::StructuredRecord;
use crate::time_parser::{TimeInput, TimeParser};
use crate::value::{join_path, parse_json_object, Kv, Value};

#[derive(Debug, Default)]
pub struct JsonHandler;

impl JsonHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for JsonHandler {
    fn try_parse(&self, raw: &[u8], opts: &ParseOptions) -> Option<StructuredRecord> {
        let pairs = parse_json_object(raw)?;
        let mut record = StructuredRecord::empty();
        let mut walker = Walker {
            opts,
            record: &mut record,
            time_found: false,
            level_found: false,
            message_found: false,
        };
        for (key, value) in &pairs {
            walker.visit(&[key.clone()], value);
        }
        Some(record)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

struct Walker<'a> {
    opts: &'a ParseOptions,
    record: &'a mut StructuredRecord,
    time_found: bool,
    level_found: bool,
    message_found: bool,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, path: &[String], value: &Value) {
        if !self.time_found
            && self
                .opts
                .time_fields
                .find_and_promote(|fp| if fp.matches_components(path) { Some(()) } else { None })
                .is_some()
        {
            if let Some(ts) = extract_time(value) {
                self.record.timestamp = Some(ts);
                self.time_found = true;
                return;
            }
        }

        if !self.level_found
            && self
                .opts
                .level_fields
                .find_and_promote(|fp| if fp.matches_components(path) { Some(()) } else { None })
                .is_some()
        {
            if let Some(severity) = extract_level(value) {
                self.record.severity = severity;
                self.level_found = true;
                return;
            }
        }

        if !self.message_found
            && self
                .opts
                .message_fields
                .find_and_promote(|fp| if fp.matches_components(path) { Some(()) } else { None })
                .is_some()
        {
            if let Value::String(s) = value {
                self.record.body = s.clone();
                self.message_found = true;
                return;
            }
        }

        match value {
            Value::Object(pairs) => {
                for (k, v) in pairs {
                    let mut child = path.to_vec();
                    child.push(k.clone());
                    self.visit(&child, v);
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    let mut child = path.to_vec();
                    child.push(i.to_string());
                    self.visit(&child, v);
                }
            }
            scalar => {
                let key = join_path(&path[..path.len() - 1], path.last().unwrap());
                let rendered = match scalar {
                    Value::String(s) => super::maybe_detect_timestamp(s, self.opts.detect_timestamp),
                    other => other.clone(),
                };
                self.record.attributes.push(Kv::new(key, rendered));
            }
        }
    }
}

fn extract_time(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    let parser = TimeParser::global();
    match value {
        Value::Int(i) => parser.parse_any(TimeInput::Int(*i)),
        Value::Float(f) => parser.parse_any(TimeInput::Float(*f)),
        Value::String(s) => parser.parse_any(TimeInput::Str(s)),
        // Python-logging convention: asctime as a one-element array.
        Value::Array(items) if items.len() == 1 => match &items[0] {
            Value::String(s) => parser.parse_any(TimeInput::Str(s)),
            _ => None,
        },
        _ => None,
    }
}

fn extract_level(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(bunyan_level_name(*i).to_string()),
        Value::Float(f) => Some(bunyan_level_name(*f as i64).to_string()),
        _ => None,
    }
}
