//! Tab-aligned, themed terminal rendering of [`crate::record::LogEvent`]s
//! (§4.8).

use crate::error::SinkError;
use crate::record::LogEvent;
use crate::sink::Sink;
use crate::value::Value;
use async_trait::async_trait;
use colored::{Color, Colorize};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::io::Write;
use tabwriter::TabWriter;

/// Capability the pretty-printer consults once, at construction, to decide
/// which theme to use — injected so tests don't need a real terminal.
pub trait BackgroundDetector: Send + Sync {
    fn is_dark(&self) -> bool;
}

/// Always reports dark, the common default for terminal emulators.
pub struct AssumeDark;

impl BackgroundDetector for AssumeDark {
    fn is_dark(&self) -> bool {
        true
    }
}

/// Per-severity style, keyed on the lowercased first four characters of the
/// severity string (`debug/info/warn/error/panic/fatal`, else `unknown`).
#[derive(Debug, Clone)]
pub struct Theme {
    pub debug: Color,
    pub info: Color,
    pub warn: Color,
    pub error: Color,
    pub panic: Color,
    pub fatal: Color,
    pub unknown: Color,
    pub message: Color,
    pub key: Color,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            debug: Color::BrightBlack,
            info: Color::Cyan,
            warn: Color::Yellow,
            error: Color::Red,
            panic: Color::Magenta,
            fatal: Color::BrightRed,
            unknown: Color::White,
            message: Color::White,
            key: Color::BrightBlack,
        }
    }

    pub fn light() -> Self {
        Self {
            debug: Color::BrightBlack,
            info: Color::Blue,
            warn: Color::Yellow,
            error: Color::Red,
            panic: Color::Magenta,
            fatal: Color::Red,
            unknown: Color::Black,
            message: Color::Black,
            key: Color::Black,
        }
    }

    fn level_color(&self, severity_key: &str) -> Color {
        match severity_key {
            "debug" => self.debug,
            "info" => self.info,
            "warn" => self.warn,
            "error" => self.error,
            "panic" => self.panic,
            "fatal" => self.fatal,
            _ => self.unknown,
        }
    }
}

pub struct PrettyPrinterConfig {
    pub time_format: String,
    pub skip: Vec<String>,
    pub keep: Vec<String>,
    pub skip_unchanged: bool,
    pub truncates: bool,
    pub truncate_length: usize,
    pub sort_longest: bool,
    pub absent_msg_content: String,
    pub absent_time_content: String,
    pub theme_dark: Theme,
    pub theme_light: Theme,
}

impl Default for PrettyPrinterConfig {
    fn default() -> Self {
        Self {
            time_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            skip: Vec::new(),
            keep: Vec::new(),
            skip_unchanged: false,
            truncates: false,
            truncate_length: 15,
            sort_longest: false,
            absent_msg_content: "<no msg>".to_string(),
            absent_time_content: "<no time>".to_string(),
            theme_dark: Theme::dark(),
            theme_light: Theme::light(),
        }
    }
}

struct CompiledFilters {
    skip: GlobSet,
    keep: GlobSet,
}

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}

/// Renders events to a writer as one aligned, colorized line each.
pub struct PrettyPrinter<W: Write> {
    writer: TabWriter<W>,
    config: PrettyPrinterConfig,
    filters: CompiledFilters,
    theme: Theme,
    /// (severity, key, rendered value) of the previous structured event on
    /// this sink, consulted by `skip_unchanged`.
    previous: Option<(String, Vec<(String, String)>)>,
}

impl<W: Write> PrettyPrinter<W> {
    pub fn new(writer: W, config: PrettyPrinterConfig, detector: &dyn BackgroundDetector) -> Self {
        let theme = if detector.is_dark() { config.theme_dark.clone() } else { config.theme_light.clone() };
        let filters = CompiledFilters { skip: build_globset(&config.skip), keep: build_globset(&config.keep) };
        Self { writer: TabWriter::new(writer), config, filters, theme, previous: None }
    }

    fn attribute_allowed(&self, key: &str) -> bool {
        if self.filters.keep.is_match(key) {
            return true;
        }
        !self.filters.skip.is_match(key)
    }

    fn render_value(&self, value: &Value) -> String {
        let rendered = value.render();
        if !self.config.truncates {
            return rendered;
        }
        // `truncate_length` counts chars, not bytes — a raw byte slice at
        // that offset can land mid-codepoint for any non-ASCII value and
        // panic. Find the byte offset of the nth char boundary instead.
        match rendered.char_indices().nth(self.config.truncate_length) {
            Some((byte_idx, _)) => format!("{}...", &rendered[..byte_idx]),
            None => rendered,
        }
    }

    fn render_structured(&mut self, record: &crate::record::StructuredRecord) -> String {
        let time_str = record
            .timestamp
            .map(|t| t.format(&self.config.time_format).to_string())
            .unwrap_or_else(|| self.config.absent_time_content.clone());

        let severity_key = severity_key(&record.severity);
        let level_str = level_tag(&record.severity);
        let level_colored = level_str.as_str().color(self.theme.level_color(&severity_key)).to_string();

        let message = if record.body.is_empty() {
            self.config.absent_msg_content.clone()
        } else {
            record.body.clone()
        };
        let message_colored = message.as_str().color(self.theme.message).to_string();

        let mut pairs: Vec<(String, String)> = record
            .attributes
            .iter()
            .filter(|kv| self.attribute_allowed(&kv.key))
            .map(|kv| (kv.key.clone(), self.render_value(&kv.value)))
            .collect();

        if self.config.skip_unchanged {
            if let Some((prev_severity, prev_pairs)) = &self.previous {
                if *prev_severity == severity_key {
                    pairs.retain(|(k, v)| {
                        self.filters.keep.is_match(k)
                            || !prev_pairs.iter().any(|(pk, pv)| pk == k && pv == v)
                    });
                }
            }
        }

        let unchanged_snapshot: Vec<(String, String)> = record
            .attributes
            .iter()
            .filter(|kv| self.attribute_allowed(&kv.key))
            .map(|kv| (kv.key.clone(), self.render_value(&kv.value)))
            .collect();
        self.previous = Some((severity_key, unchanged_snapshot));

        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        if self.config.sort_longest {
            pairs.sort_by_key(|(k, v)| k.len() + v.len());
        }

        let kvs = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k.as_str().color(self.theme.key), v))
            .collect::<Vec<_>>()
            .join("\t ");

        format!("{time_str} |{level_colored}| {message_colored}\t {kvs}")
    }
}

fn severity_key(severity: &str) -> String {
    let lower = severity.to_lowercase();
    match lower.as_str() {
        "debug" | "info" | "warn" | "error" | "panic" | "fatal" => lower,
        _ => "unknown".to_string(),
    }
}

fn level_tag(severity: &str) -> String {
    let upper = severity.to_uppercase();
    upper.chars().take(4).collect()
}

#[async_trait]
impl<W: Write + Send> Sink for PrettyPrinter<W> {
    async fn receive(&mut self, event: LogEvent) -> Result<(), SinkError> {
        match &event.structured {
            None => {
                self.writer.write_all(&event.raw).map_err(SinkError::Io)?;
                self.writer.write_all(b"\n").map_err(SinkError::Io)?;
            }
            Some(record) => {
                let line = self.render_structured(record);
                writeln!(self.writer, "{line}").map_err(SinkError::Io)?;
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(SinkError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StructuredRecord;
    use crate::value::Kv;
    use bytes::Bytes;
    use chrono::Utc;

    fn record(severity: &str, body: &str, attrs: Vec<(&str, Value)>) -> StructuredRecord {
        StructuredRecord {
            timestamp: Some(Utc::now()),
            severity: severity.to_string(),
            body: body.to_string(),
            attributes: attrs.into_iter().map(|(k, v)| Kv::new(k, v)).collect(),
        }
    }

    #[tokio::test]
    async fn unstructured_event_prints_raw_verbatim() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut printer = PrettyPrinter::new(&mut buf, PrettyPrinterConfig::default(), &AssumeDark);
            let event = LogEvent::unstructured(Utc::now(), Bytes::from_static(b"plain text"));
            printer.receive(event).await.unwrap();
            printer.close().await.unwrap();
        }
        assert!(String::from_utf8(buf).unwrap().contains("plain text"));
    }

    #[tokio::test]
    async fn skip_unchanged_suppresses_repeated_kv_at_same_severity() {
        let config = PrettyPrinterConfig { skip_unchanged: true, ..Default::default() };
        let mut buf: Vec<u8> = Vec::new();
        let mut printer = PrettyPrinter::new(&mut buf, config, &AssumeDark);

        let rec1 = record("info", "first", vec![("path", Value::String("/api".into()))]);
        let rec2 = record("info", "second", vec![("path", Value::String("/api".into()))]);
        printer.receive(LogEvent::structured(Utc::now(), Bytes::new(), rec1)).await.unwrap();
        printer.receive(LogEvent::structured(Utc::now(), Bytes::new(), rec2)).await.unwrap();
        printer.close().await.unwrap();

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("path"));
        assert!(!lines[1].contains("path"));
    }

    #[tokio::test]
    async fn keep_wins_over_skip() {
        let config = PrettyPrinterConfig {
            skip: vec!["*".to_string()],
            keep: vec!["important".to_string()],
            ..Default::default()
        };
        let mut buf: Vec<u8> = Vec::new();
        let mut printer = PrettyPrinter::new(&mut buf, config, &AssumeDark);
        let rec = record("info", "hi", vec![("important", Value::Int(1)), ("other", Value::Int(2))]);
        printer.receive(LogEvent::structured(Utc::now(), Bytes::new(), rec)).await.unwrap();
        printer.close().await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("important"));
        assert!(!text.contains("other"));
    }

    #[test]
    fn severity_key_normalizes_and_falls_back() {
        assert_eq!(severity_key("INFO"), "info");
        assert_eq!(severity_key("weird"), "unknown");
    }

    #[test]
    fn level_tag_truncates_to_four_chars() {
        assert_eq!(level_tag("warning"), "WARN");
        assert_eq!(level_tag("info"), "INFO");
    }

    #[test]
    fn truncation_does_not_split_a_multibyte_char() {
        let config = PrettyPrinterConfig { truncates: true, truncate_length: 3, ..Default::default() };
        let printer = PrettyPrinter::new(Vec::new(), config, &AssumeDark);
        // Each "é" is two UTF-8 bytes; a byte-index slice at 3 would land
        // inside the second one.
        let rendered = printer.render_value(&Value::String("ééééé".into()));
        assert_eq!(rendered, "ééé...");
    }

    #[test]
    fn truncation_leaves_short_values_untouched() {
        let config = PrettyPrinterConfig { truncates: true, truncate_length: 15, ..Default::default() };
        let printer = PrettyPrinter::new(Vec::new(), config, &AssumeDark);
        let rendered = printer.render_value(&Value::String("short".into()));
        assert_eq!(rendered, "short");
    }
}
