//! Format parsers, one per recognized line shape (§4.2-§4.4).

pub mod json;
pub mod logfmt;
pub mod prefix;

pub use json::JsonHandler;
pub use logfmt::LogfmtHandler;
pub use prefix::{DockerComposePrefix, ZapDevPrefix};

/// Bunyan's numeric severity levels (`10 -> trace` ... `60 -> fatal`), used
/// when a `level` field is extracted as a number rather than a string.
pub(super) fn bunyan_level_name(level: i64) -> &'static str {
    match level {
        10 => "trace",
        20 => "debug",
        30 => "info",
        40 => "warn",
        50 => "error",
        60 => "fatal",
        _ => "???",
    }
}

/// If `detect_timestamp` is on, try to parse `s` against the known layouts
/// and return a typed timestamp value; otherwise (or on failure) keep it as
/// a string.
pub(super) fn maybe_detect_timestamp(s: &str, detect_timestamp: bool) -> crate::value::Value {
    if detect_timestamp {
        if let Some(ts) = crate::time_parser::TimeParser::global().parse_string(s) {
            return crate::value::Value::Timestamp(ts);
        }
    }
    crate::value::Value::String(s.to_string())
}
