//! Best-effort timestamp parsing across many layouts, plus numeric-epoch
//! magnitude heuristics (§4.1).
//!
//! The layout list is a plain `Vec`, not a registry: on a successful parse
//! the matching layout is moved to the front (move-to-front), so a process
//! that only ever sees RFC 3339 quickly converges on trying it first. The
//! reordering is process-global (shared via [`TimeParser::global`]) but
//! guarded by a mutex — a race just delays the optimization, it never
//! corrupts the list.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Layout {
    /// `chrono` strptime pattern that includes a UTC offset.
    Offset(&'static str),
    /// Pattern with no offset; the parsed value is treated as UTC.
    NaiveDateTime(&'static str),
    /// Pattern with no year; the current UTC year is assumed.
    NaiveNoYear(&'static str),
    /// Time-of-day only (`Kitchen`); the current UTC date is assumed.
    TimeOnly(&'static str),
}

impl Layout {
    fn try_parse(&self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            Layout::Offset(fmt) => DateTime::parse_from_str(s, fmt)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Layout::NaiveDateTime(fmt) => NaiveDateTime::parse_from_str(s, fmt)
                .ok()
                .map(|ndt| Utc.from_utc_datetime(&ndt)),
            Layout::NaiveNoYear(fmt) => {
                let year = Utc::now().year();
                let with_year = format!("{s} {year}");
                let fmt_with_year = format!("{fmt} %Y");
                NaiveDateTime::parse_from_str(&with_year, &fmt_with_year)
                    .ok()
                    .map(|ndt| Utc.from_utc_datetime(&ndt))
            }
            Layout::TimeOnly(fmt) => {
                let today = Utc::now().date_naive();
                chrono::NaiveTime::parse_from_str(s, fmt)
                    .ok()
                    .map(|t| Utc.from_utc_datetime(&NaiveDateTime::new(today, t)))
            }
        }
    }
}

fn default_layouts() -> Vec<Layout> {
    vec![
        Layout::Offset("%Y-%m-%dT%H:%M:%S%z"),        // RFC3339 (colon or bare offset, 'Z' accepted)
        Layout::Offset("%Y-%m-%dT%H:%M:%S%.f%z"),     // RFC3339Nano, also covers the zap dev-encoder prefix
        Layout::NaiveDateTime("%d %b %y %H:%M"),      // RFC822 (zone abbreviation ignored)
        Layout::Offset("%d %b %y %H:%M %z"),          // RFC822Z
        Layout::NaiveDateTime("%A, %d-%b-%y %H:%M:%S"), // RFC850
        Layout::NaiveDateTime("%a, %d %b %Y %H:%M:%S"), // RFC1123 (zone abbreviation ignored)
        Layout::Offset("%a, %d %b %Y %H:%M:%S %z"),   // RFC1123Z
        Layout::NaiveDateTime("%a %b %e %H:%M:%S %Y"), // ANSIC
        Layout::NaiveDateTime("%a %b %e %H:%M:%S %Y"), // UnixDate (zone abbreviation ignored)
        Layout::Offset("%a %b %d %H:%M:%S %z %Y"),    // RubyDate
        Layout::TimeOnly("%I:%M%p"),                  // Kitchen
        Layout::NaiveNoYear("%b %e %H:%M:%S"),        // Stamp
        Layout::NaiveNoYear("%b %e %H:%M:%S%.3f"),    // StampMilli
        Layout::NaiveNoYear("%b %e %H:%M:%S%.6f"),    // StampMicro
        Layout::NaiveNoYear("%b %e %H:%M:%S%.9f"),    // StampNano
        Layout::NaiveDateTime("%Y-%m-%d %H:%M:%S%.f"), // space-separated w/ fraction
        Layout::NaiveDateTime("%Y-%m-%d %H:%M:%S"),   // space-separated
        Layout::NaiveDateTime("%Y/%m/%d %H:%M:%S"),   // slash-separated
        Layout::NaiveDateTime("%Y-%m-%dT%H:%M:%S%.f"), // adhoc, no zone -> UTC
    ]
}

/// Input accepted by [`TimeParser::parse_any`]: a string, or any of the
/// numeric shapes a JSON/logfmt value might carry a timestamp in.
#[derive(Debug, Clone, Copy)]
pub enum TimeInput<'a> {
    Str(&'a str),
    Int(i64),
    Float(f64),
}

pub struct TimeParser {
    layouts: Mutex<Vec<Layout>>,
}

impl TimeParser {
    pub fn new() -> Self {
        Self { layouts: Mutex::new(default_layouts()) }
    }

    /// The process-global instance whose move-to-front ordering is shared
    /// by every parser that doesn't build its own `TimeParser`.
    pub fn global() -> &'static TimeParser {
        static INSTANCE: OnceLock<TimeParser> = OnceLock::new();
        INSTANCE.get_or_init(TimeParser::new)
    }

    pub fn parse_any(&self, input: TimeInput<'_>) -> Option<DateTime<Utc>> {
        match input {
            TimeInput::Str(s) => self.parse_string(s),
            TimeInput::Int(i) => Self::parse_number_i64(i),
            TimeInput::Float(f) => Self::parse_number(f),
        }
    }

    /// Try every layout in the current order; on success, hoist the winner
    /// to the front (move-to-front) and return the instant.
    pub fn parse_string(&self, s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        let mut layouts = self.layouts.lock().unwrap();
        let mut hit = None;
        for (idx, layout) in layouts.iter().enumerate() {
            if let Some(instant) = layout.try_parse(s) {
                hit = Some((idx, instant));
                break;
            }
        }
        let (idx, instant) = hit?;
        if idx != 0 {
            let layout = layouts.remove(idx);
            layouts.insert(0, layout);
        }
        Some(apply_pre_epoch_guard(instant))
    }

    /// Interpret a numeric value as seconds/ms/µs/ns since the Unix epoch,
    /// distinguishing the encoding purely by magnitude (§4.1, testable
    /// property #4). Pure and stateless — magnitude detection never
    /// benefits from reordering.
    ///
    /// Takes `f64` because only a genuinely fractional input (a JSON/logfmt
    /// float) needs float math at all, to recover the sub-second part from
    /// the seconds-magnitude branch. Integer inputs must go through
    /// [`Self::parse_number_i64`] instead — `f64` only carries 53 bits of
    /// integer precision, which silently corrupts nanosecond-magnitude
    /// epoch values by tens to hundreds of nanoseconds.
    pub fn parse_number(x: f64) -> Option<DateTime<Utc>> {
        if !x.is_finite() {
            return None;
        }
        let nanos: i128 = if x.abs() > 1e18 {
            x as i128
        } else if x.abs() > 1e15 {
            (x as i128) * 1_000
        } else if x.abs() > 1e12 {
            (x as i128) * 1_000_000
        } else {
            let secs = x.trunc();
            let frac_nanos = ((x - secs) * 1e9).round() as i128;
            (secs as i128) * 1_000_000_000 + frac_nanos
        };
        instant_from_nanos(nanos)
    }

    /// Same magnitude heuristic as [`Self::parse_number`], but for an exact
    /// 64-bit integer epoch value — every branch stays in `i128` arithmetic
    /// so a nanosecond-magnitude `i64` (e.g. `time.Now().UnixNano()`) is
    /// never rounded through an `f64` on the way in.
    fn parse_number_i64(x: i64) -> Option<DateTime<Utc>> {
        let x = x as i128;
        let abs = x.unsigned_abs();
        let nanos: i128 = if abs > 1_000_000_000_000_000_000u128 {
            x
        } else if abs > 1_000_000_000_000_000u128 {
            x * 1_000
        } else if abs > 1_000_000_000_000u128 {
            x * 1_000_000
        } else {
            x * 1_000_000_000
        };
        instant_from_nanos(nanos)
    }
}

fn instant_from_nanos(nanos: i128) -> Option<DateTime<Utc>> {
    let secs = (nanos.div_euclid(1_000_000_000)) as i64;
    let subsec_nanos = (nanos.rem_euclid(1_000_000_000)) as u32;
    let instant = Utc.timestamp_opt(secs, subsec_nanos).single()?;
    Some(apply_pre_epoch_guard(instant))
}

impl Default for TimeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Lossy rescue, not a correctness property: some downstream serializers
/// choke on a negative Unix-seconds value, so a pre-epoch instant is
/// nudged one year forward rather than emitted as-is.
fn apply_pre_epoch_guard(instant: DateTime<Utc>) -> DateTime<Utc> {
    if instant.timestamp() < 0 {
        instant
            .checked_add_months(Months::new(12))
            .unwrap_or(instant)
    } else {
        instant
    }
}

/// Format a [`Duration`] the way Go's `time.Duration.String()` does:
/// `1h2m3s`, `500ms`, `1.5µs` — smallest unit that makes the value exact
/// or a natural decimal, no unit emitted with a zero leading magnitude.
pub fn format_go_duration(d: Duration) -> String {
    let total_nanos = d.as_nanos();
    if total_nanos == 0 {
        return "0s".to_string();
    }

    if total_nanos < 1_000_000_000 {
        let (unit, divisor) = if total_nanos < 1_000 {
            ("ns", 1u128)
        } else if total_nanos < 1_000_000 {
            ("\u{b5}s", 1_000u128)
        } else {
            ("ms", 1_000_000u128)
        };
        return format_fraction(total_nanos, divisor, unit);
    }

    let total_secs = d.as_secs();
    let nanos_rem = d.subsec_nanos();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&format_fraction(
        (secs as u128) * 1_000_000_000 + nanos_rem as u128,
        1_000_000_000,
        "s",
    ));
    out
}

fn format_fraction(value_in_subunits: u128, divisor: u128, unit: &str) -> String {
    let whole = value_in_subunits / divisor;
    let rem = value_in_subunits % divisor;
    if rem == 0 {
        format!("{whole}{unit}")
    } else {
        let mut frac = format!("{:0width$}", rem, width = divisor.to_string().len() - 1);
        while frac.ends_with('0') {
            frac.pop();
        }
        format!("{whole}.{frac}{unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_detects_seconds() {
        let t = TimeParser::parse_number(1540369190.0).unwrap();
        assert_eq!(t.timestamp_nanos_opt().unwrap(), 1540369190_000_000_000);
    }

    #[test]
    fn parse_number_detects_millis() {
        let t = TimeParser::parse_number(1540369190466.0).unwrap();
        assert_eq!(t.timestamp_nanos_opt().unwrap(), 1540369190466_000_000);
    }

    #[test]
    fn parse_number_detects_micros() {
        let t = TimeParser::parse_number(1540369190466951.0).unwrap();
        assert_eq!(t.timestamp_nanos_opt().unwrap(), 1540369190466951_000);
    }

    #[test]
    fn parse_number_detects_nanos() {
        // Exercised through the integer path: an `f64` can't exactly
        // represent a nanosecond-magnitude epoch value (53 bits of integer
        // precision vs. the ~61 bits this needs), so this goes through
        // `parse_number_i64`, which `TimeParser::parse_any` uses for any
        // integer input.
        let t = TimeParser::parse_number_i64(1540369190466951764).unwrap();
        assert_eq!(t.timestamp_nanos_opt().unwrap(), 1540369190466951764);
    }

    #[test]
    fn parse_any_int_preserves_nanosecond_precision() {
        let parser = TimeParser::new();
        let t = parser.parse_any(TimeInput::Int(1540369190466951764)).unwrap();
        assert_eq!(t.timestamp_nanos_opt().unwrap(), 1540369190466951764);
    }

    #[test]
    fn parse_string_rfc3339() {
        let parser = TimeParser::new();
        let t = parser.parse_string("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn move_to_front_hoists_successful_layout() {
        let parser = TimeParser::new();
        parser.parse_string("2024-01-01T00:00:00Z").unwrap();
        let layouts = parser.layouts.lock().unwrap();
        assert!(matches!(layouts[0], Layout::Offset(_)));
    }

    #[test]
    fn move_to_front_preserves_set() {
        let parser = TimeParser::new();
        let before = default_layouts().len();
        parser.parse_string("2024-01-01T00:00:00Z").unwrap();
        parser.parse_string("2024/01/02 03:04:05").unwrap();
        let after = parser.layouts.lock().unwrap().len();
        assert_eq!(before, after);
    }

    #[test]
    fn duration_formats_go_style() {
        assert_eq!(format_go_duration(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format_go_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_go_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_go_duration(Duration::from_secs(62)), "1m2s");
    }
}
