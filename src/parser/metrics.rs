//! Process-global parse outcome counters, ambient observability alongside
//! the `tracing` spans the scanner and sinks emit.
//!
//! Separate small structs per concern, each padded to its own cache line so
//! a hot counter in one block doesn't false-share with an unrelated one.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which handler (if any) produced the record for a scanned line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Json,
    Logfmt,
    DockerComposeJson,
    DockerComposeLogfmt,
    ZapJson,
    /// No handler in the chain recognized the line.
    Unstructured,
}

/// Wrapper that forces the wrapped data onto its own cache line(s).
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

#[derive(Debug, Default)]
pub struct FormatCounts {
    pub json: AtomicU64,
    pub logfmt: AtomicU64,
    pub docker_compose_json: AtomicU64,
    pub docker_compose_logfmt: AtomicU64,
    pub zap_json: AtomicU64,
    pub unstructured: AtomicU64,
}

#[derive(Debug, Default)]
pub struct LineCounts {
    pub scanned: AtomicU64,
    pub oversized_dropped: AtomicU64,
}

#[derive(Debug, Default)]
pub struct TimingTotals {
    pub time_nanos: AtomicU64,
    pub count: AtomicU64,
}

/// Scanner and parser-chain counters. One instance is normally shared by a
/// single [`crate::scanner::Scanner`], but nothing about it is process-wide
/// state — unlike the move-to-front orderings, counts are plain data and
/// don't need to be global to be useful.
#[derive(Debug, Default)]
pub struct ParsingMetrics {
    pub formats: CacheAligned<FormatCounts>,
    pub lines: CacheAligned<LineCounts>,
    pub totals: CacheAligned<TimingTotals>,
}

impl ParsingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_parse(&self, kind: HandlerKind, time_nanos: u64) {
        self.totals.0.count.fetch_add(1, Ordering::Relaxed);
        self.totals.0.time_nanos.fetch_add(time_nanos, Ordering::Relaxed);
        self.lines.0.scanned.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            HandlerKind::Json => &self.formats.0.json,
            HandlerKind::Logfmt => &self.formats.0.logfmt,
            HandlerKind::DockerComposeJson => &self.formats.0.docker_compose_json,
            HandlerKind::DockerComposeLogfmt => &self.formats.0.docker_compose_logfmt,
            HandlerKind::ZapJson => &self.formats.0.zap_json,
            HandlerKind::Unstructured => &self.formats.0.unstructured,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_oversized_dropped(&self) {
        self.lines.0.scanned.fetch_add(1, Ordering::Relaxed);
        self.lines.0.oversized_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_parsed = self.totals.0.count.load(Ordering::Relaxed);
        let total_time_ns = self.totals.0.time_nanos.load(Ordering::Relaxed);
        MetricsSnapshot {
            json_parsed: self.formats.0.json.load(Ordering::Relaxed),
            logfmt_parsed: self.formats.0.logfmt.load(Ordering::Relaxed),
            docker_compose_json_parsed: self.formats.0.docker_compose_json.load(Ordering::Relaxed),
            docker_compose_logfmt_parsed: self.formats.0.docker_compose_logfmt.load(Ordering::Relaxed),
            zap_json_parsed: self.formats.0.zap_json.load(Ordering::Relaxed),
            unstructured: self.formats.0.unstructured.load(Ordering::Relaxed),
            lines_scanned: self.lines.0.scanned.load(Ordering::Relaxed),
            oversized_dropped: self.lines.0.oversized_dropped.load(Ordering::Relaxed),
            total_parsed,
            avg_parse_time_us: if total_parsed > 0 {
                (total_time_ns as f64 / total_parsed as f64) / 1000.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub json_parsed: u64,
    pub logfmt_parsed: u64,
    pub docker_compose_json_parsed: u64,
    pub docker_compose_logfmt_parsed: u64,
    pub zap_json_parsed: u64,
    pub unstructured: u64,
    pub lines_scanned: u64,
    pub oversized_dropped: u64,
    pub total_parsed: u64,
    pub avg_parse_time_us: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_are_empty() {
        let metrics = ParsingMetrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.total_parsed, 0);
        assert_eq!(snap.avg_parse_time_us, 0.0);
    }

    #[test]
    fn record_parse_counts_by_handler_and_times() {
        let metrics = ParsingMetrics::new();
        metrics.record_parse(HandlerKind::Json, 1000);
        metrics.record_parse(HandlerKind::Logfmt, 2000);
        metrics.record_parse(HandlerKind::Unstructured, 0);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_parsed, 3);
        assert_eq!(snap.json_parsed, 1);
        assert_eq!(snap.logfmt_parsed, 1);
        assert_eq!(snap.unstructured, 1);
        assert!((snap.avg_parse_time_us - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn oversized_lines_count_as_scanned_but_not_parsed() {
        let metrics = ParsingMetrics::new();
        metrics.record_oversized_dropped();
        metrics.record_parse(HandlerKind::Json, 500);

        let snap = metrics.snapshot();
        assert_eq!(snap.lines_scanned, 2);
        assert_eq!(snap.oversized_dropped, 1);
        assert_eq!(snap.total_parsed, 1);
    }
}
