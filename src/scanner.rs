//! Line framing and the reorderable handler chain that turns bytes into
//! canonical [`LogEvent`]s (§4.5).
//!
//! Framing and handler dispatch run on a single task per source; the only
//! suspension point is the source read itself (§5). The handler chain's
//! move-to-front reordering is scoped to this `Scanner` instance, not
//! process-global — two scanners reading differently-shaped streams
//! shouldn't fight over handler order the way the time-layout list
//! deliberately does.

use crate::error::ScanError;
use crate::parser::formats::{DockerComposePrefix, JsonHandler, LogfmtHandler, ZapDevPrefix};
use crate::parser::metrics::{HandlerKind, ParsingMetrics};
use crate::parser::options::ParseOptions;
use crate::parser::traits::Handler;
use crate::record::LogEvent;
use crate::sink::Sink;
use bytes::Bytes;
use std::sync::Mutex;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Hard per-line cap (§2, §4.5). A frame that exceeds this is dropped
/// whole, not truncated.
pub const MAX_LINE_LENGTH: usize = 1_048_576;

/// The syslog-style marker some sources prepend (`@cee: {...}`); stripped
/// before a line reaches any handler. Open question #3 leaves this
/// unconditional rather than configurable.
const CEE_PREFIX: &str = "@cee: ";

pub struct Scanner {
    max_line_length: usize,
    handlers: Mutex<Vec<Box<dyn Handler>>>,
    opts: ParseOptions,
    pub metrics: ParsingMetrics,
}

impl Scanner {
    pub fn new(opts: ParseOptions) -> Self {
        Self::with_max_line_length(opts, MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(opts: ParseOptions, max_line_length: usize) -> Self {
        let handlers: Vec<Box<dyn Handler>> = vec![
            Box::new(JsonHandler::new()),
            Box::new(LogfmtHandler::new()),
            Box::new(DockerComposePrefix::wrapping(
                Box::new(JsonHandler::new()),
                "docker_compose_json",
            )),
            Box::new(DockerComposePrefix::wrapping(
                Box::new(LogfmtHandler::new()),
                "docker_compose_logfmt",
            )),
            Box::new(ZapDevPrefix::new()),
        ];
        Self {
            max_line_length,
            handlers: Mutex::new(handlers),
            opts,
            metrics: ParsingMetrics::new(),
        }
    }

    /// The current handler order, by name — a permutation of the initial
    /// chain (testable property #2).
    pub fn handler_order(&self) -> Vec<&'static str> {
        self.handlers.lock().unwrap().iter().map(|h| h.name()).collect()
    }

    /// Read `source` as newline-delimited frames and dispatch each to
    /// `sink` as a canonical [`LogEvent`], until EOF or `cancel` fires.
    pub async fn scan<R, S>(
        &self,
        source: R,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ScanError>
    where
        R: AsyncRead + Unpin,
        S: Sink,
    {
        let mut reader = BufReader::new(source);
        let mut line_no: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let (frame, hit_eof) = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = read_frame(&mut reader, self.max_line_length, &self.metrics) => result?,
            };

            let Some(frame) = frame else {
                return Ok(());
            };
            line_no += 1;

            let raw = strip_cee_prefix(&frame);
            let parsed_at = chrono::Utc::now();
            let event = self.dispatch(parsed_at, raw);

            if let Err(source) = sink.receive(event).await {
                return Err(ScanError::Sink { line: line_no, source });
            }

            if hit_eof {
                return Ok(());
            }
        }
    }

    fn dispatch(&self, parsed_at: chrono::DateTime<chrono::Utc>, raw: &[u8]) -> LogEvent {
        let raw_bytes = Bytes::copy_from_slice(raw);
        let mut handlers = self.handlers.lock().unwrap();
        let start = Instant::now();

        for idx in 0..handlers.len() {
            if let Some(record) = handlers[idx].try_parse(raw, &self.opts) {
                let kind = handler_kind(handlers[idx].name());
                if idx != 0 {
                    let handler = handlers.remove(idx);
                    handlers.insert(0, handler);
                }
                drop(handlers);
                self.metrics.record_parse(kind, start.elapsed().as_nanos() as u64);
                return LogEvent::structured(parsed_at, raw_bytes, record);
            }
        }
        drop(handlers);
        self.metrics.record_parse(HandlerKind::Unstructured, start.elapsed().as_nanos() as u64);
        LogEvent::unstructured(parsed_at, raw_bytes)
    }
}

fn handler_kind(name: &str) -> HandlerKind {
    match name {
        "json" => HandlerKind::Json,
        "logfmt" => HandlerKind::Logfmt,
        "docker_compose_json" => HandlerKind::DockerComposeJson,
        "docker_compose_logfmt" => HandlerKind::DockerComposeLogfmt,
        "zap_json" => HandlerKind::ZapJson,
        _ => HandlerKind::Unstructured,
    }
}

fn strip_cee_prefix(frame: &[u8]) -> &[u8] {
    if frame.len() >= CEE_PREFIX.len() && &frame[..CEE_PREFIX.len()] == CEE_PREFIX.as_bytes() {
        &frame[CEE_PREFIX.len()..]
    } else {
        frame
    }
}

/// Read one newline-delimited frame, honoring `max_line_length`.
///
/// A line whose content exceeds `max_line_length` before a newline is found
/// is dropped in its entirety: once the running length crosses the cap, the
/// function stops accumulating and switches to discarding bytes until the
/// next `\n`, then resumes normal framing for the line after it (§4.5,
/// testable property #3). This bounds memory use regardless of how long the
/// oversized line actually is.
///
/// Returns `(Some(frame), hit_eof)`, where `hit_eof` is true if the frame
/// was the last data in the source (no trailing newline). Returns
/// `(None, true)` at a clean EOF with nothing left to emit.
async fn read_frame<R>(
    reader: &mut BufReader<R>,
    max_line_length: usize,
    metrics: &ParsingMetrics,
) -> Result<(Option<Vec<u8>>, bool), ScanError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut line_buf: Vec<u8> = Vec::new();
        let mut oversized = false;

        loop {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                if line_buf.is_empty() {
                    return Ok((None, true));
                }
                if oversized {
                    metrics.record_oversized_dropped();
                    return Ok((None, true));
                }
                return Ok((Some(line_buf), true));
            }

            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                if !oversized {
                    line_buf.extend_from_slice(&buf[..pos]);
                }
                reader.consume(pos + 1);
                break;
            }

            if !oversized {
                if line_buf.len() + buf.len() > max_line_length {
                    oversized = true;
                    line_buf.clear();
                    warn!(cap = max_line_length, "oversized line exceeded max length, dropping frame");
                } else {
                    line_buf.extend_from_slice(buf);
                }
            }
            let n = buf.len();
            reader.consume(n);
        }

        if oversized {
            metrics.record_oversized_dropped();
            continue;
        }
        debug!(len = line_buf.len(), "frame read");
        return Ok((Some(line_buf), false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tee::CollectSink;

    #[tokio::test]
    async fn emits_one_event_per_line() {
        let scanner = Scanner::new(ParseOptions::default());
        let input = b"{\"msg\":\"a\"}\nlevel=info msg=b\nplain text\n".as_slice();
        let mut sink = CollectSink::default();
        let cancel = CancellationToken::new();
        scanner.scan(input, &mut sink, &cancel).await.unwrap();
        assert_eq!(sink.events.len(), 3);
        assert!(sink.events[0].structured.is_some());
        assert!(sink.events[1].structured.is_some());
        assert!(sink.events[2].structured.is_none());
    }

    #[tokio::test]
    async fn oversized_line_recovery() {
        let scanner = Scanner::with_max_line_length(ParseOptions::default(), 16);
        let oversized: Vec<u8> = std::iter::repeat(b'A').take(17).collect();
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"msg\":\"first\"}\n");
        input.extend_from_slice(&oversized);
        input.push(b'\n');
        input.extend_from_slice(b"{\"msg\":\"second\"}");

        let mut sink = CollectSink::default();
        let cancel = CancellationToken::new();
        scanner.scan(input.as_slice(), &mut sink, &cancel).await.unwrap();

        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[0].structured.as_ref().unwrap().body, "first");
        assert_eq!(sink.events[1].structured.as_ref().unwrap().body, "second");
    }

    #[tokio::test]
    async fn handler_order_is_a_permutation_after_matches() {
        let scanner = Scanner::new(ParseOptions::default());
        let before: Vec<&str> = scanner.handler_order();
        let input = b"level=info msg=hi\n".as_slice();
        let mut sink = CollectSink::default();
        let cancel = CancellationToken::new();
        scanner.scan(input, &mut sink, &cancel).await.unwrap();
        let mut after = scanner.handler_order();
        let mut before_sorted = before.clone();
        before_sorted.sort();
        after.sort();
        assert_eq!(before_sorted, after);
        assert_eq!(scanner.handler_order()[0], "logfmt");
    }

    #[tokio::test]
    async fn cancellation_stops_cleanly() {
        let scanner = Scanner::new(ParseOptions::default());
        let input = b"{\"msg\":\"a\"}\n".as_slice();
        let mut sink = CollectSink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        scanner.scan(input, &mut sink, &cancel).await.unwrap();
        assert!(sink.events.is_empty());
    }
}
