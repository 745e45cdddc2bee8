//! The background task driving one [`super::RemoteStreamSink`] (§4.10): a
//! state machine cycling through Disconnected / Idle / Draining / Sending,
//! terminating only on cancellation, a closed producer channel, or a
//! permanent transport failure.
//!
//! Grounded on the teacher's `AgentPool::reconnect_agent` (backoff-retried
//! reconnect loop) and `service/background.rs` (interval-driven task with
//! `tokio::select!` against a cancellation token).

use super::transport::{SessionUpdate, Transport};
use crate::error::TransportError;
use crate::record::LogEvent;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(1);
const MIN_SESSION_LIFETIME: Duration = Duration::from_secs(1);

/// Full-jitter exponential backoff (base 100ms, factor 2, cap 1s): the delay
/// before retry `attempt` (0-indexed) is a uniform random draw in
/// `[0, min(base * 2^attempt, cap)]`.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let cap = exp.min(BACKOFF_CAP);
    let millis = cap.as_millis().max(1) as u64;
    let jitter = rand::thread_rng().gen_range(0..=millis);
    Duration::from_millis(jitter)
}

pub struct RemoteConfig {
    pub buffer_size: usize,
    pub drain_window: Duration,
    pub drop_if_full: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { buffer_size: 256, drain_window: Duration::from_millis(250), drop_if_full: true }
    }
}

/// Runs until cancelled, the channel closes, or the transport reports
/// [`TransportError::ResourceExhausted`]. `unable_to_ingest` is invoked
/// exactly once, right before returning, in the resource-exhausted case.
pub async fn run(
    mut rx: mpsc::Receiver<LogEvent>,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    config: RemoteConfig,
    unable_to_ingest: Arc<dyn Fn() + Send + Sync>,
) {
    let mut resume_session_id: i64 = 0;
    let mut heartbeat_interval = Duration::from_secs(30);
    let mut pending: Option<Vec<LogEvent>> = None;

    'reconnect: loop {
        if cancel.is_cancelled() {
            return;
        }

        let (mut session, update) = match connect_with_retry(&transport, resume_session_id, &cancel, &unable_to_ingest).await {
            Some(session_and_update) => session_and_update,
            None => return,
        };
        if let Some(id) = update.session_id {
            resume_session_id = id;
        }
        if let Some(interval) = update.heartbeat_interval {
            heartbeat_interval = interval;
        }
        let session_started = Instant::now();

        if let Some(batch) = pending.take() {
            match transmit(session.as_mut(), batch, &mut resume_session_id, &mut heartbeat_interval).await {
                TransmitOutcome::Ok { closed } => {
                    if closed {
                        return;
                    }
                }
                TransmitOutcome::Retry(batch) => {
                    pending = Some(batch);
                    if cooldown(session_started, &cancel).await {
                        return;
                    }
                    continue 'reconnect;
                }
                TransmitOutcome::Fatal => {
                    unable_to_ingest();
                    return;
                }
            }
        }

        loop {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            let first_event = tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    match transmit(session.as_mut(), Vec::new(), &mut resume_session_id, &mut heartbeat_interval).await {
                        TransmitOutcome::Ok { closed } => {
                            if closed {
                                return;
                            }
                            continue;
                        }
                        TransmitOutcome::Retry(batch) => {
                            pending = Some(batch);
                            if cooldown(session_started, &cancel).await {
                                return;
                            }
                            continue 'reconnect;
                        }
                        TransmitOutcome::Fatal => {
                            unable_to_ingest();
                            return;
                        }
                    }
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => event,
                        None => return,
                    }
                }
            };

            let (batch, closed) = drain(&mut rx, first_event, config.buffer_size, config.drain_window, &cancel).await;
            let Some(batch) = batch else {
                // Cancelled mid-drain: the batch is dropped, an explicit
                // exception to the at-least-once contract (§4.10 Draining).
                return;
            };

            match transmit(session.as_mut(), batch, &mut resume_session_id, &mut heartbeat_interval).await {
                TransmitOutcome::Ok { closed: send_closed } => {
                    if closed || send_closed {
                        return;
                    }
                }
                TransmitOutcome::Retry(batch) => {
                    pending = Some(batch);
                    if cooldown(session_started, &cancel).await {
                        return;
                    }
                    continue 'reconnect;
                }
                TransmitOutcome::Fatal => {
                    unable_to_ingest();
                    return;
                }
            }
        }
    }
}

async fn connect_with_retry(
    transport: &Arc<dyn Transport>,
    resume_session_id: i64,
    cancel: &CancellationToken,
    unable_to_ingest: &Arc<dyn Fn() + Send + Sync>,
) -> Option<(Box<dyn super::transport::Session>, SessionUpdate)> {
    let mut attempt = 0u32;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            result = transport.connect(resume_session_id) => {
                match result {
                    Ok((session, update)) => return Some((session, update)),
                    Err(TransportError::ResourceExhausted) => {
                        error!("remote ingest connect permanently refused");
                        unable_to_ingest();
                        return None;
                    }
                    Err(TransportError::Transient(msg)) => {
                        warn!(attempt, error = %msg, "remote ingest connect failed, retrying");
                        let delay = backoff_delay(attempt);
                        attempt = attempt.saturating_add(1);
                        tokio::select! {
                            _ = cancel.cancelled() => return None,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }
}

enum TransmitOutcome {
    Ok { closed: bool },
    Retry(Vec<LogEvent>),
    Fatal,
}

async fn transmit(
    session: &mut dyn super::transport::Session,
    batch: Vec<LogEvent>,
    resume_session_id: &mut i64,
    heartbeat_interval: &mut Duration,
) -> TransmitOutcome {
    let size = batch.len();
    // `send_batch` takes the batch by value; keep a copy so a transient
    // failure can hand it back for the next session's first send
    // (at-least-once delivery, §4.10).
    let retry_copy = batch.clone();
    let start = Instant::now();
    match session.send_batch(batch).await {
        Ok(update) => {
            debug!(batch_size = size, elapsed_ms = start.elapsed().as_millis() as u64, "batch transmitted");
            if let Some(id) = update.session_id {
                *resume_session_id = id;
            }
            if let Some(interval) = update.heartbeat_interval {
                *heartbeat_interval = interval;
            }
            TransmitOutcome::Ok { closed: false }
        }
        Err(TransportError::Transient(msg)) => {
            warn!(batch_size = size, error = %msg, "batch transmit failed, will retry after reconnect");
            TransmitOutcome::Retry(retry_copy)
        }
        Err(TransportError::ResourceExhausted) => {
            error!(batch_size = size, "batch transmit permanently refused");
            TransmitOutcome::Fatal
        }
    }
}

/// Accumulates events starting from `first`, until `buffer_size` is reached,
/// `drain_window` elapses, the channel closes, or cancellation fires.
/// Returns `(None, _)` only on cancellation (batch dropped); otherwise
/// `(Some(batch), channel_closed)`.
async fn drain(
    rx: &mut mpsc::Receiver<LogEvent>,
    first: LogEvent,
    buffer_size: usize,
    drain_window: Duration,
    cancel: &CancellationToken,
) -> (Option<Vec<LogEvent>>, bool) {
    let mut batch = vec![first];
    let deadline = tokio::time::sleep(drain_window);
    tokio::pin!(deadline);

    loop {
        if batch.len() >= buffer_size {
            return (Some(batch), false);
        }
        tokio::select! {
            _ = cancel.cancelled() => return (None, false),
            _ = &mut deadline => return (Some(batch), false),
            event = rx.recv() => {
                match event {
                    Some(event) => batch.push(event),
                    None => return (Some(batch), true),
                }
            }
        }
    }
}

/// If the just-ended session lasted under a second, sleep a flat second
/// (cancellation-aware) before reconnecting — avoids hammering a remote
/// that is rejecting connections near-instantly. Returns `true` if
/// cancelled during the wait.
async fn cooldown(session_started: Instant, cancel: &CancellationToken) -> bool {
    if session_started.elapsed() >= MIN_SESSION_LIFETIME {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(MIN_SESSION_LIFETIME) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_never_exceeds_cap() {
        for attempt in 0..10 {
            let delay = backoff_delay(attempt);
            assert!(delay <= BACKOFF_CAP);
        }
    }

    #[test]
    fn backoff_delay_grows_then_saturates() {
        let first = backoff_delay(0);
        assert!(first <= BACKOFF_BASE);
        let late = backoff_delay(20);
        assert!(late <= BACKOFF_CAP);
    }
}
