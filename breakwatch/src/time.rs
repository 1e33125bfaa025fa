//! The time reference tracker.
//!
//! [`TimeKeeper`] maintains the engine's best estimate of true (server) time.
//! A successful sync anchors the server's wall clock to a monotonic
//! [`Instant`], so the estimate keeps advancing steadily even if the device's
//! wall clock is stepped or drifts:
//!
//! ```text
//! estimate = anchor_wall + (Instant::now() - anchor_mono)
//! ```
//!
//! Before the first successful sync (or if the reference is ever absent) a
//! cruder fallback is used: the local wall clock plus the offset observed at
//! the last successful contact, zero before any.

use crate::error::SyncError;
use crate::net::KioskBackend;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// A monotonic anchor for the server's wall clock.
#[derive(Debug, Clone, Copy)]
pub struct TimeReference {
    pub anchor_wall: DateTime<Utc>,
    pub anchor_mono: Instant,
}

impl TimeReference {
    /// The estimated true time at the given monotonic instant.
    pub fn estimate(&self, mono_now: Instant) -> DateTime<Utc> {
        let elapsed = mono_now.saturating_duration_since(self.anchor_mono);
        self.anchor_wall + clamp_to_chrono(elapsed)
    }
}

/// What a successful sync did to the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// The absolute time the endpoint reported.
    pub server_time: DateTime<Utc>,
    /// How far the new reference moved the estimate. Signed; a backward
    /// correction is acceptable and documented.
    pub correction: ChronoDuration,
    /// Wall duration of the HTTP round trip.
    pub round_trip: std::time::Duration,
}

/// Outcome shared between all callers attached to one in-flight sync.
pub type SyncOutcome = Result<SyncReport, SyncError>;

#[derive(Debug, Clone, Copy)]
struct ClockState {
    reference: Option<TimeReference>,
    fallback_offset: ChronoDuration,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            reference: None,
            fallback_offset: ChronoDuration::zero(),
        }
    }
}

/// Tracks the drift-corrected time reference and serializes sync attempts.
pub struct TimeKeeper {
    state: Arc<RwLock<ClockState>>,
    gate: SyncGate,
    backend: KioskBackend,
}

impl TimeKeeper {
    pub fn new(backend: KioskBackend) -> Self {
        Self {
            state: Arc::new(RwLock::new(ClockState::default())),
            gate: SyncGate::new(),
            backend,
        }
    }

    /// The current best-estimate instant. Pure and non-blocking; callable at
    /// arbitrary frequency.
    pub fn now(&self) -> DateTime<Utc> {
        let state = read(&self.state);
        match state.reference {
            Some(reference) => reference.estimate(Instant::now()),
            None => Utc::now() + state.fallback_offset,
        }
    }

    /// Whether a monotonic-anchored reference is live (as opposed to the
    /// fallback offset).
    pub fn has_reference(&self) -> bool {
        read(&self.state).reference.is_some()
    }

    /// Fetches the authoritative time and replaces the reference atomically.
    ///
    /// At most one request is ever outstanding: concurrent calls attach to
    /// the in-flight attempt and observe its outcome. On failure the existing
    /// reference and fallback offset are left untouched.
    pub async fn synchronize(&self) -> SyncOutcome {
        let backend = self.backend.clone();
        let state = Arc::clone(&self.state);
        self.gate
            .join_or_run(async move {
                let before = Instant::now();
                let server_time = backend.fetch_network_time().await?;
                let after = Instant::now();
                let round_trip = after.saturating_duration_since(before);
                // The anchor is the midpoint of the round trip, the best
                // guess for when the server read its clock.
                let anchor_mono = before + round_trip / 2;
                let local_wall = Utc::now();

                let mut clock = write(&state);
                let previous_estimate = match clock.reference {
                    Some(reference) => reference.estimate(after),
                    None => local_wall + clock.fallback_offset,
                };
                clock.reference = Some(TimeReference {
                    anchor_wall: server_time,
                    anchor_mono,
                });
                clock.fallback_offset = server_time - local_wall;
                drop(clock);

                let correction = server_time - previous_estimate;
                debug!(
                    correction_ms = correction.num_milliseconds(),
                    round_trip_ms = round_trip.as_millis() as u64,
                    "time reference replaced"
                );
                Ok(SyncReport {
                    server_time,
                    correction,
                    round_trip,
                })
            })
            .await
    }
}

/// Enforces the at-most-one-outstanding-sync invariant.
///
/// The first caller becomes the leader and runs the operation; callers that
/// arrive while it is in flight subscribe to the leader's outcome instead of
/// issuing a duplicate request.
pub(crate) struct SyncGate {
    in_flight: Mutex<Option<broadcast::Sender<SyncOutcome>>>,
}

impl SyncGate {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: Mutex::new(None),
        }
    }

    pub(crate) async fn join_or_run<F>(&self, op: F) -> SyncOutcome
    where
        F: Future<Output = SyncOutcome>,
    {
        {
            let mut slot = self.in_flight.lock().await;
            if let Some(sender) = slot.as_ref() {
                let mut rx = sender.subscribe();
                drop(slot);
                return match rx.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SyncError::Interrupted),
                };
            }
            let (sender, _keepalive) = broadcast::channel(1);
            *slot = Some(sender);
        }

        let outcome = op.await;
        if let Some(sender) = self.in_flight.lock().await.take() {
            // No attached callers is fine; the send just has nowhere to go.
            sender.send(outcome.clone()).ok();
        }
        outcome
    }
}

fn clamp_to_chrono(elapsed: std::time::Duration) -> ChronoDuration {
    ChronoDuration::nanoseconds(elapsed.as_nanos().min(i64::MAX as u128) as i64)
}

fn read(state: &RwLock<ClockState>) -> RwLockReadGuard<'_, ClockState> {
    state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(state: &RwLock<ClockState>) -> RwLockWriteGuard<'_, ClockState> {
    state
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn estimate_advances_with_the_monotonic_clock() {
        let anchor_mono = Instant::now();
        let reference = TimeReference {
            anchor_wall: utc("2026-08-29T10:00:00Z"),
            anchor_mono,
        };
        let later = anchor_mono + Duration::from_secs(450);
        assert_eq!(reference.estimate(later), utc("2026-08-29T10:07:30Z"));
    }

    #[test]
    fn estimate_never_runs_backwards_before_the_anchor() {
        let anchor_mono = Instant::now() + Duration::from_secs(10);
        let reference = TimeReference {
            anchor_wall: utc("2026-08-29T10:00:00Z"),
            anchor_mono,
        };
        // A query from before the anchor clamps to the anchor itself.
        assert_eq!(reference.estimate(Instant::now()), reference.anchor_wall);
    }

    #[test]
    fn fallback_offset_shifts_the_local_wall_clock() {
        let state = ClockState {
            reference: None,
            fallback_offset: ChronoDuration::hours(1),
        };
        let estimate = Utc::now() + state.fallback_offset;
        let shifted = estimate - Utc::now();
        assert!((shifted - ChronoDuration::hours(1)).num_seconds().abs() <= 1);
    }

    #[tokio::test]
    async fn concurrent_synchronize_issues_one_request() {
        let gate = Arc::new(SyncGate::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let op = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(SyncReport {
                server_time: utc("2026-08-29T10:00:00Z"),
                correction: ChronoDuration::zero(),
                round_trip: Duration::from_millis(5),
            })
        };

        let (first, second) = tokio::join!(
            gate.join_or_run(op(Arc::clone(&calls))),
            gate.join_or_run(op(Arc::clone(&calls))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one network call");
        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.server_time, second.server_time);
        assert_eq!(first.round_trip, second.round_trip);
    }

    #[tokio::test]
    async fn gate_is_reusable_after_completion() {
        let gate = SyncGate::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let outcome = gate
                .join_or_run(async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::Network("down".into()))
                })
                .await;
            assert_eq!(outcome, Err(SyncError::Network("down".into())));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_sync_leaves_state_untouched() {
        // Exercised through the gate: a failure outcome carries no state
        // mutation with it, so the keeper's estimate path is unchanged.
        let state = Arc::new(RwLock::new(ClockState {
            reference: None,
            fallback_offset: ChronoDuration::minutes(5),
        }));
        let gate = SyncGate::new();
        let outcome = gate
            .join_or_run(async { Err(SyncError::Payload("nan".into())) })
            .await;
        assert!(outcome.is_err());
        assert_eq!(read(&state).fallback_offset, ChronoDuration::minutes(5));
        assert!(read(&state).reference.is_none());
    }
}
