//! The break state machine.
//!
//! A pure function of `(instant-of-day, schedule, previous snapshot)`. It
//! performs no I/O; the tick driver acts on the returned [`Transition`] tag
//! (audio cue, transition broadcast) so the machine itself stays trivially
//! testable.

use crate::schedule::{BreakWindow, Schedule};
use chrono::{NaiveTime, Timelike};

/// Whether the display is currently inside a break window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Active,
}

/// The evaluated break state for one tick. Recomputed every tick, never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct BreakSnapshot {
    /// The window containing the evaluated instant, if any.
    pub active: Option<BreakWindow>,
    /// How far through the active window the instant falls, in `[0, 1]`.
    /// `None` while idle.
    pub progress: Option<f64>,
    pub phase: Phase,
}

/// The observable edge produced by one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No phase change; also covers re-ticks inside the same window.
    None,
    /// Idle→Active, or a direct handoff into a different window. Fires once
    /// per distinct window id per continuous occupancy.
    Entered,
    /// Active→Idle.
    Exited,
}

/// Evaluates the schedule at the given instant-of-day.
///
/// Window bounds are inclusive on both ends. If several windows match (the
/// upstream admin workflow validates non-overlap, so this is an edge case,
/// not the norm), the first in schedule order wins deterministically.
pub fn evaluate(
    instant: NaiveTime,
    schedule: &Schedule,
    previous: &BreakSnapshot,
) -> (BreakSnapshot, Transition) {
    let matched = schedule
        .windows
        .iter()
        .find(|w| contains(w, instant))
        .cloned();

    let snapshot = match &matched {
        Some(window) => BreakSnapshot {
            progress: Some(progress_within(window, instant)),
            active: matched.clone(),
            phase: Phase::Active,
        },
        None => BreakSnapshot::default(),
    };

    let previous_id = previous.active.as_ref().map(|w| w.id);
    let current_id = snapshot.active.as_ref().map(|w| w.id);
    let transition = match (previous_id, current_id) {
        (None, Some(_)) => Transition::Entered,
        (Some(a), Some(b)) if a != b => Transition::Entered,
        (Some(_), None) => Transition::Exited,
        _ => Transition::None,
    };

    (snapshot, transition)
}

/// Inclusive containment check. Windows with `start > end` never match.
fn contains(window: &BreakWindow, instant: NaiveTime) -> bool {
    window.start <= window.end && window.start <= instant && instant <= window.end
}

/// Elapsed fraction of the window, clamped to `[0, 1]`. A zero-length window
/// counts as fully elapsed rather than dividing by zero.
fn progress_within(window: &BreakWindow, instant: NaiveTime) -> f64 {
    let start = seconds_of_day(window.start);
    let end = seconds_of_day(window.end);
    if end <= start {
        return 1.0;
    }
    ((seconds_of_day(instant) - start) / (end - start)).clamp(0.0, 1.0)
}

fn seconds_of_day(time: NaiveTime) -> f64 {
    f64::from(time.num_seconds_from_midnight()) + f64::from(time.nanosecond()) / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn window(id: i64, start: NaiveTime, end: NaiveTime) -> BreakWindow {
        BreakWindow {
            id,
            start,
            end,
            description: String::new(),
        }
    }

    fn schedule(windows: Vec<BreakWindow>) -> Schedule {
        Schedule {
            windows,
            revision: 1,
        }
    }

    fn idle() -> BreakSnapshot {
        BreakSnapshot::default()
    }

    #[test]
    fn empty_schedule_stays_idle() {
        let (snapshot, transition) = evaluate(t(10, 0, 0), &Schedule::default(), &idle());
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(snapshot.active.is_none());
        assert!(snapshot.progress.is_none());
        assert_eq!(transition, Transition::None);
    }

    #[test]
    fn midpoint_progress_is_half() {
        // 10:00–10:15 at 10:07:30 => 7.5 / 15 = 0.5.
        let sched = schedule(vec![window(1, t(10, 0, 0), t(10, 15, 0))]);
        let (snapshot, transition) = evaluate(t(10, 7, 30), &sched, &idle());
        assert_eq!(snapshot.phase, Phase::Active);
        assert_eq!(transition, Transition::Entered);
        let progress = snapshot.progress.unwrap();
        assert!((progress - 0.5).abs() < 1e-9, "expected 0.5, got {progress}");
    }

    #[test]
    fn progress_is_zero_at_start_and_one_at_end() {
        let sched = schedule(vec![window(1, t(10, 0, 0), t(10, 15, 0))]);
        let (at_start, _) = evaluate(t(10, 0, 0), &sched, &idle());
        assert_eq!(at_start.progress, Some(0.0));
        // Inclusive on the end bound.
        let (at_end, _) = evaluate(t(10, 15, 0), &sched, &idle());
        assert_eq!(at_end.progress, Some(1.0));
        assert_eq!(at_end.phase, Phase::Active);
    }

    #[test]
    fn progress_is_monotonic_within_a_window() {
        let sched = schedule(vec![window(1, t(10, 0, 0), t(10, 15, 0))]);
        let mut previous = idle();
        let mut last_progress = -1.0;
        for second in 0..=(15 * 60) {
            let instant = t(10, 0, 0) + chrono::Duration::seconds(second);
            let (snapshot, _) = evaluate(instant, &sched, &previous);
            let progress = snapshot.progress.unwrap();
            assert!(
                progress >= last_progress,
                "progress regressed at +{second}s: {progress} < {last_progress}"
            );
            last_progress = progress;
            previous = snapshot;
        }
    }

    #[test]
    fn enter_fires_once_per_occupancy() {
        let sched = schedule(vec![window(1, t(10, 0, 0), t(10, 15, 0))]);
        let (first, transition) = evaluate(t(10, 1, 0), &sched, &idle());
        assert_eq!(transition, Transition::Entered);
        // Re-ticking inside the same window must not re-fire.
        let (second, transition) = evaluate(t(10, 2, 0), &sched, &first);
        assert_eq!(transition, Transition::None);
        let (_, transition) = evaluate(t(10, 3, 0), &sched, &second);
        assert_eq!(transition, Transition::None);
    }

    #[test]
    fn exit_fires_exactly_once_after_the_window() {
        let sched = schedule(vec![window(1, t(10, 0, 0), t(10, 15, 0))]);
        let (inside, _) = evaluate(t(10, 7, 30), &sched, &idle());
        let (outside, transition) = evaluate(t(10, 16, 0), &sched, &inside);
        assert_eq!(outside.phase, Phase::Idle);
        assert_eq!(transition, Transition::Exited);
        let (_, transition) = evaluate(t(10, 17, 0), &sched, &outside);
        assert_eq!(transition, Transition::None);
    }

    #[test]
    fn degenerate_window_is_fully_elapsed_and_fires_a_pair() {
        let sched = schedule(vec![window(1, t(12, 0, 0), t(12, 0, 0))]);
        let (snapshot, transition) = evaluate(t(12, 0, 0), &sched, &idle());
        assert_eq!(transition, Transition::Entered);
        assert_eq!(snapshot.progress, Some(1.0));
        let (_, transition) = evaluate(t(12, 0, 1), &sched, &snapshot);
        assert_eq!(transition, Transition::Exited);
    }

    #[test]
    fn first_matching_window_wins_deterministically() {
        // Overlap is an upstream validation bug; the engine must still pick
        // the same window every time.
        let sched = schedule(vec![
            window(1, t(10, 0, 0), t(10, 30, 0)),
            window(2, t(10, 15, 0), t(10, 45, 0)),
        ]);
        let (snapshot, _) = evaluate(t(10, 20, 0), &sched, &idle());
        assert_eq!(snapshot.active.unwrap().id, 1);
    }

    #[test]
    fn adjacent_handoff_enters_the_new_window() {
        let sched = schedule(vec![
            window(1, t(10, 0, 0), t(10, 15, 0)),
            window(2, t(10, 15, 1), t(10, 30, 0)),
        ]);
        let (in_first, _) = evaluate(t(10, 14, 0), &sched, &idle());
        let (in_second, transition) = evaluate(t(10, 15, 1), &sched, &in_first);
        assert_eq!(in_second.active.unwrap().id, 2);
        assert_eq!(transition, Transition::Entered);
    }

    #[test]
    fn inverted_window_never_matches() {
        let sched = schedule(vec![window(1, t(18, 0, 0), t(6, 0, 0))]);
        for hour in [0, 5, 12, 19, 23] {
            let (snapshot, _) = evaluate(t(hour, 0, 0), &sched, &idle());
            assert_eq!(snapshot.phase, Phase::Idle, "hour {hour}");
        }
    }

    #[test]
    fn backward_correction_yields_one_transition_per_tick() {
        // A sync that steps the estimate backwards out of the window produces
        // a single Exited, then a single Entered when it re-enters; never two
        // edges in one evaluation.
        let sched = schedule(vec![window(1, t(10, 0, 0), t(10, 15, 0))]);
        let (inside, transition) = evaluate(t(10, 5, 0), &sched, &idle());
        assert_eq!(transition, Transition::Entered);
        let (before, transition) = evaluate(t(9, 58, 0), &sched, &inside);
        assert_eq!(transition, Transition::Exited);
        let (_, transition) = evaluate(t(10, 0, 30), &sched, &before);
        assert_eq!(transition, Transition::Entered);
    }

    #[test]
    fn zero_or_one_window_matches_under_disjoint_schedule() {
        let sched = schedule(vec![
            window(1, t(9, 0, 0), t(9, 10, 0)),
            window(2, t(12, 0, 0), t(12, 45, 0)),
            window(3, t(15, 30, 0), t(15, 40, 0)),
        ]);
        for (instant, expected) in [
            (t(8, 59, 59), None),
            (t(9, 0, 0), Some(1)),
            (t(9, 10, 0), Some(1)),
            (t(9, 10, 1), None),
            (t(12, 30, 0), Some(2)),
            (t(15, 35, 0), Some(3)),
            (t(23, 59, 59), None),
        ] {
            let (snapshot, _) = evaluate(instant, &sched, &idle());
            assert_eq!(snapshot.active.map(|w| w.id), expected, "at {instant}");
        }
    }
}
