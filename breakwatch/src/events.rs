//! Public event types broadcast by the engine.
//!
//! Consumers subscribe to the streams they care about: the display layer
//! takes [`RenderFrame`]s, audio/logging hooks take [`TransitionEvent`]s, and
//! observability tooling takes [`SystemEvent`]s.

use crate::cache::Connectivity;
use crate::state::Transition;
use chrono::{DateTime, Utc};

/// The render contract, published once per tick.
///
/// The visual layer is a pure consumer of this snapshot; everything it paints
/// is derived from these fields.
#[derive(Debug, Clone)]
pub struct RenderFrame {
    /// Formatted clock readout (`HH:MM` or `HH:MM:SS` per config).
    pub clock_text: String,
    /// `""` while idle, `"ACTIVE"` during a break.
    pub phase_label: &'static str,
    /// Elapsed fraction of the active break, `0.0` while idle.
    pub progress: f64,
    /// Label of the active break window, empty while idle.
    pub banner: String,
    pub connectivity: Connectivity,
    /// The drift-corrected instant this frame was evaluated at.
    pub timestamp: DateTime<Utc>,
}

/// A break phase edge, published when the state machine fires one.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    pub transition: Transition,
    /// Id of the window entered, or of none on exit.
    pub window_id: Option<i64>,
    pub at: DateTime<Utc>,
}

/// Events about the engine itself, for logging and diagnostics.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the engine's run loop begins ticking.
    EngineStarted,
    /// Fired once when the engine is shutting down.
    EngineShutdown,
    /// A time sync completed and replaced the reference.
    SyncApplied {
        /// Signed estimate correction in milliseconds.
        correction_ms: i64,
    },
    /// A time sync failed; the previous reference or fallback stays live.
    SyncFailed { reason: String },
    /// A schedule refresh committed fresh or cached data.
    ScheduleRefreshed {
        windows: usize,
        connectivity: Connectivity,
    },
    /// The tick driver observed a wall-clock step or sleep gap and triggered
    /// an out-of-band resync.
    ClockAnomaly { gap_ms: i64 },
}
