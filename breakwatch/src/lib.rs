//! # Breakwatch
//!
//! A drift-corrected, event-driven break-clock engine for unattended kiosk
//! displays.
//!
//! Breakwatch keeps many independently-running displays showing a consistent
//! clock and consistent break cues without any coordination between them: each
//! engine instance anchors the backend's notion of time to a local monotonic
//! timer, evaluates the configured break schedule every tick, and degrades
//! gracefully when the network, the time source, or the configuration source
//! goes away.
//!
//! ## Core Concepts
//!
//! - **TimeKeeper**: the drift-corrected time reference. A successful sync
//!   anchors server time to a monotonic instant; until then a fallback offset
//!   over the local wall clock is used.
//! - **ScheduleCache**: the committed break schedule and cue settings, with a
//!   durable on-disk fallback for offline boots.
//! - **Break state machine**: a pure per-tick evaluation producing the active
//!   window, a progress fraction, and a one-shot transition tag.
//! - **Event-Driven**: consumers subscribe to the engine's broadcast streams
//!   (`RenderFrame`, `TransitionEvent`, `SystemEvent`) to paint the display,
//!   play cues, or log diagnostics.
//! - **Configuration-Driven**: endpoints, periods, timezone, and clock format
//!   come from a `BreakwatchConfig`, typically loaded from `breakwatch.toml`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use breakwatch::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BreakwatchConfig::default();
//!     let engine = BreakwatchEngine::new(config)?;
//!
//!     // Subscribe before starting the engine.
//!     let mut frames = engine.subscribe_frames();
//!     tokio::spawn(async move {
//!         while let Ok(frame) = frames.recv().await {
//!             println!("{} {}", frame.clock_text, frame.phase_label);
//!         }
//!     });
//!
//!     // Runs until Ctrl+C.
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Breakwatch Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cache;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod net;
pub mod schedule;
pub mod state;
pub mod time;

/// A prelude module for easy importing of the most common Breakwatch types.
pub mod prelude {
    pub use crate::cache::Connectivity;
    pub use crate::config::BreakwatchConfig;
    pub use crate::engine::BreakwatchEngine;
    pub use crate::events::{RenderFrame, SystemEvent, TransitionEvent};
    pub use crate::schedule::{BreakWindow, Schedule, SignalSettings, SoundRef};
    pub use crate::state::{BreakSnapshot, Phase, Transition};
}
