//! The engine that drives the whole break clock.
//!
//! [`BreakwatchEngine`] owns the time keeper, the schedule cache, and the
//! signal dispatcher, and runs the tick loop. It is designed to be cloned and
//! shared across tasks, providing a handle to the running instance; consumers
//! subscribe to its broadcast streams.

use crate::cache::{CacheStore, Connectivity, ScheduleCache};
use crate::components::signal::SignalDispatcher;
use crate::config::BreakwatchConfig;
use crate::error::FetchError;
use crate::events::{RenderFrame, SystemEvent, TransitionEvent};
use crate::net::KioskBackend;
use crate::state::{evaluate, BreakSnapshot, Transition};
use crate::time::TimeKeeper;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// The main engine handle.
#[derive(Clone)]
pub struct BreakwatchEngine {
    config: Arc<BreakwatchConfig>,
    keeper: Arc<TimeKeeper>,
    cache: Arc<ScheduleCache>,
    dispatcher: SignalDispatcher,
    frame_sender: broadcast::Sender<RenderFrame>,
    transition_sender: broadcast::Sender<TransitionEvent>,
    system_sender: broadcast::Sender<SystemEvent>,
}

impl BreakwatchEngine {
    /// Creates a new engine with the given configuration.
    pub fn new(config: BreakwatchConfig) -> Result<Self, FetchError> {
        let backend = KioskBackend::new(&config)?;
        let keeper = Arc::new(TimeKeeper::new(backend.clone()));
        let store = CacheStore::resolve(config.cache_dir.as_deref());
        let cache = Arc::new(ScheduleCache::new(backend, store));

        let (frame_sender, _) = broadcast::channel(64);
        let (transition_sender, _) = broadcast::channel(16);
        let (system_sender, _) = broadcast::channel(64);

        Ok(Self {
            config: Arc::new(config),
            keeper,
            cache,
            dispatcher: SignalDispatcher::spawn(),
            frame_sender,
            transition_sender,
            system_sender,
        })
    }

    pub fn config(&self) -> &BreakwatchConfig {
        &self.config
    }

    /// Subscribes to the per-tick render frames.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<RenderFrame> {
        self.frame_sender.subscribe()
    }

    /// Subscribes to break transitions.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<TransitionEvent> {
        self.transition_sender.subscribe()
    }

    /// Subscribes to engine diagnostics.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_sender.subscribe()
    }

    /// Runs the engine until a shutdown signal is received.
    ///
    /// Startup performs a time sync and a schedule refresh concurrently, then
    /// starts ticking regardless of how either went: with no network the
    /// clock runs off the local wall clock and whatever the durable cache
    /// held.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("BreakwatchEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);

        let (sync, connectivity) =
            tokio::join!(self.keeper.synchronize(), self.cache.refresh());
        match sync {
            Ok(report) => {
                info!(
                    correction_ms = report.correction.num_milliseconds(),
                    "initial time sync applied"
                );
                self.system_sender
                    .send(SystemEvent::SyncApplied {
                        correction_ms: report.correction.num_milliseconds(),
                    })
                    .ok();
            }
            Err(err) => {
                warn!(%err, "initial time sync failed; running on the local clock");
                self.system_sender
                    .send(SystemEvent::SyncFailed {
                        reason: err.to_string(),
                    })
                    .ok();
            }
        }
        self.system_sender
            .send(SystemEvent::ScheduleRefreshed {
                windows: self.cache.current_schedule().windows.len(),
                connectivity,
            })
            .ok();

        let ticker = self.clone();
        let tick_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { ticker.tick_loop(tick_shutdown_rx).await });

        self.system_sender.send(SystemEvent::EngineStarted).ok();
        info!(
            "Engine ticking every {:?}, refreshing every {:?}. Press Ctrl+C to shut down.",
            self.config.tick_period(),
            self.config.refresh_period()
        );
        tokio::signal::ctrl_c().await?;

        info!("Shutdown signal received.");
        shutdown_tx.send(()).ok();
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.system_sender.send(SystemEvent::EngineShutdown).ok();
        info!("BreakwatchEngine has shut down.");
        Ok(())
    }

    async fn tick_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut tick = tokio::time::interval(self.config.tick_period());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Startup already synced and refreshed; the periodic cycle begins one
        // full period out.
        let mut refresh = tokio::time::interval_at(
            TokioInstant::now() + self.config.refresh_period(),
            self.config.refresh_period(),
        );
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut previous = BreakSnapshot::default();
        let mut last_wall: Option<DateTime<Utc>> = None;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = tick.tick() => self.on_tick(&mut previous, &mut last_wall),
                _ = refresh.tick() => {
                    self.spawn_refresh();
                    self.spawn_sync("periodic");
                }
            }
        }
    }

    /// One visual tick: anomaly check, state evaluation, frame broadcast,
    /// transition side effects.
    fn on_tick(
        &self,
        previous: &mut BreakSnapshot,
        last_wall: &mut Option<DateTime<Utc>>,
    ) {
        let wall = Utc::now();
        if let Some(prev_wall) = last_wall.replace(wall) {
            let gap_ms = (wall - prev_wall).num_milliseconds();
            let expected_ms = self.config.tick_period().as_millis() as i64;
            let slack_ms = self.config.anomaly_slack().as_millis() as i64;
            if is_anomalous(gap_ms, expected_ms, slack_ms) {
                warn!(gap_ms, "wall clock stepped or device slept; resyncing");
                self.system_sender
                    .send(SystemEvent::ClockAnomaly { gap_ms })
                    .ok();
                self.spawn_sync("clock anomaly");
            }
        }

        let now = self.keeper.now();
        let local = now.with_timezone(&self.config.timezone);
        let schedule = self.cache.current_schedule();
        let (snapshot, transition) = evaluate(local.time(), &schedule, previous);

        let frame = compose_frame(
            local.format(self.config.clock_format()).to_string(),
            &snapshot,
            self.cache.connectivity(),
            now,
        );
        trace!(clock = %frame.clock_text, phase = frame.phase_label, "tick");
        self.frame_sender.send(frame).ok();

        if transition != Transition::None {
            let window_id = snapshot.active.as_ref().map(|w| w.id);
            info!(?transition, window_id, "break transition");
            self.transition_sender
                .send(TransitionEvent {
                    transition,
                    window_id,
                    at: now,
                })
                .ok();
            self.dispatcher
                .fire(transition, &self.cache.current_signal_settings());
        }

        *previous = snapshot;
    }

    /// Runs a guarded time sync off the tick path.
    fn spawn_sync(&self, trigger: &'static str) {
        let keeper = Arc::clone(&self.keeper);
        let system = self.system_sender.clone();
        tokio::spawn(async move {
            match keeper.synchronize().await {
                Ok(report) => {
                    debug!(
                        trigger,
                        correction_ms = report.correction.num_milliseconds(),
                        "time sync applied"
                    );
                    system
                        .send(SystemEvent::SyncApplied {
                            correction_ms: report.correction.num_milliseconds(),
                        })
                        .ok();
                }
                Err(err) => {
                    warn!(trigger, %err, "time sync failed");
                    system
                        .send(SystemEvent::SyncFailed {
                            reason: err.to_string(),
                        })
                        .ok();
                }
            }
        });
    }

    fn spawn_refresh(&self) {
        let cache = Arc::clone(&self.cache);
        let system = self.system_sender.clone();
        tokio::spawn(async move {
            let connectivity = cache.refresh().await;
            system
                .send(SystemEvent::ScheduleRefreshed {
                    windows: cache.current_schedule().windows.len(),
                    connectivity,
                })
                .ok();
        });
    }
}

/// Successive ticks should land one tick period apart; a gap well outside
/// that (in either direction) means the wall clock was stepped or the device
/// slept.
fn is_anomalous(gap_ms: i64, expected_ms: i64, slack_ms: i64) -> bool {
    (gap_ms - expected_ms).abs() > slack_ms
}

fn compose_frame(
    clock_text: String,
    snapshot: &BreakSnapshot,
    connectivity: Connectivity,
    timestamp: DateTime<Utc>,
) -> RenderFrame {
    RenderFrame {
        clock_text,
        phase_label: match snapshot.phase {
            crate::state::Phase::Active => "ACTIVE",
            crate::state::Phase::Idle => "",
        },
        progress: snapshot.progress.unwrap_or(0.0),
        banner: snapshot
            .active
            .as_ref()
            .map(|w| w.description.clone())
            .unwrap_or_default(),
        connectivity,
        timestamp,
    }
}
