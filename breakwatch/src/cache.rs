//! The schedule cache.
//!
//! Holds the committed break schedule and signal settings, refreshes them
//! from the backend, and keeps durable JSON copies on disk so a kiosk that
//! boots without connectivity can still show the last known schedule.
//!
//! The durable files are read and written only here.

use crate::error::{CacheError, FetchError};
use crate::net::KioskBackend;
use crate::schedule::{BreakWindow, Schedule, ScheduleDocument, SignalSettings};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Freshness of the data the engine is evaluating against.
///
/// Purely observational: evaluation semantics only change in that
/// `Unavailable` implies an empty schedule, which keeps the state machine
/// Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The last refresh succeeded.
    Connected,
    /// Serving a durable cached copy; the live source is unreachable.
    Stale,
    /// No live source and no cached copy; the schedule is empty.
    Unavailable,
}

struct CacheState {
    schedule: Arc<Schedule>,
    signals: Arc<SignalSettings>,
    connectivity: Connectivity,
}

/// Where the durable copies live.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Resolves the cache directory: the configured override, else the
    /// per-user data directory, else `./breakwatch-cache`.
    pub fn resolve(override_dir: Option<&Path>) -> Self {
        let dir = override_dir.map(Path::to_path_buf).unwrap_or_else(|| {
            ProjectDirs::from("com", "breakwatch", "breakwatch")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("breakwatch-cache"))
        });
        Self { dir }
    }

    fn schedule_path(&self) -> PathBuf {
        self.dir.join("schedule.json")
    }

    fn signals_path(&self) -> PathBuf {
        self.dir.join("signals.json")
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) {
        let persist = || -> std::io::Result<()> {
            std::fs::create_dir_all(&self.dir)?;
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(path, json)
        };
        if let Err(err) = persist() {
            // Persistence is best-effort; the in-memory commit stands.
            warn!(path = %path.display(), %err, "failed to persist cache copy");
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<T, CacheError> {
        if !path.exists() {
            return Err(CacheError::Miss);
        }
        let json = std::fs::read_to_string(path).map_err(|e| CacheError::Io(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CacheError::Corrupt(e.to_string()))
    }
}

/// Owns the committed schedule/settings and the durable fallback.
pub struct ScheduleCache {
    backend: KioskBackend,
    store: CacheStore,
    inner: RwLock<CacheState>,
}

impl ScheduleCache {
    pub fn new(backend: KioskBackend, store: CacheStore) -> Self {
        Self {
            backend,
            store,
            inner: RwLock::new(CacheState {
                schedule: Arc::new(Schedule::default()),
                signals: Arc::new(SignalSettings::default()),
                connectivity: Connectivity::Unavailable,
            }),
        }
    }

    /// The latest committed schedule. Never blocks on the network.
    pub fn current_schedule(&self) -> Arc<Schedule> {
        Arc::clone(&read(&self.inner).schedule)
    }

    /// The latest committed signal settings. Never blocks on the network.
    pub fn current_signal_settings(&self) -> Arc<SignalSettings> {
        Arc::clone(&read(&self.inner).signals)
    }

    pub fn connectivity(&self) -> Connectivity {
        read(&self.inner).connectivity
    }

    /// Fetches schedule and signal settings and commits them.
    ///
    /// On failure, falls back to the durable copies (`Stale`) or, lacking
    /// those, to an empty schedule (`Unavailable`). Returns the resulting
    /// connectivity state.
    pub async fn refresh(&self) -> Connectivity {
        let (breaks, signals) = tokio::join!(
            self.backend.fetch_breaks(),
            self.backend.fetch_signal_settings()
        );
        match breaks {
            Ok(windows) => {
                let signals = match signals {
                    Ok(settings) => settings,
                    Err(err) => {
                        // Keep whatever cue settings we already had; a break
                        // schedule without fresh cues is still worth serving.
                        warn!(%err, "signal settings fetch failed; keeping previous");
                        (*self.current_signal_settings()).clone()
                    }
                };
                self.commit_remote(windows, signals)
            }
            Err(err) => {
                warn!(%err, "schedule fetch failed; falling back to durable cache");
                self.fall_back(err)
            }
        }
    }

    /// Commits a successful fetch and persists durable copies.
    fn commit_remote(&self, windows: Vec<BreakWindow>, signals: SignalSettings) -> Connectivity {
        self.store.write_json(
            &self.store.schedule_path(),
            &ScheduleDocument {
                breaks: windows.clone(),
            },
        );
        self.store.write_json(&self.store.signals_path(), &signals);

        let mut state = write(&self.inner);
        let revision = state.schedule.revision + 1;
        state.schedule = Arc::new(Schedule { windows, revision });
        state.signals = Arc::new(signals);
        state.connectivity = Connectivity::Connected;
        info!(
            revision,
            windows = state.schedule.windows.len(),
            "schedule committed"
        );
        Connectivity::Connected
    }

    /// Loads the durable copies after a failed refresh.
    fn fall_back(&self, cause: FetchError) -> Connectivity {
        match self
            .store
            .read_json::<ScheduleDocument>(&self.store.schedule_path())
        {
            Ok(document) => {
                let signals: SignalSettings = self
                    .store
                    .read_json(&self.store.signals_path())
                    .unwrap_or_default();
                let mut state = write(&self.inner);
                let revision = state.schedule.revision + 1;
                state.schedule = Arc::new(Schedule {
                    windows: document.breaks,
                    revision,
                });
                state.signals = Arc::new(signals);
                state.connectivity = Connectivity::Stale;
                debug!(windows = state.schedule.windows.len(), "serving cached schedule");
                Connectivity::Stale
            }
            Err(miss) => {
                warn!(%cause, %miss, "no durable copy; schedule unavailable");
                let mut state = write(&self.inner);
                state.schedule = Arc::new(Schedule::default());
                state.connectivity = Connectivity::Unavailable;
                Connectivity::Unavailable
            }
        }
    }
}

fn read(lock: &RwLock<CacheState>) -> RwLockReadGuard<'_, CacheState> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(lock: &RwLock<CacheState>) -> RwLockWriteGuard<'_, CacheState> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakwatchConfig;
    use crate::schedule::SoundRef;
    use chrono::NaiveTime;

    fn temp_store(tag: &str) -> CacheStore {
        let dir = std::env::temp_dir().join(format!(
            "breakwatch-test-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        CacheStore::resolve(Some(&dir))
    }

    fn unreachable_cache(store: CacheStore) -> ScheduleCache {
        // Port 9 (discard) on localhost refuses connections immediately.
        let config = BreakwatchConfig {
            time_url: "http://127.0.0.1:9/api/ntp".into(),
            config_url: "http://127.0.0.1:9/api/config".into(),
            signals_url: "http://127.0.0.1:9/api/signals".into(),
            request_timeout_secs: 1,
            ..BreakwatchConfig::default()
        };
        ScheduleCache::new(KioskBackend::new(&config).unwrap(), store)
    }

    fn sample_window() -> BreakWindow {
        BreakWindow {
            id: 1,
            start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 15, 0).unwrap(),
            description: "Morning break".into(),
        }
    }

    #[test]
    fn commit_persists_and_bumps_revision() {
        let store = temp_store("commit");
        let cache = unreachable_cache(store.clone());

        let state = cache.commit_remote(vec![sample_window()], SignalSettings::default());
        assert_eq!(state, Connectivity::Connected);
        assert_eq!(cache.connectivity(), Connectivity::Connected);
        assert_eq!(cache.current_schedule().revision, 1);
        assert!(store.schedule_path().exists());

        let state = cache.commit_remote(vec![], SignalSettings::default());
        assert_eq!(state, Connectivity::Connected);
        assert_eq!(cache.current_schedule().revision, 2);
    }

    #[test]
    fn fall_back_serves_the_durable_copy_as_stale() {
        let store = temp_store("stale");
        // Seed the durable copy through a committed refresh.
        {
            let cache = unreachable_cache(store.clone());
            cache.commit_remote(
                vec![sample_window()],
                SignalSettings {
                    on_enter: Some(SoundRef {
                        location: "/srv/gong.ogg".into(),
                        volume: 80,
                    }),
                    on_exit: None,
                },
            );
        }
        // A fresh process that cannot reach the backend serves the copy.
        let cache = unreachable_cache(store);
        let state = cache.fall_back(FetchError::Network("refused".into()));
        assert_eq!(state, Connectivity::Stale);
        assert_eq!(cache.current_schedule().windows, vec![sample_window()]);
        assert_eq!(
            cache
                .current_signal_settings()
                .on_enter
                .as_ref()
                .map(|s| s.volume),
            Some(80)
        );
    }

    #[test]
    fn fall_back_without_a_copy_is_unavailable_and_empty() {
        let store = temp_store("miss");
        let cache = unreachable_cache(store);
        let state = cache.fall_back(FetchError::Network("refused".into()));
        assert_eq!(state, Connectivity::Unavailable);
        assert!(cache.current_schedule().windows.is_empty());
    }

    #[tokio::test]
    async fn refresh_against_a_dead_backend_degrades_without_panicking() {
        let store = temp_store("dead");
        let cache = unreachable_cache(store);
        let state = cache.refresh().await;
        assert_eq!(state, Connectivity::Unavailable);
        assert!(cache.current_schedule().windows.is_empty());
    }
}
