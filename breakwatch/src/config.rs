//! Engine configuration.
//!
//! Every knob has a serde default so a bare `breakwatch.toml` (or none at
//! all) yields a working engine pointed at the local backend. Values can also
//! be overridden through `BREAKWATCH_*` environment variables.
//!
//! Historical revisions of this engine disagreed on the refresh period (five
//! minutes vs. one minute) and on whether the clock shows seconds; both are
//! knobs here rather than constants.

use chrono_tz::Tz;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct BreakwatchConfig {
    /// Network-time endpoint returning `{ "ntp_time": <epoch seconds> }`.
    #[serde(default = "default_time_url")]
    pub time_url: String,

    /// Configuration endpoint returning `{ "breaks": [...] }`.
    #[serde(default = "default_config_url")]
    pub config_url: String,

    /// Signal-settings endpoint returning the transition cues.
    #[serde(default = "default_signals_url")]
    pub signals_url: String,

    /// Visual tick period in milliseconds.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Period between schedule refreshes and time resyncs, in seconds.
    #[serde(default = "default_refresh_period_secs")]
    pub refresh_period_secs: u64,

    /// How far successive ticks may deviate from the tick period before the
    /// wall clock is considered stepped (or the device slept) and an
    /// out-of-band resync fires, in seconds.
    #[serde(default = "default_anomaly_slack_secs")]
    pub anomaly_slack_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Whether the clock readout includes seconds.
    #[serde(default = "default_show_seconds")]
    pub show_seconds: bool,

    /// IANA timezone for time-of-day evaluation and the clock readout.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Override for the durable cache directory. Defaults to the per-user
    /// data directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl BreakwatchConfig {
    /// Loads `breakwatch.toml` from the working directory (optional) with
    /// `BREAKWATCH_*` environment overrides on top.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("breakwatch").required(false))
            .add_source(config::Environment::with_prefix("BREAKWATCH"))
            .build()?
            .try_deserialize()
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs.max(1))
    }

    pub fn anomaly_slack(&self) -> Duration {
        Duration::from_secs(self.anomaly_slack_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// `strftime` format for the clock readout.
    pub fn clock_format(&self) -> &'static str {
        if self.show_seconds {
            "%H:%M:%S"
        } else {
            "%H:%M"
        }
    }
}

impl Default for BreakwatchConfig {
    fn default() -> Self {
        Self {
            time_url: default_time_url(),
            config_url: default_config_url(),
            signals_url: default_signals_url(),
            tick_period_ms: default_tick_period_ms(),
            refresh_period_secs: default_refresh_period_secs(),
            anomaly_slack_secs: default_anomaly_slack_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            show_seconds: default_show_seconds(),
            timezone: default_timezone(),
            cache_dir: None,
        }
    }
}

// --- Default value functions for serde ---

fn default_time_url() -> String {
    "http://localhost:5000/api/ntp".to_string()
}

fn default_config_url() -> String {
    "http://localhost:5000/api/config".to_string()
}

fn default_signals_url() -> String {
    "http://localhost:5000/api/signals".to_string()
}

fn default_tick_period_ms() -> u64 {
    1000
}

fn default_refresh_period_secs() -> u64 {
    60
}

fn default_anomaly_slack_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_show_seconds() -> bool {
    true
}

fn default_timezone() -> Tz {
    Tz::UTC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_for_a_sparse_file() {
        let parsed: BreakwatchConfig =
            toml::from_str("refresh_period_secs = 300\nshow_seconds = false").unwrap();
        assert_eq!(parsed.refresh_period(), Duration::from_secs(300));
        assert_eq!(parsed.clock_format(), "%H:%M");
        assert_eq!(parsed.tick_period(), Duration::from_secs(1));
        assert_eq!(parsed.timezone, Tz::UTC);
    }

    #[test]
    fn timezone_parses_from_iana_name() {
        let parsed: BreakwatchConfig =
            toml::from_str("timezone = \"Europe/Berlin\"").unwrap();
        assert_eq!(parsed.timezone, Tz::Europe__Berlin);
    }
}
