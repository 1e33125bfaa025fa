//! The break schedule data model and its wire representation.
//!
//! These structs are shared by the network layer (endpoint payloads) and the
//! durable cache (the on-disk JSON uses the same shape as the wire, so a
//! cached copy is byte-compatible with a fresh fetch).

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// A single configured break window within one day.
///
/// `start <= end` is validated upstream by the admin workflow; a window that
/// violates it never matches (the engine does not wrap past midnight).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakWindow {
    pub id: i64,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    /// Free-text label shown on the display banner. May be empty.
    #[serde(default)]
    pub description: String,
}

/// The committed break schedule plus an opaque revision marker.
///
/// Owned by the schedule cache; the state machine borrows it for the duration
/// of one tick evaluation and never holds on to it.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub windows: Vec<BreakWindow>,
    /// Incremented on every committed refresh. Purely an observability aid.
    pub revision: u64,
}

/// Wire payload of the configuration endpoint, and the durable cache format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDocument {
    #[serde(default)]
    pub breaks: Vec<BreakWindow>,
}

/// A reference to an audio cue: where to find it and how loud to play it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundRef {
    /// Filesystem path of the sound asset on the kiosk.
    pub location: String,
    /// Playback volume, 0–100.
    #[serde(default = "default_volume")]
    pub volume: u8,
}

/// Audio cues attached to break transitions, as served by the signal-settings
/// endpoint. Either side may be absent, in which case the dispatcher plays its
/// built-in cue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSettings {
    #[serde(rename = "break_start", default)]
    pub on_enter: Option<SoundRef>,
    #[serde(rename = "break_end", default)]
    pub on_exit: Option<SoundRef>,
}

fn default_volume() -> u8 {
    100
}

/// Serde adapter for the `"HH:MM"` wire format of times-of-day.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|_| serde::de::Error::custom(format!("time must be HH:MM, got {raw:?}")))
    }
}
