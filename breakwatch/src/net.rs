//! HTTP access to the kiosk's backend endpoints.
//!
//! One shared [`reqwest::Client`] with a short request timeout serves all
//! three GETs. Payload validation happens here so the rest of the engine only
//! ever sees typed values or typed errors.

use crate::config::BreakwatchConfig;
use crate::error::{FetchError, SyncError};
use crate::schedule::{BreakWindow, ScheduleDocument, SignalSettings};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Wire payload of the network-time endpoint.
#[derive(Debug, Deserialize)]
struct NtpPayload {
    ntp_time: f64,
}

/// The engine's view of the backend: three read-only endpoints.
#[derive(Debug, Clone)]
pub struct KioskBackend {
    client: reqwest::Client,
    time_url: String,
    config_url: String,
    signals_url: String,
}

impl KioskBackend {
    pub fn new(config: &BreakwatchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            time_url: config.time_url.clone(),
            config_url: config.config_url.clone(),
            signals_url: config.signals_url.clone(),
        })
    }

    /// GETs the authoritative time as `{ "ntp_time": <epoch seconds> }`.
    ///
    /// Non-2xx, a missing field, or a non-finite value all count as failure;
    /// the caller keeps its previous reference.
    pub async fn fetch_network_time(&self) -> Result<DateTime<Utc>, SyncError> {
        let response = self
            .client
            .get(&self.time_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SyncError::Network(e.to_string()))?;
        let payload: NtpPayload = response
            .json()
            .await
            .map_err(|e| SyncError::Payload(e.to_string()))?;
        parse_epoch_seconds(payload.ntp_time)
    }

    /// GETs the break schedule as `{ "breaks": [...] }`.
    pub async fn fetch_breaks(&self) -> Result<Vec<BreakWindow>, FetchError> {
        let response = self
            .client
            .get(&self.config_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let document: ScheduleDocument = response
            .json()
            .await
            .map_err(|e| FetchError::Payload(e.to_string()))?;
        Ok(document.breaks)
    }

    /// GETs the transition cue settings.
    pub async fn fetch_signal_settings(&self) -> Result<SignalSettings, FetchError> {
        let response = self
            .client
            .get(&self.signals_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Network(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| FetchError::Payload(e.to_string()))
    }
}

fn parse_epoch_seconds(raw: f64) -> Result<DateTime<Utc>, SyncError> {
    if !raw.is_finite() || raw < 0.0 {
        return Err(SyncError::Payload(format!("ntp_time not usable: {raw}")));
    }
    let secs = raw.trunc() as i64;
    let nanos = (raw.fract() * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .ok_or_else(|| SyncError::Payload(format!("ntp_time out of range: {raw}")))
}
