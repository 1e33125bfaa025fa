//! Typed failures for the engine's recoverable error taxonomy.
//!
//! None of these are fatal to the tick loop: sync failures keep the last good
//! time reference, fetch failures fall back to the durable cache, cache misses
//! leave the schedule empty, and playback failures degrade to the built-in
//! cue. Binaries use `anyhow` on top of these.

use thiserror::Error;

/// A time-synchronization attempt that did not produce a usable reference.
///
/// `Clone` because the outcome of a single in-flight sync is shared with every
/// caller that attached to it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The time endpoint was unreachable or answered non-2xx.
    #[error("time endpoint unreachable: {0}")]
    Network(String),
    /// The response body was malformed, missing the field, or non-finite.
    #[error("invalid time payload: {0}")]
    Payload(String),
    /// The in-flight sync this call attached to went away without a result.
    #[error("sync interrupted before completion")]
    Interrupted,
}

/// A configuration or signal-settings fetch that failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The endpoint was unreachable or answered non-2xx.
    #[error("config endpoint unreachable: {0}")]
    Network(String),
    /// The response body could not be decoded.
    #[error("invalid config payload: {0}")]
    Payload(String),
}

/// A durable-cache read that produced no usable data.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No cached copy exists on disk.
    #[error("no cached copy available")]
    Miss,
    /// The cached copy exists but could not be read.
    #[error("cache read failed: {0}")]
    Io(String),
    /// The cached copy exists but could not be decoded.
    #[error("cache corrupt: {0}")]
    Corrupt(String),
}

/// An audio cue that could not be played.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No usable output device or sink.
    #[error("audio device unavailable: {0}")]
    Device(String),
    /// The configured sound could not be opened or decoded.
    #[error("sound not playable: {0}")]
    Decode(String),
}
