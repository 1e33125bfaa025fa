//! The signal dispatcher: audible cues for break transitions.
//!
//! Audio is a best-effort side channel. The dispatcher owns a dedicated
//! thread holding the output stream; the engine sends it fire-and-forget
//! commands and never blocks on playback. A configured cue that is missing or
//! undecodable degrades to a built-in synthesized chime, and any failure
//! beyond that is logged and swallowed.

use crate::error::PlaybackError;
use crate::schedule::{SignalSettings, SoundRef};
use crate::state::Transition;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::f32::consts::PI;
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Which cue to play.
#[derive(Debug, Clone, Copy)]
enum Cue {
    Enter,
    Exit,
}

#[derive(Debug)]
enum Command {
    Play { cue: Cue, sound: Option<SoundRef> },
}

/// Handle to the audio thread. Cloning shares the same thread.
#[derive(Debug, Clone)]
pub struct SignalDispatcher {
    tx: mpsc::UnboundedSender<Command>,
}

impl SignalDispatcher {
    /// Spawns the audio thread and returns a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("breakwatch-audio".into())
            .spawn(move || audio_loop(rx));
        if let Err(err) = spawned {
            warn!(%err, "could not start audio thread; cues disabled");
        }
        Self { tx }
    }

    /// Queues the cue for the given transition. Never blocks, never fails the
    /// caller.
    pub fn fire(&self, transition: Transition, settings: &SignalSettings) {
        let (cue, sound) = match transition {
            Transition::Entered => (Cue::Enter, settings.on_enter.clone()),
            Transition::Exited => (Cue::Exit, settings.on_exit.clone()),
            Transition::None => return,
        };
        if self.tx.send(Command::Play { cue, sound }).is_err() {
            warn!("audio thread gone; dropping cue");
        }
    }
}

fn audio_loop(mut rx: mpsc::UnboundedReceiver<Command>) {
    let (stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(err) => {
            warn!(%err, "no audio output device; cues disabled");
            // Keep draining so senders never notice.
            while rx.blocking_recv().is_some() {}
            return;
        }
    };
    // The stream must stay alive for the handle to produce sound.
    let _stream = stream;

    while let Some(Command::Play { cue, sound }) = rx.blocking_recv() {
        if let Err(err) = play(&handle, cue, sound.as_ref()) {
            warn!(%err, "cue playback failed");
        }
    }
}

fn play(
    handle: &OutputStreamHandle,
    cue: Cue,
    sound: Option<&SoundRef>,
) -> Result<(), PlaybackError> {
    let sink = Sink::try_new(handle).map_err(|e| PlaybackError::Device(e.to_string()))?;
    match sound {
        Some(sound) => match open_decoder(&sound.location) {
            Ok(decoder) => {
                sink.set_volume(f32::from(sound.volume.min(100)) / 100.0);
                sink.append(decoder);
                debug!(location = %sound.location, "playing configured cue");
            }
            Err(err) => {
                warn!(%err, location = %sound.location, "configured cue unplayable; using built-in");
                sink.append(Chime::for_cue(cue));
            }
        },
        None => sink.append(Chime::for_cue(cue)),
    }
    sink.detach();
    Ok(())
}

fn open_decoder(location: &str) -> Result<Decoder<BufReader<File>>, PlaybackError> {
    let path = location.strip_prefix("file://").unwrap_or(location);
    let file = File::open(path).map_err(|e| PlaybackError::Decode(e.to_string()))?;
    Decoder::new(BufReader::new(file)).map_err(|e| PlaybackError::Decode(e.to_string()))
}

/// The built-in fallback cue: a short decaying sine tone, higher-pitched for
/// entering a break than for leaving it.
struct Chime {
    frequency: f32,
    sample_rate: u32,
    position: usize,
    total: usize,
}

impl Chime {
    fn new(frequency: f32, length: Duration) -> Self {
        let sample_rate = 44_100;
        Self {
            frequency,
            sample_rate,
            position: 0,
            total: (length.as_secs_f32() * sample_rate as f32) as usize,
        }
    }

    fn for_cue(cue: Cue) -> Self {
        match cue {
            Cue::Enter => Self::new(880.0, Duration::from_millis(350)),
            Cue::Exit => Self::new(440.0, Duration::from_millis(350)),
        }
    }
}

impl Iterator for Chime {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.total {
            return None;
        }
        let t = self.position as f32 / self.sample_rate as f32;
        // Linear decay envelope avoids a click at the end.
        let envelope = 1.0 - self.position as f32 / self.total as f32;
        self.position += 1;
        Some((2.0 * PI * self.frequency * t).sin() * 0.25 * envelope)
    }
}

impl Source for Chime {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total as f32 / self.sample_rate as f32,
        ))
    }
}
