//! Trait-based playback backends.
//!
//! The core mandates no transport or codec: a backend resolves opaque
//! section URLs and owns the single audio output while a section plays.
//! Shells that drive a real device implement [`PlaybackBackend`] themselves;
//! the backends here model start latency and output exclusivity, which is
//! what the scheduling layer above needs.

use std::collections::HashSet;
use std::fmt;

use crate::action::{PlayMethod, Section};
use crate::error::PlaybackError;

/// Default audible-start latency of the buffered backend, in milliseconds.
pub const BUFFER_LATENCY_MS: f64 = 25.0;
/// Default audible-start latency of the external backend, in milliseconds.
pub const EXTERNAL_LATENCY_MS: f64 = 120.0;

/// One playback output. At most one section is sounding at any time;
/// `start` implicitly takes the device from whatever held it.
pub trait PlaybackBackend: fmt::Debug + Send {
    fn method(&self) -> PlayMethod;

    /// Fetch/decode sections ahead of the first `start` call. Does not
    /// start playback.
    fn preload(&mut self, sections: &[Section]) -> Result<(), PlaybackError>;

    /// Begin output of `section` at `offset_secs` into the asset. Returns
    /// the latency in milliseconds between this call and perceivable sound
    /// start, which callers use to shift their response-timer origin.
    fn start(&mut self, section: &Section, offset_secs: f64) -> Result<f64, PlaybackError>;

    /// Stop any active output. Idempotent.
    fn stop(&mut self);

    /// Record an explicit user gesture, unlocking autoplay-restricted
    /// devices. Default: no-op.
    fn user_gesture(&mut self) {}
}

/// Select a backend for the requested method.
///
/// A device that cannot support the buffered (decoded) backend is forced
/// onto the external backend regardless of what was requested; `NOAUDIO`
/// always yields the no-op backend.
pub fn select_backend(requested: PlayMethod, device_capable: bool) -> Box<dyn PlaybackBackend> {
    match requested {
        PlayMethod::Noaudio => Box::new(NoAudioBackend),
        PlayMethod::Buffer if device_capable => Box::new(BufferedBackend::new()),
        PlayMethod::Buffer | PlayMethod::External => Box::new(ExternalBackend::new()),
    }
}

/// Decoded-in-memory backend. Sections must preload cleanly; start latency
/// is low and stable.
#[derive(Debug)]
pub struct BufferedBackend {
    latency_ms: f64,
    preloaded: HashSet<i64>,
    /// Autoplay lock: when set, `start` is refused until a user gesture.
    requires_gesture: bool,
    gesture_seen: bool,
    playing: bool,
}

impl BufferedBackend {
    pub fn new() -> Self {
        Self::with_latency(BUFFER_LATENCY_MS)
    }

    pub fn with_latency(latency_ms: f64) -> Self {
        Self {
            latency_ms,
            preloaded: HashSet::new(),
            requires_gesture: false,
            gesture_seen: false,
            playing: false,
        }
    }

    /// Model an autoplay-restricted output device.
    pub fn locked() -> Self {
        Self {
            requires_gesture: true,
            ..Self::new()
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl Default for BufferedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackBackend for BufferedBackend {
    fn method(&self) -> PlayMethod {
        PlayMethod::Buffer
    }

    fn preload(&mut self, sections: &[Section]) -> Result<(), PlaybackError> {
        for section in sections {
            if section.url.is_empty() {
                return Err(PlaybackError::DecodeFailed {
                    url: section.url.clone(),
                    reason: "empty asset url".into(),
                });
            }
            self.preloaded.insert(section.id);
        }
        Ok(())
    }

    fn start(&mut self, section: &Section, _offset_secs: f64) -> Result<f64, PlaybackError> {
        if self.requires_gesture && !self.gesture_seen {
            return Err(PlaybackError::AutoplayRejected);
        }
        if section.url.is_empty() {
            return Err(PlaybackError::DecodeFailed {
                url: section.url.clone(),
                reason: "empty asset url".into(),
            });
        }
        self.playing = true;
        Ok(self.latency_ms)
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn user_gesture(&mut self) {
        self.gesture_seen = true;
    }
}

/// Streaming backend for devices that cannot hold decoded buffers. Start
/// latency is higher and counted into the response-timer shift.
#[derive(Debug)]
pub struct ExternalBackend {
    latency_ms: f64,
    playing: bool,
}

impl ExternalBackend {
    pub fn new() -> Self {
        Self {
            latency_ms: EXTERNAL_LATENCY_MS,
            playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl Default for ExternalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackBackend for ExternalBackend {
    fn method(&self) -> PlayMethod {
        PlayMethod::External
    }

    fn preload(&mut self, _sections: &[Section]) -> Result<(), PlaybackError> {
        // Streaming: nothing to fetch up front.
        Ok(())
    }

    fn start(&mut self, section: &Section, _offset_secs: f64) -> Result<f64, PlaybackError> {
        if section.url.is_empty() {
            return Err(PlaybackError::DecodeFailed {
                url: section.url.clone(),
                reason: "empty asset url".into(),
            });
        }
        self.playing = true;
        Ok(self.latency_ms)
    }

    fn stop(&mut self) {
        self.playing = false;
    }
}

/// No-op backend for `NOAUDIO` turns.
#[derive(Debug)]
pub struct NoAudioBackend;

impl PlaybackBackend for NoAudioBackend {
    fn method(&self) -> PlayMethod {
        PlayMethod::Noaudio
    }

    fn preload(&mut self, _sections: &[Section]) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn start(&mut self, _section: &Section, _offset_secs: f64) -> Result<f64, PlaybackError> {
        Ok(0.0)
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: i64) -> Section {
        Section {
            id,
            url: format!("https://assets/{id}.mp3"),
        }
    }

    #[test]
    fn incapable_device_forces_external() {
        let backend = select_backend(PlayMethod::Buffer, false);
        assert_eq!(backend.method(), PlayMethod::External);
    }

    #[test]
    fn noaudio_always_noop() {
        let mut backend = select_backend(PlayMethod::Noaudio, false);
        assert_eq!(backend.method(), PlayMethod::Noaudio);
        assert_eq!(backend.start(&section(1), 0.0).unwrap(), 0.0);
    }

    #[test]
    fn locked_backend_rejects_until_gesture() {
        let mut backend = BufferedBackend::locked();
        assert!(matches!(
            backend.start(&section(1), 0.0),
            Err(PlaybackError::AutoplayRejected)
        ));
        backend.user_gesture();
        assert!(backend.start(&section(1), 0.0).is_ok());
    }

    #[test]
    fn stop_releases_output() {
        let mut backend = BufferedBackend::new();
        backend.start(&section(1), 0.0).unwrap();
        assert!(backend.is_playing());
        backend.stop();
        assert!(!backend.is_playing());
    }

    #[test]
    fn empty_url_fails_decode() {
        let mut backend = BufferedBackend::new();
        let bad = Section {
            id: 9,
            url: String::new(),
        };
        assert!(matches!(
            backend.preload(&[bad.clone()]),
            Err(PlaybackError::DecodeFailed { .. })
        ));
        assert!(matches!(
            backend.start(&bad, 0.0),
            Err(PlaybackError::DecodeFailed { .. })
        ));
    }
}
