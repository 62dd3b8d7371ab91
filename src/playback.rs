// src/playback.rs
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;

// --- DATA STRUCTURES ---

/// The proxy currently loaded for preview.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SelectedVideo {
    pub name: String,
    pub url: String,
}

/// Mirror of the media element. The element owns the real playhead; the
/// editor only records what it observes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackState {
    pub current_time: f64,
    pub duration: f64,
    pub is_playing: bool,
}

impl PlaybackState {
    /// Playhead position after seeking by `delta`, clamped to `[0, duration]`.
    pub fn seek_target(&self, delta: f64) -> f64 {
        (self.current_time + delta).clamp(0.0, self.duration.max(0.0))
    }
}

/// In/out marks in seconds on the selected video.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct CutMark {
    pub start: f64,
    pub end: f64,
}

impl CutMark {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CutPoint {
    Start,
    End,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct MediaMetadata {
    pub duration: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("media element gave up loading {0}")]
    NotReady(String),
    #[error("load of {0} was superseded by a newer load")]
    Superseded(String),
}

// --- READY SIGNAL ---

/// Resolves once the media element has negotiated metadata for `url`.
/// Dropping it does not cancel the load.
#[derive(Debug)]
pub struct MediaReady {
    url: String,
    rx: oneshot::Receiver<MediaMetadata>,
}

impl MediaReady {
    /// A pending signal plus the sender the media element completes.
    pub fn channel(url: impl Into<String>) -> (oneshot::Sender<MediaMetadata>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { url: url.into(), rx })
    }

    /// A signal that is already resolved.
    pub fn ready(url: impl Into<String>, metadata: MediaMetadata) -> Self {
        let (tx, ready) = Self::channel(url);
        let _ = tx.send(metadata);
        ready
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn wait(self) -> Result<MediaMetadata, PlaybackError> {
        self.rx.await.map_err(|_| PlaybackError::NotReady(self.url))
    }
}

// --- MEDIA ELEMENT SEAM ---

/// The playback surface the editor drives. A UI binds this to its video
/// widget and reports time/duration changes back through the `Editor::on_*`
/// observers.
pub trait MediaElement: Send + Sync {
    fn load(&self, url: &str) -> MediaReady;
    fn seek(&self, time: f64);
    fn play(&self);
    fn pause(&self);
}

#[derive(Debug, Default)]
struct HeadlessState {
    url: Option<String>,
    position: f64,
    playing: bool,
}

/// Media element without a display. Loads resolve immediately with the
/// configured duration; used by the command line front end.
#[derive(Debug, Default)]
pub struct HeadlessPlayer {
    duration: f64,
    state: Mutex<HeadlessState>,
}

impl HeadlessPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration,
            state: Mutex::default(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn loaded_url(&self) -> Option<String> {
        self.state().url.clone()
    }

    pub fn position(&self) -> f64 {
        self.state().position
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }
}

impl MediaElement for HeadlessPlayer {
    fn load(&self, url: &str) -> MediaReady {
        let mut state = self.state();
        state.url = Some(url.to_string());
        state.position = 0.0;
        state.playing = false;
        MediaReady::ready(
            url,
            MediaMetadata {
                duration: self.duration,
            },
        )
    }

    fn seek(&self, time: f64) {
        self.state().position = time;
    }

    fn play(&self) {
        self.state().playing = true;
    }

    fn pause(&self) {
        self.state().playing = false;
    }
}

/// Renders seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
