//! Single-playback media coordinator
//!
//! At most one media element is audible at a time. Elements are created
//! lazily per item and reused across play/pause cycles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AppError;
use crate::metrics::PLAYBACK_SWITCHES_TOTAL;

/// A playable audio or video element
pub trait MediaElement: Send {
    /// Start or resume playback
    fn play(&mut self) -> Result<(), AppError>;

    fn pause(&mut self);

    /// Reset the position to the start
    fn rewind(&mut self);
}

/// Creates media elements for URLs
pub trait MediaElementFactory: Send + Sync {
    fn create(&self, url: &str) -> Result<Box<dyn MediaElement>, AppError>;
}

/// What a toggle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackChange {
    /// `id` started; `stopped` was playing before and has been rewound
    Started { id: String, stopped: Option<String> },
    /// `id` was playing and has been stopped
    Stopped { id: String },
}

#[derive(Default)]
struct PlaybackState {
    elements: HashMap<String, Box<dyn MediaElement>>,
    playing: Option<String>,
}

impl PlaybackState {
    fn stop(&mut self, id: &str) {
        if let Some(element) = self.elements.get_mut(id) {
            element.pause();
            element.rewind();
        }
    }
}

/// Single-playback media coordinator
pub struct PlaybackCoordinator {
    factory: Arc<dyn MediaElementFactory>,
    state: Mutex<PlaybackState>,
}

impl PlaybackCoordinator {
    pub fn new(factory: Arc<dyn MediaElementFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(PlaybackState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PlaybackState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("playback state poisoned")))
    }

    /// Item currently playing
    pub fn playing(&self) -> Option<String> {
        self.lock().ok().and_then(|state| state.playing.clone())
    }

    /// Play `id`, or stop it if it is the one playing
    ///
    /// Starting an item first pauses and rewinds the previous one. If the
    /// element cannot be created or refuses to play, nothing is left
    /// playing and a `Playback` error is returned.
    pub fn toggle(&self, id: &str, url: &str) -> Result<PlaybackChange, AppError> {
        let mut state = self.lock()?;

        if state.playing.as_deref() == Some(id) {
            state.stop(id);
            state.playing = None;
            tracing::debug!(id, "Playback stopped");
            return Ok(PlaybackChange::Stopped { id: id.to_string() });
        }

        let stopped = state.playing.take();
        if let Some(previous) = &stopped {
            state.stop(previous);
            PLAYBACK_SWITCHES_TOTAL.inc();
        }

        if !state.elements.contains_key(id) {
            let element = self.factory.create(url).map_err(|error| {
                tracing::warn!(id, %error, "Failed to create media element");
                AppError::Playback(error.to_string())
            })?;
            state.elements.insert(id.to_string(), element);
        }

        let played = match state.elements.get_mut(id) {
            Some(element) => element.play(),
            None => Err(AppError::Playback(format!("no element for {id}"))),
        };
        if let Err(error) = played {
            tracing::warn!(id, %error, "Failed to play media");
            return Err(AppError::Playback(error.to_string()));
        }

        state.playing = Some(id.to_string());
        tracing::debug!(id, stopped = stopped.as_deref(), "Playback started");
        Ok(PlaybackChange::Started {
            id: id.to_string(),
            stopped,
        })
    }

    /// Playback of `id` reached its natural end
    pub fn on_ended(&self, id: &str) {
        if let Ok(mut state) = self.lock() {
            if state.playing.as_deref() == Some(id) {
                state.playing = None;
            }
        }
    }

    /// Number of elements created so far
    pub fn element_count(&self) -> usize {
        self.lock().map(|state| state.elements.len()).unwrap_or(0)
    }

    /// Stop everything and drop all elements
    pub fn teardown(&self) {
        if let Ok(mut state) = self.lock() {
            if let Some(id) = state.playing.take() {
                state.stop(&id);
            }
            state.elements.clear();
        }
    }
}
