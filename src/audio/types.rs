//! Small shared types of the playback engine: the state snapshot served to
//! the control surface and the engine's error type.

use std::io;

use serde::Serialize;
use thiserror::Error;

use super::queue::QueueFull;
use crate::library::Track;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Point-in-time view of the current track.
pub struct PlayerState {
    pub is_playing: bool,
    /// Path of the current track.
    pub name: String,
    /// Resume point, in reader units.
    pub position: u64,
    pub length: u64,
    /// Total duration in seconds.
    pub duration: u64,
    /// Elapsed seconds, derived from `position / length`.
    pub duration_current: u64,
}

impl PlayerState {
    pub fn of(track: &Track, is_playing: bool) -> Self {
        let position = track.position();
        let length = track.length;
        let duration = track.duration_seconds;
        let duration_current = if length > 0 {
            (u128::from(duration) * u128::from(position) / u128::from(length)) as u64
        } else {
            duration
        };

        Self {
            is_playing,
            name: track.path.display().to_string(),
            position,
            length,
            duration,
            duration_current,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("the catalog is empty")]
    EmptyCatalog,
    #[error("no track at index {0}")]
    UnknownTrack(usize),
    #[error("unknown tag {0}")]
    UnknownTag(String),
    #[error(transparent)]
    QueueFull(#[from] QueueFull),
    #[error("audio output unavailable")]
    OutputUnavailable,
    #[error("cannot start playback worker: {0}")]
    Spawn(#[source] io::Error),
}
