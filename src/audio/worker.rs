//! One playback session: sink + reader + transfer for a single track.

use thiserror::Error;
use tracing::{debug, info};

use super::cancel::{CancelCause, CancelToken};
use super::reader::{FormatReader, ReaderError};
use super::sink::{AudioOutput, SinkError, SinkParams};
use super::transfer::{TransferError, transfer};
use crate::library::Track;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("cannot open audio sink: {0}")]
    Sink(#[from] SinkError),
    #[error("cannot open track: {0}")]
    Reader(#[from] ReaderError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl PlaybackError {
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            Self::Transfer(e) => e.cancel_cause(),
            _ => None,
        }
    }
}

/// Play `track` until it ends or `cancel` fires.
///
/// A paused track resumes from its stored position. Only a pause keeps the
/// resume point; every other outcome rewinds the track.
pub fn play_track(
    output: &dyn AudioOutput,
    buffer_size: usize,
    cancel: &CancelToken,
    track: &Track,
) -> Result<(), PlaybackError> {
    let result = run_session(output, buffer_size, cancel, track);
    match &result {
        Err(PlaybackError::Transfer(TransferError::Cancelled(CancelCause::Pause))) => {
            track.set_paused(true);
            debug!(track = track.name(), position = track.position(), "paused");
        }
        _ => track.rewind(),
    }
    result
}

fn run_session(
    output: &dyn AudioOutput,
    buffer_size: usize,
    cancel: &CancelToken,
    track: &Track,
) -> Result<(), PlaybackError> {
    let mut sink = output.open(&SinkParams::for_track(track, buffer_size))?;
    let mut reader = FormatReader::open(track)?;

    if track.is_paused() {
        let resumed = reader.seek(track.position())?;
        track.set_position(resumed);
    }
    info!(
        track = track.name(),
        from = reader.position(),
        length = reader.length(),
        duration = reader.duration_seconds(),
        "playing"
    );

    transfer(cancel, sink.as_mut(), &mut reader, track)?;
    sink.drain();
    Ok(())
}
