//! Chunked copy from a track reader into an audio sink.

use std::io::{self, Read, Write};

use thiserror::Error;

use super::cancel::{CancelCause, CancelToken};
use crate::library::Track;

/// Bytes moved per iteration. Cancellation is observed between chunks.
pub const CHUNK_SIZE: usize = 1024;

/// A reader that knows its own offset in reader units.
pub trait PcmSource: Read {
    fn position(&self) -> u64;
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("playback cancelled: {0:?}")]
    Cancelled(CancelCause),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransferError {
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            Self::Cancelled(cause) => Some(*cause),
            Self::Io(_) => None,
        }
    }
}

/// Copy `reader` into `sink` until the source is exhausted or `cancel`
/// fires, recording the reader offset on `track` after every chunk.
///
/// A short final chunk is written as-is. After a cancel the track position
/// equals the offset of the first byte that was not written.
pub fn transfer<W, R>(
    cancel: &CancelToken,
    sink: &mut W,
    reader: &mut R,
    track: &Track,
) -> Result<(), TransferError>
where
    W: Write + ?Sized,
    R: PcmSource + ?Sized,
{
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        if let Some(cause) = cancel.cause() {
            return Err(TransferError::Cancelled(cause));
        }

        let n = read_full(reader, &mut buf)?;
        if n == 0 {
            return Ok(());
        }
        sink.write_all(&buf[..n])?;
        track.set_position(reader.position());
    }
}

/// Fill `buf` as far as the reader allows. Returns less than `buf.len()`
/// only at end of stream.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
