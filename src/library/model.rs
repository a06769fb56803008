use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::format::{AudioFormat, Metadata, Probe, TrackError, probe};

/// One playable catalog item.
///
/// Everything except the resume point is fixed when the catalog is built.
/// `position` and `paused` are written by the playback worker (and the jump
/// command) while other threads read them for state snapshots.
#[derive(Debug)]
pub struct Track {
    pub path: PathBuf,
    pub metadata: Metadata,
    /// Stream length in reader units: file bytes for WAV, decoded PCM bytes
    /// for MP3 and OGG.
    pub length: u64,
    pub duration_seconds: u64,
    position: AtomicU64,
    paused: AtomicBool,
}

impl Track {
    pub fn new(path: PathBuf, probe: Probe) -> Self {
        Self {
            path,
            metadata: probe.metadata,
            length: probe.length,
            duration_seconds: probe.duration_seconds,
            position: AtomicU64::new(0),
            paused: AtomicBool::new(false),
        }
    }

    /// Build a track from a file on disk, probing its container.
    pub fn open(path: &Path) -> Result<Self, TrackError> {
        if !path.is_file() {
            return Err(TrackError::NotAFile(path.to_path_buf()));
        }
        Ok(Self::new(path.to_path_buf(), probe(path)?))
    }

    pub fn format(&self) -> AudioFormat {
        self.metadata.format
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Store a new resume point, clamped to the track length.
    pub fn set_position(&self, position: u64) {
        self.position
            .store(position.min(self.length), Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// Drop the resume point so the next play starts from the beginning.
    pub fn rewind(&self) {
        self.set_paused(false);
        self.set_position(0);
    }

    /// Display name: the file name without its extension.
    pub fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("UNKNOWN")
    }
}
