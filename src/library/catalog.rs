use std::path::Path;

use super::model::Track;

/// Ordered collection of every playable track found at start-up.
///
/// Navigation is circular: stepping past the last track yields the first
/// one and stepping back from the first yields the last.
#[derive(Debug, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
}

impl Catalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    #[cfg(test)]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn next(&self, index: usize) -> usize {
        if self.tracks.is_empty() {
            return 0;
        }
        (index + 1) % self.tracks.len()
    }

    pub fn previous(&self, index: usize) -> usize {
        if self.tracks.is_empty() {
            return 0;
        }
        if index == 0 || index > self.tracks.len() {
            self.tracks.len() - 1
        } else {
            index - 1
        }
    }

    /// Index of the track stored at `path`, if any.
    pub fn position_of(&self, path: &Path) -> Option<usize> {
        self.tracks.iter().position(|t| t.path == path)
    }
}
