use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::LibrarySettings;

use super::catalog::Catalog;
use super::format::TrackError;
use super::model::Track;

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Walk `dir` and build the catalog from every file with a playable
/// container and sample rate.
///
/// Entries are visited depth-first in file name order. Files that cannot be
/// read or played are logged and skipped; only a missing or non-directory
/// root is an error.
pub fn scan(dir: &Path, settings: &LibrarySettings) -> Result<Catalog, TrackError> {
    let meta = std::fs::metadata(dir).map_err(|source| TrackError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(TrackError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
        });
    }

    let mut walker = WalkDir::new(dir)
        .follow_links(settings.follow_links)
        .sort_by_file_name();

    // Non-recursive = only the root directory.
    let depth_cap = if settings.recursive {
        settings.max_depth
    } else {
        Some(1)
    };
    if let Some(d) = depth_cap {
        walker = walker.max_depth(d);
    }

    let mut tracks: Vec<Track> = Vec::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| settings.include_hidden || e.depth() == 0 || !is_hidden(e.path()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() && !entry.path().is_file() {
            continue;
        }

        let path = entry.path();
        match Track::open(path) {
            Ok(track) => {
                debug!(
                    path = %path.display(),
                    format = ?track.format(),
                    sample_rate = track.metadata.sample_rate,
                    length = track.length,
                    "added track"
                );
                tracks.push(track);
            }
            Err(err) => warn!(path = %path.display(), error = %err, "skipping file"),
        }
    }

    info!(root = %dir.display(), tracks = tracks.len(), "catalog built");
    Ok(Catalog::new(tracks))
}
