//! RFID tags: the UID to track table and the line-oriented tag reader.
//!
//! Readers are expected to emit one hex UID per line (USB keyboard-wedge
//! readers and most serial bridges do). Each UID is looked up in the tag
//! table and the matching track is queued on the player.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::audio::Player;
use crate::config::RfidSettings;
use crate::library::Catalog;

/// Consecutive read failures after which the reader gives up.
pub const MAX_READ_FAILURES: u32 = 10;

#[derive(Debug, Error)]
pub enum TagFileError {
    #[error("cannot read tag file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid tag file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct TagFile {
    #[serde(default)]
    tags: HashMap<String, PathBuf>,
}

/// Canonical form of a tag UID: hex digits only, lower case.
pub fn normalize_uid(uid: &str) -> String {
    uid.trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct TagTable {
    entries: HashMap<String, usize>,
}

impl TagTable {
    /// Resolve configured tags (and the optional tag file) against the
    /// catalog. Paths are relative to `root`; entries that do not name a
    /// catalog track are logged and skipped.
    pub fn build(
        catalog: &Catalog,
        root: &Path,
        settings: &RfidSettings,
    ) -> Result<Self, TagFileError> {
        let mut sources = match &settings.tags_file {
            Some(path) => load_tag_file(path)?,
            None => HashMap::new(),
        };
        sources.extend(settings.tags.clone());

        let mut table = Self::default();
        for (uid, path) in sources {
            let full = root.join(&path);
            match catalog.position_of(&full) {
                Some(index) => table.insert(&uid, index),
                None => warn!(
                    uid = %uid,
                    path = %full.display(),
                    "tag names no catalog track, skipping"
                ),
            }
        }
        if table.is_empty() && settings.device.is_some() {
            warn!("rfid reader configured but no tags resolved");
        }
        info!(tags = table.len(), "tag table ready");
        Ok(table)
    }

    pub fn insert(&mut self, uid: &str, index: usize) {
        self.entries.insert(normalize_uid(uid), index);
    }

    pub fn lookup(&self, uid: &str) -> Option<usize> {
        self.entries.get(&normalize_uid(uid)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn load_tag_file(path: &Path) -> Result<HashMap<String, PathBuf>, TagFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| TagFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: TagFile = toml::from_str(&text).map_err(|source| TagFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.tags)
}

/// Open the configured tag source. `-` means stdin.
pub fn open_source(device: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    if device == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    Ok(Box::new(BufReader::new(File::open(device)?)))
}

/// Why [`read_tags`] stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum ReaderExit {
    EndOfInput,
    TooManyFailures,
}

/// Feed every non-empty line of `source` to `on_tag` until end of input or
/// more than [`MAX_READ_FAILURES`] consecutive read errors.
pub fn read_tags<R: BufRead>(
    mut source: R,
    retry_delay: Duration,
    mut on_tag: impl FnMut(&str),
) -> ReaderExit {
    let mut failures = 0;
    let mut line = String::new();
    loop {
        line.clear();
        match source.read_line(&mut line) {
            Ok(0) => return ReaderExit::EndOfInput,
            Ok(_) => {
                failures = 0;
                let uid = line.trim();
                if !uid.is_empty() {
                    on_tag(uid);
                }
            }
            Err(e) => {
                failures += 1;
                warn!(error = %e, failures, "tag read failed");
                if failures > MAX_READ_FAILURES {
                    return ReaderExit::TooManyFailures;
                }
                thread::sleep(retry_delay);
            }
        }
    }
}

/// Run [`read_tags`] on its own thread, selecting tracks on `player`.
pub fn spawn_tag_reader(
    source: Box<dyn BufRead + Send>,
    player: Arc<Player>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("rfid".into()).spawn(move || {
        let exit = read_tags(source, Duration::from_secs(1), |uid| {
            debug!(uid, "tag scanned");
            if let Err(e) = player.select_tag(uid) {
                warn!(uid, error = %e, "tag ignored");
            }
        });
        match exit {
            ReaderExit::EndOfInput => info!("tag source closed"),
            ReaderExit::TooManyFailures => error!("tag reader failing repeatedly, giving up"),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;
    use crate::test_support::wav_catalog;

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("reader unplugged"))
        }
    }

    #[test]
    fn uids_are_normalized() {
        assert_eq!(normalize_uid("  04:A1:B2:C3\n"), "04a1b2c3");
        assert_eq!(normalize_uid("DEAD-BEEF"), "deadbeef");
    }

    #[test]
    fn lines_become_tags_until_eof() {
        let input = Cursor::new("04a1b2c3\n\n  DEADBEEF \n");
        let mut seen = Vec::new();
        let exit = read_tags(input, Duration::ZERO, |uid| seen.push(uid.to_string()));
        assert_eq!(exit, ReaderExit::EndOfInput);
        assert_eq!(seen, vec!["04a1b2c3", "DEADBEEF"]);
    }

    #[test]
    fn reader_gives_up_after_repeated_failures() {
        let mut calls = 0;
        let exit = read_tags(BufReader::new(Broken), Duration::ZERO, |_| calls += 1);
        assert_eq!(exit, ReaderExit::TooManyFailures);
        assert_eq!(calls, 0);
    }

    #[test]
    fn table_resolves_configured_and_file_tags() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, _) = wav_catalog(dir.path(), 3, 8);

        let tags_file = dir.path().join("tags.toml");
        std::fs::write(
            &tags_file,
            "[tags]\n\"AA:BB\" = \"track-1.wav\"\n\"cc\" = \"missing.wav\"\n",
        )
        .unwrap();

        let mut settings = RfidSettings {
            tags_file: Some(tags_file),
            ..RfidSettings::default()
        };
        settings
            .tags
            .insert("04A1".to_string(), PathBuf::from("track-2.wav"));

        let table = TagTable::build(&catalog, dir.path(), &settings).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("aabb"), Some(1));
        assert_eq!(table.lookup("04a1"), Some(2));
        assert_eq!(table.lookup("cc"), None);
    }

    #[test]
    fn broken_tag_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, _) = wav_catalog(dir.path(), 1, 8);
        let tags_file = dir.path().join("tags.toml");
        std::fs::write(&tags_file, "[tags\n").unwrap();

        let settings = RfidSettings {
            tags_file: Some(tags_file),
            ..RfidSettings::default()
        };
        assert!(matches!(
            TagTable::build(&catalog, dir.path(), &settings),
            Err(TagFileError::Parse { .. })
        ));
    }
}
