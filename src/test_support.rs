//! Fixtures shared by the unit tests.

use std::path::{Path, PathBuf};

use crate::library::{Catalog, Track};

/// Write a 16-bit PCM wav with `frames` frames whose samples count upwards,
/// so every byte position in the data chunk is distinguishable.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames * u32::from(channels) {
        w.write_sample((i % 30_000) as i16).unwrap();
    }
    w.finalize().unwrap();
}

/// The PCM bytes of the data chunk of a wav written by [`write_wav`].
pub fn wav_data(path: &Path) -> Vec<u8> {
    let mut r = hound::WavReader::open(path).unwrap();
    r.samples::<i16>()
        .flat_map(|s| s.unwrap().to_le_bytes())
        .collect()
}

/// Create `count` stereo 44.1 kHz wavs named `track-N.wav` in `dir` and
/// return a catalog over them.
pub fn wav_catalog(dir: &Path, count: usize, frames: u32) -> (Catalog, Vec<PathBuf>) {
    let mut paths = Vec::new();
    let mut tracks = Vec::new();
    for i in 0..count {
        let p = dir.join(format!("track-{i}.wav"));
        write_wav(&p, 44100, 2, frames);
        tracks.push(Track::open(&p).unwrap());
        paths.push(p);
    }
    (Catalog::new(tracks), paths)
}

/// Path of a checked-in file under `fixtures/`.
///
/// `silence.mp3` holds 40 silent MPEG-1 layer III frames (44.1 kHz stereo,
/// 46080 frames). `silence.ogg` is a stereo 44.1 kHz Vorbis stream of 400
/// short-block packets (51072 frames).
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}
