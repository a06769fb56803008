//! Container sniffing and per-format metadata extraction.
//!
//! Formats are classified once, while the catalog is built, from the leading
//! bytes of each file. Everything the playback path needs later (sample
//! rate, sample width, PCM length, duration) is extracted here so playback
//! never has to probe a file again.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use lofty::prelude::*;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Largest container signature we look at.
pub const HEADER_LEN: u64 = 261;

/// Sample rates the audio sink accepts.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44100, 48000];

/// Channel count reported for every track. Mono sources are played as if
/// they were stereo.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Bytes per sample of the PCM stream produced by the MP3 and OGG decoders.
pub const DECODED_BYTES_PER_SAMPLE: u16 = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
    Unknown,
}

impl AudioFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Unknown => "",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub format: AudioFormat,
    pub sample_rate: u32,
    /// Always [`OUTPUT_CHANNELS`].
    pub channels: u16,
    /// Channel count found in the file.
    pub source_channels: u16,
    pub bytes_per_sample: u16,
}

/// Everything the catalog learns about a file.
#[derive(Debug, Clone)]
pub struct Probe {
    pub metadata: Metadata,
    /// Length of the reader stream (see `Track::length`).
    pub length: u64,
    pub duration_seconds: u64,
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("unsupported container format")]
    UnsupportedFormat,
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("unsupported sample encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("invalid wav header: {0}")]
    Wav(#[from] hound::Error),
    #[error("cannot probe stream: {0}")]
    Probe(#[from] symphonia::core::errors::Error),
    #[error("no decodable audio stream")]
    NoAudioStream,
}

/// Classify a container from its leading bytes.
pub fn sniff(head: &[u8]) -> AudioFormat {
    match infer::get(head).map(|kind| kind.extension()) {
        Some("wav") => AudioFormat::Wav,
        Some("mp3") => AudioFormat::Mp3,
        Some("ogg") => AudioFormat::Ogg,
        _ => AudioFormat::Unknown,
    }
}

/// Read at most [`HEADER_LEN`] bytes of `path` and classify them.
pub fn detect(path: &Path) -> Result<AudioFormat, TrackError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    let mut head = Vec::with_capacity(HEADER_LEN as usize);
    file.take(HEADER_LEN)
        .read_to_end(&mut head)
        .map_err(|source| io_error(path, source))?;
    Ok(sniff(&head))
}

/// Detect the format of `path` and extract its playback metadata.
///
/// Files in an unknown container or with a sample rate the sink cannot
/// play are rejected here rather than at play time.
pub fn probe(path: &Path) -> Result<Probe, TrackError> {
    let probe = match detect(path)? {
        AudioFormat::Wav => probe_wav(path)?,
        format @ (AudioFormat::Mp3 | AudioFormat::Ogg) => probe_decoded(path, format)?,
        AudioFormat::Unknown => return Err(TrackError::UnsupportedFormat),
    };

    if !sample_rate_supported(probe.metadata.sample_rate) {
        return Err(TrackError::UnsupportedSampleRate(probe.metadata.sample_rate));
    }
    Ok(probe)
}

pub fn sample_rate_supported(sample_rate: u32) -> bool {
    SUPPORTED_SAMPLE_RATES.contains(&sample_rate)
}

fn probe_wav(path: &Path) -> Result<Probe, TrackError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int {
        return Err(TrackError::UnsupportedEncoding("floating point wav".into()));
    }
    let bytes_per_sample = spec.bits_per_sample.div_ceil(8);
    if spec.channels != OUTPUT_CHANNELS {
        tracing::info!(
            path = %path.display(),
            channels = spec.channels,
            "channel count unsupported, playing as stereo"
        );
    }

    let length = std::fs::metadata(path)
        .map_err(|source| io_error(path, source))?
        .len();
    let frames = u64::from(reader.duration());
    let duration_seconds =
        tagged_duration(path).unwrap_or_else(|| frames / u64::from(spec.sample_rate));

    Ok(Probe {
        metadata: Metadata {
            format: AudioFormat::Wav,
            sample_rate: spec.sample_rate,
            channels: OUTPUT_CHANNELS,
            source_channels: spec.channels,
            bytes_per_sample,
        },
        length,
        duration_seconds,
    })
}

fn probe_decoded(path: &Path, format: AudioFormat) -> Result<Probe, TrackError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(TrackError::NoAudioStream)?;
    let params = &track.codec_params;

    let sample_rate = params.sample_rate.ok_or(TrackError::NoAudioStream)?;
    let source_channels = params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(OUTPUT_CHANNELS);

    let tagged = tagged_duration(path);
    let frames = params
        .n_frames
        .or_else(|| tagged.map(|secs| secs * u64::from(sample_rate)))
        .unwrap_or(0);
    let length = frames * u64::from(source_channels) * u64::from(DECODED_BYTES_PER_SAMPLE);
    let duration_seconds = tagged.unwrap_or(frames / u64::from(sample_rate));

    Ok(Probe {
        metadata: Metadata {
            format,
            sample_rate,
            channels: OUTPUT_CHANNELS,
            source_channels,
            bytes_per_sample: DECODED_BYTES_PER_SAMPLE,
        },
        length,
        duration_seconds,
    })
}

fn tagged_duration(path: &Path) -> Option<u64> {
    lofty::read_from_path(path)
        .ok()
        .map(|tagged| tagged.properties().duration().as_secs())
        .filter(|secs| *secs > 0)
}

fn io_error(path: &Path, source: std::io::Error) -> TrackError {
    TrackError::Io {
        path: path.to_path_buf(),
        source,
    }
}
