//! Format readers: a uniform `Read` + seek view over WAV, MP3 and OGG files.
//!
//! WAV files are read directly from disk, so offsets are file offsets.
//! MP3 and OGG are decoded with symphonia into interleaved 16-bit
//! little-endian PCM, so offsets count decoded bytes.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{self, FormatOptions, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

use super::transfer::PcmSource;
use crate::library::{AudioFormat, DECODED_BYTES_PER_SAMPLE, Track};

/// Consecutive undecodable packets tolerated before giving up on a track.
const MAX_DECODE_RETRIES: u32 = 3;

/// Frames decoded ahead of a seek target so the decoder has primed its
/// overlap state. Covers the longest Vorbis block.
const SEEK_PREROLL_FRAMES: u64 = 4096;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("no reader for {0}")]
    UnsupportedFormat(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid wav header: {0}")]
    Wav(#[from] hound::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] SymphoniaError),
}

pub enum FormatReader {
    Wav(WavReader),
    Mp3(DecodedReader),
    Ogg(DecodedReader),
}

impl FormatReader {
    pub fn open(track: &Track) -> Result<Self, ReaderError> {
        match track.format() {
            AudioFormat::Wav => Ok(Self::Wav(WavReader::open(&track.path)?)),
            AudioFormat::Mp3 => Ok(Self::Mp3(DecodedReader::open(
                track,
                "mp3",
                SampleConversion::Integer,
            )?)),
            AudioFormat::Ogg => Ok(Self::Ogg(DecodedReader::open(
                track,
                "ogg",
                SampleConversion::Float,
            )?)),
            AudioFormat::Unknown => Err(ReaderError::UnsupportedFormat(track.path.clone())),
        }
    }

    /// Move to `offset` (in reader units) and return the offset actually
    /// reached, which is aligned down to a whole frame.
    pub fn seek(&mut self, offset: u64) -> Result<u64, ReaderError> {
        match self {
            Self::Wav(r) => Ok(r.seek(offset)?),
            Self::Mp3(r) | Self::Ogg(r) => r.seek(offset),
        }
    }

    pub fn position(&self) -> u64 {
        match self {
            Self::Wav(r) => r.position,
            Self::Mp3(r) | Self::Ogg(r) => r.position,
        }
    }

    pub fn length(&self) -> u64 {
        match self {
            Self::Wav(r) => r.length,
            Self::Mp3(r) | Self::Ogg(r) => r.length,
        }
    }

    pub fn duration_seconds(&self) -> u64 {
        match self {
            Self::Wav(r) => r.duration_seconds,
            Self::Mp3(r) | Self::Ogg(r) => r.duration_seconds,
        }
    }
}

impl Read for FormatReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Wav(r) => r.read(buf),
            Self::Mp3(r) | Self::Ogg(r) => r.read(buf),
        }
    }
}

impl PcmSource for FormatReader {
    fn position(&self) -> u64 {
        FormatReader::position(self)
    }
}

/// Raw reader over the `data` chunk of a WAV file.
pub struct WavReader {
    file: BufReader<File>,
    data_start: u64,
    data_end: u64,
    block_align: u64,
    position: u64,
    length: u64,
    duration_seconds: u64,
}

impl WavReader {
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let mut file = BufReader::new(File::open(path)?);
        // `length` is the file size. Chunks after `data` (LIST, id3) are never
        // served, so a fully played file can stop short of it.
        let length = file.get_ref().metadata()?.len();

        let (spec, frames) = {
            let header = hound::WavReader::new(&mut file)?;
            (header.spec(), u64::from(header.duration()))
        };
        // hound stops right after the `data` chunk header.
        let data_start = file.stream_position()?;
        let block_align =
            (u64::from(spec.channels) * u64::from(spec.bits_per_sample.div_ceil(8))).max(1);
        let data_end = (data_start + frames * block_align).min(length);
        let byte_rate = u64::from(spec.sample_rate) * block_align;

        Ok(Self {
            file,
            data_start,
            data_end,
            block_align,
            position: data_start,
            length,
            duration_seconds: (data_end - data_start) / byte_rate.max(1),
        })
    }

    /// Clamp `offset` into the data chunk, align it to a frame boundary and
    /// move there.
    pub fn seek(&mut self, offset: u64) -> io::Result<u64> {
        let offset = offset.clamp(self.data_start, self.data_end);
        let aligned =
            self.data_start + (offset - self.data_start) / self.block_align * self.block_align;
        self.file.seek(SeekFrom::Start(aligned))?;
        self.position = aligned;
        Ok(aligned)
    }
}

impl Read for WavReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data_end.saturating_sub(self.position);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.file.read(&mut buf[..want])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl PcmSource for WavReader {
    fn position(&self) -> u64 {
        self.position
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SampleConversion {
    /// Let symphonia convert to `i16`.
    Integer,
    /// Decode to `f32` and scale by `i16::MAX`.
    Float,
}

/// Streaming decoder producing interleaved 16-bit little-endian PCM.
pub struct DecodedReader {
    format: Box<dyn formats::FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    conversion: SampleConversion,
    frame_bytes: u64,
    pending: Vec<u8>,
    offset: usize,
    /// Frame the next served byte must start at after a seek. Decoded
    /// frames before it are dropped.
    seek_target: Option<u64>,
    finished: bool,
    position: u64,
    length: u64,
    duration_seconds: u64,
}

impl DecodedReader {
    fn open(
        track: &Track,
        extension: &str,
        conversion: SampleConversion,
    ) -> Result<Self, ReaderError> {
        let file = File::open(&track.path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(extension);

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let stream = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(ReaderError::UnsupportedFormat(track.path.clone()))?;
        let track_id = stream.id;
        let decoder = symphonia::default::get_codecs()
            .make(&stream.codec_params, &DecoderOptions::default())?;

        let frame_bytes = u64::from(track.metadata.source_channels.max(1))
            * u64::from(DECODED_BYTES_PER_SAMPLE);

        Ok(Self {
            format,
            decoder,
            track_id,
            conversion,
            frame_bytes,
            pending: Vec::new(),
            offset: 0,
            seek_target: None,
            finished: false,
            position: 0,
            length: track.length,
            duration_seconds: track.duration_seconds,
        })
    }

    /// Seek to the frame containing `offset`.
    ///
    /// The demuxer is positioned a little before the frame and the surplus
    /// is decoded and dropped in `fill`, using packet timestamps. The first
    /// packet after a decoder reset may yield no audio (Vorbis), so counting
    /// from the demuxer's landing point would drift.
    pub fn seek(&mut self, offset: u64) -> Result<u64, ReaderError> {
        let frame = offset.min(self.length) / self.frame_bytes;
        let seeked = self.format.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: frame.saturating_sub(SEEK_PREROLL_FRAMES),
                track_id: self.track_id,
            },
        )?;
        self.decoder.reset();

        self.pending.clear();
        self.offset = 0;
        self.finished = false;
        self.seek_target = Some(frame);
        self.position = frame * self.frame_bytes;
        debug!(
            target = frame,
            landed = seeked.actual_ts,
            "seeked decoded stream"
        );
        Ok(self.position)
    }

    /// Decode packets until there is PCM to serve or the stream ends.
    fn fill(&mut self) -> Result<(), ReaderError> {
        self.pending.clear();
        self.offset = 0;
        let mut failures = 0;

        while self.pending.is_empty() && !self.finished {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.finished = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let packet_end = packet.ts() + packet.dur();
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    failures = 0;
                    let frames = decoded.frames() as u64;
                    let before = self.pending.len();
                    append_pcm(decoded, self.conversion, &mut self.pending);
                    if frames > 0 {
                        self.drop_before_target(before, packet_end.saturating_sub(frames), frames);
                    }
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    failures += 1;
                    warn!(reason, failures, "skipping undecodable packet");
                    if failures > MAX_DECODE_RETRIES {
                        return Err(SymphoniaError::DecodeError(reason).into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Drop the frames of a freshly decoded buffer (appended at `at`, first
    /// frame `start`) that precede the seek target.
    fn drop_before_target(&mut self, at: usize, start: u64, frames: u64) {
        let Some(target) = self.seek_target else {
            return;
        };
        if start > target {
            warn!(start, target, "decoded past seek target");
        }
        let dropped = target.saturating_sub(start).min(frames) * self.frame_bytes;
        let end = at
            .saturating_add(usize::try_from(dropped).unwrap_or(usize::MAX))
            .min(self.pending.len());
        self.pending.drain(at..end);
        if start + frames > target {
            self.seek_target = None;
        }
    }
}

impl Read for DecodedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.pending.len() {
            self.fill().map_err(io::Error::other)?;
        }
        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        self.position += n as u64;
        Ok(n)
    }
}

impl PcmSource for DecodedReader {
    fn position(&self) -> u64 {
        self.position
    }
}

fn append_pcm(decoded: AudioBufferRef<'_>, conversion: SampleConversion, out: &mut Vec<u8>) {
    let spec = *decoded.spec();
    let capacity = decoded.capacity() as u64;
    match conversion {
        SampleConversion::Integer => {
            let mut buf = SampleBuffer::<i16>::new(capacity, spec);
            buf.copy_interleaved_ref(decoded);
            out.extend(buf.samples().iter().flat_map(|s| s.to_le_bytes()));
        }
        SampleConversion::Float => {
            let mut buf = SampleBuffer::<f32>::new(capacity, spec);
            buf.copy_interleaved_ref(decoded);
            out.extend(
                buf.samples()
                    .iter()
                    .flat_map(|s| float_to_i16(*s).to_le_bytes()),
            );
        }
    }
}

/// Scale a float sample by `i16::MAX`, truncating toward zero. Out of range
/// input saturates.
fn float_to_i16(sample: f32) -> i16 {
    (sample * f32::from(i16::MAX)) as i16
}
