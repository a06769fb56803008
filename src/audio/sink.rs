//! Audio sinks: the byte-oriented output the transfer loop writes PCM to.
//!
//! A sink is opened per track with the track's sample format and released
//! when dropped. The `rodio` backend converts interleaved little-endian PCM
//! into `f32` sample buffers and queues them on a `Sink`.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use thiserror::Error;

use crate::library::{Track, sample_rate_supported};

/// Default device buffer, in bytes.
pub const SINK_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SinkParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
    pub buffer_size: usize,
}

impl SinkParams {
    pub fn for_track(track: &Track, buffer_size: usize) -> Self {
        Self {
            sample_rate: track.metadata.sample_rate,
            channels: track.metadata.channels,
            bytes_per_sample: track.metadata.bytes_per_sample,
            buffer_size,
        }
    }

    fn frame_bytes(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bytes_per_sample)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("unsupported sample width of {0} bytes")]
    UnsupportedSampleWidth(u16),
    #[error("audio device: {0}")]
    Device(String),
}

/// An open output session.
pub trait AudioSink: Write {
    /// Block until everything written so far has been played.
    fn drain(&mut self) {}
}

/// Factory for sink sessions. Shared between the command path and the
/// playback worker.
pub trait AudioOutput: Send + Sync {
    fn open(&self, params: &SinkParams) -> Result<Box<dyn AudioSink>, SinkError>;
}

fn check_params(params: &SinkParams) -> Result<(), SinkError> {
    if !sample_rate_supported(params.sample_rate) {
        return Err(SinkError::UnsupportedSampleRate(params.sample_rate));
    }
    if !(1..=4).contains(&params.bytes_per_sample) {
        return Err(SinkError::UnsupportedSampleWidth(params.bytes_per_sample));
    }
    Ok(())
}

/// Default output device through `rodio`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioOutput;

impl RodioOutput {
    /// Open and close the default output device once, so a missing device
    /// is reported at start-up rather than on the first play.
    pub fn check_default_device() -> Result<(), SinkError> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| SinkError::Device(e.to_string()))?;
        stream.log_on_drop(false);
        tracing::debug!("default audio device available");
        Ok(())
    }
}

impl AudioOutput for RodioOutput {
    fn open(&self, params: &SinkParams) -> Result<Box<dyn AudioSink>, SinkError> {
        check_params(params)?;

        let mut stream = OutputStreamBuilder::from_default_device()
            .map_err(|e| SinkError::Device(e.to_string()))?
            .with_sample_rate(params.sample_rate)
            .with_channels(params.channels)
            .open_stream_or_fallback()
            .map_err(|e| SinkError::Device(e.to_string()))?;
        // rodio prints to stderr when the stream is dropped, once per track here.
        stream.log_on_drop(false);

        let sink = Sink::connect_new(stream.mixer());
        let max_queued = (params.buffer_size / 1024).max(2);

        tracing::debug!(
            sample_rate = params.sample_rate,
            channels = params.channels,
            bytes_per_sample = params.bytes_per_sample,
            "opened audio sink"
        );

        Ok(Box::new(RodioSink {
            _stream: stream,
            sink,
            params: *params,
            carry: Vec::with_capacity(params.frame_bytes()),
            samples: Vec::new(),
            max_queued,
        }))
    }
}

struct RodioSink {
    // Must outlive `sink`.
    _stream: OutputStream,
    sink: Sink,
    params: SinkParams,
    /// Bytes of an incomplete frame left over from the previous write.
    carry: Vec<u8>,
    samples: Vec<f32>,
    max_queued: usize,
}

impl Write for RodioSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let frame = self.params.frame_bytes();
        self.carry.extend_from_slice(buf);
        let whole = self.carry.len() - self.carry.len() % frame;
        if whole == 0 {
            return Ok(buf.len());
        }

        self.samples.clear();
        pcm_to_f32(
            &self.carry[..whole],
            self.params.bytes_per_sample,
            &mut self.samples,
        );
        self.carry.drain(..whole);

        while self.sink.len() >= self.max_queued {
            thread::sleep(Duration::from_millis(1));
        }
        self.sink.append(SamplesBuffer::new(
            self.params.channels,
            self.params.sample_rate,
            std::mem::take(&mut self.samples),
        ));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AudioSink for RodioSink {
    fn drain(&mut self) {
        self.sink.sleep_until_end();
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        self.sink.stop();
    }
}

/// Convert interleaved little-endian integer PCM to `f32` samples in
/// `[-1.0, 1.0)`. 8-bit samples are unsigned, wider ones signed.
pub(crate) fn pcm_to_f32(bytes: &[u8], bytes_per_sample: u16, out: &mut Vec<f32>) {
    let width = usize::from(bytes_per_sample);
    out.reserve(bytes.len() / width);
    for s in bytes.chunks_exact(width) {
        let v = match s {
            [b] => (f32::from(*b) - 128.0) / 128.0,
            [a, b] => f32::from(i16::from_le_bytes([*a, *b])) / 32_768.0,
            [a, b, c] => {
                let raw = i32::from_le_bytes([0, *a, *b, *c]) >> 8;
                raw as f32 / 8_388_608.0
            }
            [a, b, c, d] => i32::from_le_bytes([*a, *b, *c, *d]) as f32 / 2_147_483_648.0,
            _ => 0.0,
        };
        out.push(v);
    }
}
