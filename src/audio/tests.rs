use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::tempdir;

use super::cancel::{CancelCause, CancelToken};
use super::player::{Player, jump_position};
use super::queue::{QueueFull, SELECTION_QUEUE_CAPACITY, SelectionQueue};
use super::reader::FormatReader;
use super::sink::{AudioOutput, AudioSink, SINK_BUFFER_SIZE, SinkError, SinkParams, pcm_to_f32};
use super::transfer::{CHUNK_SIZE, transfer};
use super::types::{PlayerError, PlayerState};
use super::worker::{PlaybackError, play_track};
use crate::library::{AudioFormat, Catalog, Metadata, Probe, Track};
use crate::rfid::TagTable;
use crate::test_support::{wav_catalog, wav_data, write_wav};

type Session = Arc<Mutex<Vec<u8>>>;

/// Records every session's bytes in memory.
#[derive(Clone, Default)]
struct MemoryOutput {
    sessions: Arc<Mutex<Vec<Session>>>,
    write_delay: Duration,
}

impl MemoryOutput {
    fn slow(write_delay: Duration) -> Self {
        Self {
            write_delay,
            ..Self::default()
        }
    }

    fn session(&self, i: usize) -> Vec<u8> {
        self.sessions.lock().unwrap()[i].lock().unwrap().clone()
    }

    fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

impl AudioOutput for MemoryOutput {
    fn open(&self, _params: &SinkParams) -> Result<Box<dyn AudioSink>, SinkError> {
        let buf = Session::default();
        self.sessions.lock().unwrap().push(buf.clone());
        Ok(Box::new(MemorySink {
            buf,
            write_delay: self.write_delay,
            on_write: None,
        }))
    }
}

struct MemorySink {
    buf: Session,
    write_delay: Duration,
    on_write: Option<Box<dyn FnMut(usize)>>,
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        thread::sleep(self.write_delay);
        self.buf.lock().unwrap().extend_from_slice(data);
        if let Some(hook) = self.on_write.as_mut() {
            hook(data.len());
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AudioSink for MemorySink {}

/// Hands out one prepared sink that cancels `token` with `cause` after
/// `writes` chunks have been written.
struct CancellingOutput {
    buf: Session,
    token: CancelToken,
    cause: CancelCause,
    writes: usize,
}

impl AudioOutput for CancellingOutput {
    fn open(&self, _params: &SinkParams) -> Result<Box<dyn AudioSink>, SinkError> {
        let token = self.token.clone();
        let cause = self.cause;
        let limit = self.writes;
        let seen = AtomicUsize::new(0);
        Ok(Box::new(MemorySink {
            buf: self.buf.clone(),
            write_delay: Duration::ZERO,
            on_write: Some(Box::new(move |_| {
                if seen.fetch_add(1, Ordering::SeqCst) + 1 == limit {
                    token.cancel(cause);
                }
            })),
        }))
    }
}

struct FailingOutput;

impl AudioOutput for FailingOutput {
    fn open(&self, _params: &SinkParams) -> Result<Box<dyn AudioSink>, SinkError> {
        Err(SinkError::Device("unplugged".into()))
    }
}

/// One-shot barrier: `wait` blocks until `open` has been called.
#[derive(Clone, Default)]
struct Gate {
    open: Arc<(Mutex<bool>, Condvar)>,
    reached: Arc<AtomicBool>,
}

impl Gate {
    fn wait(&self) {
        self.reached.store(true, Ordering::SeqCst);
        let (open, cvar) = &*self.open;
        let mut open = open.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }

    fn open(&self) {
        let (open, cvar) = &*self.open;
        *open.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn reached(&self) -> bool {
        self.reached.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
enum Hold {
    /// Block inside the n-th write, after its bytes were recorded.
    Write(usize),
    /// Block in `drain` after the last write.
    Drain,
}

/// Like [`MemoryOutput`], but the first session stops at `hold` until the
/// gate opens.
#[derive(Clone)]
struct GatedOutput {
    memory: MemoryOutput,
    gate: Gate,
    hold: Hold,
}

impl GatedOutput {
    fn new(hold: Hold, write_delay: Duration) -> Self {
        Self {
            memory: MemoryOutput::slow(write_delay),
            gate: Gate::default(),
            hold,
        }
    }
}

impl AudioOutput for GatedOutput {
    fn open(&self, _params: &SinkParams) -> Result<Box<dyn AudioSink>, SinkError> {
        let first = self.memory.session_count() == 0;
        let buf = Session::default();
        self.memory.sessions.lock().unwrap().push(buf.clone());
        let mut sink = MemorySink {
            buf,
            write_delay: self.memory.write_delay,
            on_write: None,
        };
        if !first {
            return Ok(Box::new(sink));
        }

        let gate = self.gate.clone();
        match self.hold {
            Hold::Write(at) => {
                let mut writes = 0;
                sink.on_write = Some(Box::new(move |_| {
                    writes += 1;
                    if writes == at {
                        gate.wait();
                    }
                }));
                Ok(Box::new(sink))
            }
            Hold::Drain => Ok(Box::new(DrainGatedSink { sink, gate })),
        }
    }
}

struct DrainGatedSink {
    sink: MemorySink,
    gate: Gate,
}

impl Write for DrainGatedSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.sink.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl AudioSink for DrainGatedSink {
    fn drain(&mut self) {
        self.gate.wait();
    }
}

fn spawn_player(catalog: Catalog, output: impl AudioOutput + 'static) -> Arc<Player> {
    let player = Arc::new(Player::new(catalog, Box::new(output), TagTable::default()).unwrap());
    player.spawn_worker().unwrap();
    player
}

fn stop(player: &Player) {
    player.shutdown();
    player.join().unwrap();
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn one_track(frames: u32) -> (tempfile::TempDir, PathBuf, Track) {
    let dir = tempdir().unwrap();
    let p = dir.path().join("song.wav");
    write_wav(&p, 44100, 2, frames);
    let track = Track::open(&p).unwrap();
    (dir, p, track)
}

fn synthetic_track(length: u64, duration_seconds: u64) -> Track {
    Track::new(
        PathBuf::from("/music/synthetic.wav"),
        Probe {
            metadata: Metadata {
                format: AudioFormat::Wav,
                sample_rate: 44100,
                channels: 2,
                source_channels: 2,
                bytes_per_sample: 2,
            },
            length,
            duration_seconds,
        },
    )
}

#[test]
fn transfer_checks_cancel_before_writing() {
    let (_dir, _p, track) = one_track(1000);
    let mut reader = FormatReader::open(&track).unwrap();
    let token = CancelToken::new();
    token.cancel(CancelCause::Next);

    let mut sink = Vec::new();
    let err = transfer(&token, &mut sink, &mut reader, &track).unwrap_err();
    assert_eq!(err.cancel_cause(), Some(CancelCause::Next));
    assert!(sink.is_empty());
}

#[test]
fn natural_end_delivers_short_final_chunk_and_rewinds() {
    // 1001 frames * 4 bytes is not a multiple of the chunk size.
    let (_dir, p, track) = one_track(1001);
    let output = MemoryOutput::default();

    play_track(&output, SINK_BUFFER_SIZE, &CancelToken::new(), &track).unwrap();

    assert_eq!(output.session(0), wav_data(&p));
    assert_eq!(track.position(), 0);
    assert!(!track.is_paused());
}

#[test]
fn pause_keeps_position_of_last_written_chunk() {
    let (_dir, p, track) = one_track(4000);
    let data_start = track.length - wav_data(&p).len() as u64;
    let token = CancelToken::new();
    let output = CancellingOutput {
        buf: Session::default(),
        token: token.clone(),
        cause: CancelCause::Pause,
        writes: 3,
    };

    let err = play_track(&output, SINK_BUFFER_SIZE, &token, &track).unwrap_err();
    assert_eq!(err.cancel_cause(), Some(CancelCause::Pause));
    assert!(track.is_paused());
    assert_eq!(track.position(), data_start + 3 * CHUNK_SIZE as u64);
    assert_eq!(output.buf.lock().unwrap().len(), 3 * CHUNK_SIZE);
}

#[test]
fn pause_then_resume_delivers_every_byte_once() {
    let (_dir, p, track) = one_track(4000);
    let first = CancelToken::new();
    let paused = CancellingOutput {
        buf: Session::default(),
        token: first.clone(),
        cause: CancelCause::Pause,
        writes: 5,
    };
    assert!(play_track(&paused, SINK_BUFFER_SIZE, &first, &track).is_err());
    assert!(track.is_paused());

    let resumed = MemoryOutput::default();
    play_track(&resumed, SINK_BUFFER_SIZE, &CancelToken::new(), &track).unwrap();

    let mut played = paused.buf.lock().unwrap().clone();
    played.extend(resumed.session(0));
    assert_eq!(played, wav_data(&p));
}

#[test]
fn skip_cancel_forgets_the_resume_point() {
    let (_dir, _p, track) = one_track(4000);
    track.set_paused(true);
    let token = CancelToken::new();
    let output = CancellingOutput {
        buf: Session::default(),
        token: token.clone(),
        cause: CancelCause::Next,
        writes: 2,
    };

    let err = play_track(&output, SINK_BUFFER_SIZE, &token, &track).unwrap_err();
    assert_eq!(err.cancel_cause(), Some(CancelCause::Next));
    assert!(!track.is_paused());
    assert_eq!(track.position(), 0);
}

#[test]
fn sink_failure_is_not_a_cancel() {
    let (_dir, _p, track) = one_track(100);
    let err = play_track(&FailingOutput, SINK_BUFFER_SIZE, &CancelToken::new(), &track)
        .unwrap_err();
    assert!(matches!(err, PlaybackError::Sink(_)));
    assert_eq!(err.cancel_cause(), None);
}

#[test]
fn selection_queue_rejects_overflow_without_losing_entries() {
    let queue = SelectionQueue::default();
    for i in 0..SELECTION_QUEUE_CAPACITY {
        queue.push(i).unwrap();
    }
    assert_eq!(queue.push(99), Err(QueueFull(99)));
    assert_eq!(queue.len(), SELECTION_QUEUE_CAPACITY);

    let drained: Vec<usize> = std::iter::from_fn(|| queue.pop()).collect();
    assert_eq!(drained, (0..SELECTION_QUEUE_CAPACITY).collect::<Vec<_>>());
    assert_eq!(queue.pop(), None);
}

#[test]
fn empty_catalog_is_rejected() {
    let result = Player::new(
        Catalog::default(),
        Box::new(MemoryOutput::default()),
        TagTable::default(),
    );
    assert!(matches!(result, Err(PlayerError::EmptyCatalog)));
}

#[test]
fn next_and_previous_move_circularly_and_reset_pause() {
    let dir = tempdir().unwrap();
    let (catalog, _) = wav_catalog(dir.path(), 3, 64);
    let player = Player::new(
        catalog,
        Box::new(MemoryOutput::default()),
        TagTable::default(),
    )
    .unwrap();

    let first = &player.catalog().tracks()[0];
    first.set_position(16);
    first.set_paused(true);

    player.previous();
    assert_eq!(player.current_index(), 2);
    assert!(!first.is_paused());
    assert_eq!(first.position(), 0);

    player.next();
    player.next();
    assert_eq!(player.current_index(), 1);
}

#[test]
fn select_track_validates_and_queues() {
    let dir = tempdir().unwrap();
    let (catalog, _) = wav_catalog(dir.path(), 3, 64);
    let player = Player::new(
        catalog,
        Box::new(MemoryOutput::default()),
        TagTable::default(),
    )
    .unwrap();

    assert!(matches!(
        player.select_track(3),
        Err(PlayerError::UnknownTrack(3))
    ));
    player.select_track(0).unwrap();
    assert_eq!(player.queued(), 0);

    player.select_track(2).unwrap();
    assert_eq!(player.queued(), 1);
    assert_eq!(player.current_index(), 0);

    assert!(matches!(
        player.select_tag("deadbeef"),
        Err(PlayerError::UnknownTag(_))
    ));
}

#[test]
fn jump_position_scales_and_aligns() {
    assert_eq!(jump_position(&synthetic_track(1000, 10), 3), 300);
    assert_eq!(jump_position(&synthetic_track(1001, 3), 1), 332);
    assert_eq!(jump_position(&synthetic_track(1001, 3), 100), 1000);
    assert_eq!(jump_position(&synthetic_track(1000, 0), 5), 0);
}

#[test]
fn snapshot_reports_current_track() {
    let track = synthetic_track(1000, 10);
    track.set_position(500);
    let state = PlayerState::of(&track, true);
    assert!(state.is_playing);
    assert_eq!(state.name, "/music/synthetic.wav");
    assert_eq!(state.position, 500);
    assert_eq!(state.length, 1000);
    assert_eq!(state.duration, 10);
    assert_eq!(state.duration_current, 5);

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["is_playing"], true);
    assert_eq!(json["duration_current"], 5);
}

#[test]
fn worker_pauses_resumes_and_advances() {
    let dir = tempdir().unwrap();
    let (catalog, paths) = wav_catalog(dir.path(), 2, 44_100);
    let output = MemoryOutput::slow(Duration::from_millis(1));
    let player = Arc::new(
        Player::new(catalog, Box::new(output.clone()), TagTable::default()).unwrap(),
    );
    player.spawn_worker().unwrap();
    let timeout = Duration::from_secs(10);

    player.toggle();
    assert!(wait_until(timeout, || player.is_playing()));
    thread::sleep(Duration::from_millis(20));

    player.toggle();
    let first = &player.catalog().tracks()[0];
    assert!(wait_until(timeout, || !player.is_playing() && first.is_paused()));
    assert!(!player.snapshot().is_playing);
    assert!(first.position() > 0);

    player.toggle();
    assert!(wait_until(timeout, || player.current_index() == 1
        && output.session_count() >= 3));
    stop(&player);

    let mut played = output.session(0);
    played.extend(output.session(1));
    assert_eq!(played, wav_data(&paths[0]));
    assert!(!first.is_paused());
}

#[test]
fn pcm_conversion_covers_supported_widths() {
    let mut out = Vec::new();
    pcm_to_f32(&[0, 128, 255], 1, &mut out);
    assert_eq!(out, vec![-1.0, 0.0, 127.0 / 128.0]);

    out.clear();
    pcm_to_f32(&[0x00, 0x80, 0x00, 0x40], 2, &mut out);
    assert_eq!(out, vec![-1.0, 0.5]);

    out.clear();
    pcm_to_f32(&[0x00, 0x00, 0xC0, 0xFF, 0xFF, 0x7F], 3, &mut out);
    assert_eq!(out, vec![-0.5, 8_388_607.0 / 8_388_608.0]);

    out.clear();
    pcm_to_f32(&[0, 0, 0, 0x80], 4, &mut out);
    assert_eq!(out, vec![-1.0]);
}

#[test]
fn skip_racing_a_pause_rewinds_the_skipped_track() {
    let dir = tempdir().unwrap();
    let (catalog, _) = wav_catalog(dir.path(), 3, 44_100);
    let output = GatedOutput::new(Hold::Write(6), Duration::from_millis(2));
    let player = spawn_player(catalog, output.clone());
    let timeout = Duration::from_secs(10);

    player.toggle();
    assert!(wait_until(timeout, || output.gate.reached()));

    // The pause wins the session's token; the skip lands while the worker is
    // still stuck in the write.
    player.toggle();
    let gate = output.gate.clone();
    let opener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        gate.open();
    });
    player.next();
    opener.join().unwrap();
    thread::sleep(Duration::from_millis(150));

    let first = &player.catalog().tracks()[0];
    assert!(!first.is_paused());
    assert_eq!(first.position(), 0);
    assert_eq!(player.current_index(), 1);
    stop(&player);
}

#[test]
fn pause_while_draining_holds() {
    let dir = tempdir().unwrap();
    let (catalog, _) = wav_catalog(dir.path(), 2, 512);
    let output = GatedOutput::new(Hold::Drain, Duration::ZERO);
    let player = spawn_player(catalog, output.clone());
    let timeout = Duration::from_secs(10);

    player.toggle();
    assert!(wait_until(timeout, || output.gate.reached()));
    assert!(player.is_playing());

    player.toggle();
    output.gate.open();
    assert!(wait_until(timeout, || !player.is_playing()));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(output.memory.session_count(), 1);
    assert!(!player.is_playing());
    assert_eq!(player.current_index(), 1);

    player.toggle();
    assert!(wait_until(timeout, || output.memory.session_count() >= 2));
    stop(&player);
}

#[test]
fn worker_gives_up_after_a_lap_of_sink_failures() {
    let dir = tempdir().unwrap();
    let (catalog, _) = wav_catalog(dir.path(), 3, 64);
    let player = spawn_player(catalog, FailingOutput);

    player.toggle();
    let (tx, rx) = mpsc::channel();
    let joiner = Arc::clone(&player);
    thread::spawn(move || tx.send(joiner.join()).unwrap());

    let joined = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(matches!(joined, Err(PlayerError::OutputUnavailable)));
    assert_eq!(player.current_index(), 2);
    assert!(!player.is_playing());
}

#[test]
fn worker_skips_a_track_that_fails_to_open() {
    let dir = tempdir().unwrap();
    let (catalog, paths) = wav_catalog(dir.path(), 3, 512);
    fs::remove_file(&paths[0]).unwrap();
    let output = MemoryOutput::default();
    let player = spawn_player(catalog, output.clone());

    player.toggle();
    assert!(wait_until(Duration::from_secs(10), || output.session_count() >= 3));
    stop(&player);

    // The sink opens before the reader, so the broken track leaves an empty
    // session behind.
    assert!(output.session(0).is_empty());
    assert_eq!(output.session(1), wav_data(&paths[1]));
    assert_eq!(output.session(2), wav_data(&paths[2]));
    let broken = &player.catalog().tracks()[0];
    assert!(!broken.is_paused());
    assert_eq!(broken.position(), 0);
}

#[test]
fn select_track_pauses_current_and_plays_selection() {
    let dir = tempdir().unwrap();
    let (catalog, paths) = wav_catalog(dir.path(), 3, 44_100);
    let output = MemoryOutput::slow(Duration::from_millis(1));
    let player = spawn_player(catalog, output.clone());
    let timeout = Duration::from_secs(10);

    player.toggle();
    assert!(wait_until(timeout, || player.is_playing()));
    thread::sleep(Duration::from_millis(20));

    player.select_track(2).unwrap();
    assert!(wait_until(timeout, || player.current_index() == 2
        && output.session_count() >= 2
        && !output.session(1).is_empty()));

    let first = &player.catalog().tracks()[0];
    let data_start = first.length - wav_data(&paths[0]).len() as u64;
    assert!(first.is_paused());
    assert_eq!(
        first.position(),
        data_start + output.session(0).len() as u64
    );

    let selected = output.session(1);
    assert_eq!(selected[..], wav_data(&paths[2])[..selected.len()]);
    assert_eq!(player.queued(), 0);
    stop(&player);
}

#[test]
fn jump_resumes_at_the_scaled_offset() {
    let dir = tempdir().unwrap();
    let (catalog, paths) = wav_catalog(dir.path(), 2, 88_200);
    let output = MemoryOutput::slow(Duration::from_millis(1));
    let player = spawn_player(catalog, output.clone());
    let timeout = Duration::from_secs(10);

    player.toggle();
    assert!(wait_until(timeout, || player.is_playing()));
    thread::sleep(Duration::from_millis(20));

    player.jump(1);
    assert!(wait_until(timeout, || output.session_count() >= 2
        && !output.session(1).is_empty()));

    let first = &player.catalog().tracks()[0];
    assert_eq!(first.duration_seconds, 2);
    let data = wav_data(&paths[0]);
    let data_start = first.length - data.len() as u64;
    let offset = (jump_position(first, 1) - data_start) as usize;

    let resumed = output.session(1);
    assert_eq!(resumed[..], data[offset..offset + resumed.len()]);
    assert_eq!(player.current_index(), 0);
    stop(&player);
}
