use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::cancel::{CancelCause, CancelToken};
use super::queue::SelectionQueue;
use super::sink::{AudioOutput, SINK_BUFFER_SIZE, SinkError};
use super::types::{PlayerError, PlayerState};
use super::worker::{PlaybackError, play_track};
use crate::library::{Catalog, Track};
use crate::rfid::TagTable;

/// How often the idle worker checks for shutdown while waiting for a signal.
const SIGNAL_POLL: Duration = Duration::from_millis(200);
const SIGNAL_ATTEMPTS: u32 = 10;
const SIGNAL_RETRY_DELAY: Duration = Duration::from_millis(10);
const JUMP_WAIT_ATTEMPTS: u32 = 50;
const JUMP_WAIT_DELAY: Duration = Duration::from_millis(2);
const RECOVERY_DELAY: Duration = Duration::from_millis(100);

/// The playback engine.
///
/// Commands may be issued from any thread; they are serialized by the
/// command lock, which also guards the live cancel token. A single worker
/// thread plays the current track whenever it receives the play signal and
/// keeps advancing through the catalog until a command cancels it.
///
/// If the audio output fails for every track of a full lap, the worker
/// gives up and [`Player::join`] reports [`PlayerError::OutputUnavailable`].
pub struct Player {
    catalog: Catalog,
    output: Box<dyn AudioOutput>,
    tags: TagTable,
    buffer_size: usize,
    commands: Mutex<CancelToken>,
    current: Mutex<usize>,
    queue: SelectionQueue,
    /// Bumped by every next/previous, so a session can tell that its track
    /// was skipped while a pause was already in flight.
    skips: AtomicU64,
    playing: AtomicBool,
    shutdown: AtomicBool,
    output_failed: AtomicBool,
    signal_tx: SyncSender<()>,
    signal_rx: Mutex<Option<Receiver<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub fn new(
        catalog: Catalog,
        output: Box<dyn AudioOutput>,
        tags: TagTable,
    ) -> Result<Self, PlayerError> {
        if catalog.is_empty() {
            return Err(PlayerError::EmptyCatalog);
        }
        // Rendezvous: a signal is only delivered to a worker that is waiting.
        let (signal_tx, signal_rx) = mpsc::sync_channel(0);

        Ok(Self {
            catalog,
            output,
            tags,
            buffer_size: SINK_BUFFER_SIZE,
            commands: Mutex::new(CancelToken::new()),
            current: Mutex::new(0),
            queue: SelectionQueue::default(),
            skips: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            output_failed: AtomicBool::new(false),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            worker: Mutex::new(None),
        })
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Start the playback worker. Calling it again is a no-op.
    pub fn spawn_worker(self: &Arc<Self>) -> Result<(), PlayerError> {
        let Some(signal) = lock(&self.signal_rx).take() else {
            return Ok(());
        };
        let player = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("playback".into())
            .spawn(move || player.run_worker(signal))
            .map_err(PlayerError::Spawn)?;
        *lock(&self.worker) = Some(handle);
        Ok(())
    }

    /// Block until the worker exits.
    pub fn join(&self) -> Result<(), PlayerError> {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("playback worker panicked");
            }
        }
        if self.output_failed.load(Ordering::Acquire) {
            return Err(PlayerError::OutputUnavailable);
        }
        Ok(())
    }

    /// Pause playback and ask the worker to exit. Use [`Player::join`] to
    /// wait for it.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        lock(&self.commands).cancel(CancelCause::Pause);
        info!("shutting down");
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn current_index(&self) -> usize {
        *lock(&self.current)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Pause when playing, otherwise start or resume the current track.
    pub fn toggle(&self) {
        let mut token = lock(&self.commands);
        renew(&mut token, CancelCause::Pause);
        if self.is_playing() {
            info!("pause");
            return;
        }
        info!("play");
        self.send_play_signal();
    }

    pub fn next(&self) {
        self.skip(CancelCause::Next);
    }

    pub fn previous(&self) {
        self.skip(CancelCause::Previous);
    }

    fn skip(&self, cause: CancelCause) {
        let mut token = lock(&self.commands);
        renew(&mut token, cause);

        let mut current = lock(&self.current);
        self.skips.fetch_add(1, Ordering::AcqRel);
        if let Some(track) = self.catalog.get(*current) {
            track.rewind();
        }
        *current = match cause {
            CancelCause::Previous => self.catalog.previous(*current),
            _ => self.catalog.next(*current),
        };
        info!(?cause, index = *current, "skip");
        drop(current);

        self.send_play_signal();
    }

    /// Queue `index` to play next, pausing (not rewinding) the current track.
    pub fn select_track(&self, index: usize) -> Result<(), PlayerError> {
        if index >= self.catalog.len() {
            return Err(PlayerError::UnknownTrack(index));
        }
        let mut token = lock(&self.commands);
        if *lock(&self.current) == index {
            debug!(index, "track already selected");
            return Ok(());
        }
        renew(&mut token, CancelCause::Pause);

        let queued = self.queue.push(index);
        if let Err(e) = &queued {
            error!(error = %e, "dropping selection");
        } else {
            info!(index, "track selected");
        }
        self.send_play_signal();
        queued.map_err(PlayerError::from)
    }

    pub fn select_tag(&self, uid: &str) -> Result<(), PlayerError> {
        match self.tags.lookup(uid) {
            Some(index) => self.select_track(index),
            None => {
                warn!(uid, "unknown tag");
                Err(PlayerError::UnknownTag(uid.to_string()))
            }
        }
    }

    /// Move the current track's resume point to `seconds` and resume there.
    pub fn jump(&self, seconds: u64) {
        let mut token = lock(&self.commands);
        renew(&mut token, CancelCause::Pause);

        for _ in 0..JUMP_WAIT_ATTEMPTS {
            if !self.is_playing() {
                break;
            }
            thread::sleep(JUMP_WAIT_DELAY);
        }

        let index = *lock(&self.current);
        if let Some(track) = self.catalog.get(index) {
            let position = jump_position(track, seconds);
            track.set_position(position);
            track.set_paused(true);
            info!(seconds, position, "jump");
        }
        self.send_play_signal();
    }

    pub fn snapshot(&self) -> PlayerState {
        let index = self.current_index();
        self.catalog
            .get(index)
            .map(|track| PlayerState::of(track, self.is_playing()))
            .unwrap_or_default()
    }

    fn send_play_signal(&self) {
        for _ in 0..SIGNAL_ATTEMPTS {
            match self.signal_tx.try_send(()) {
                Ok(()) => return,
                Err(TrySendError::Full(())) => thread::sleep(SIGNAL_RETRY_DELAY),
                Err(TrySendError::Disconnected(())) => break,
            }
        }
        debug!("play signal not delivered, worker busy");
    }

    fn run_worker(self: Arc<Self>, signal: Receiver<()>) {
        info!(tracks = self.catalog.len(), "playback worker started");
        while !self.shutdown.load(Ordering::Acquire) {
            match signal.recv_timeout(SIGNAL_POLL) {
                Ok(()) => self.play_until_cancelled(),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("playback worker stopped");
    }

    fn play_until_cancelled(&self) {
        let mut sink_failures = 0;
        while !self.shutdown.load(Ordering::Acquire) {
            let session = self.begin_session();
            let index = session.index;
            let Some(track) = self.catalog.get(index) else {
                error!(index, "current track missing, restarting from the first track");
                *lock(&self.current) = 0;
                thread::sleep(RECOVERY_DELAY);
                continue;
            };

            self.playing.store(true, Ordering::Release);
            let result = play_track(self.output.as_ref(), self.buffer_size, &session.token, track);
            self.playing.store(false, Ordering::Release);

            match result {
                Ok(()) if session.token.cause() == Some(CancelCause::Pause) => {
                    if !self.continue_after_drain(index, track) {
                        debug!(track = track.name(), "paused at end of track");
                        return;
                    }
                    continue;
                }
                Ok(()) => sink_failures = 0,
                Err(e) => {
                    if let Some(cause) = e.cancel_cause() {
                        debug!(?cause, track = track.name(), "playback interrupted");
                        if cause == CancelCause::Pause {
                            self.settle_pause(&session, track);
                        }
                        return;
                    }
                    if matches!(e, PlaybackError::Sink(SinkError::Device(_))) {
                        sink_failures += 1;
                    } else {
                        sink_failures = 0;
                    }
                    error!(track = %track.path.display(), error = %e, "playback failed, skipping");
                    if sink_failures >= self.catalog.len() {
                        error!(
                            failures = sink_failures,
                            "audio output failed for every track, stopping playback"
                        );
                        self.output_failed.store(true, Ordering::Release);
                        self.shutdown.store(true, Ordering::Release);
                        return;
                    }
                    thread::sleep(RECOVERY_DELAY);
                }
            }
            self.advance_from(index);
        }
    }

    /// Promote a queued selection to current and snapshot what to play.
    fn begin_session(&self) -> Session {
        let token = lock(&self.commands);
        let mut current = lock(&self.current);
        if let Some(index) = self.queue.pop() {
            *current = index;
        }
        Session {
            index: *current,
            token: token.clone(),
            skips: self.skips.load(Ordering::Acquire),
        }
    }

    /// A pause and a skip can race: the pause wins the token, so the session
    /// marks the track paused after the skip already rewound it. Undo that.
    ///
    /// Only the `current` lock is taken here. Commands hold the command lock
    /// while they signal the worker.
    fn settle_pause(&self, session: &Session, track: &Track) {
        let _current = lock(&self.current);
        if self.skips.load(Ordering::Acquire) != session.skips {
            track.rewind();
            debug!(track = track.name(), "skipped while pausing, rewound");
        }
    }

    /// A pause arrived while the sink drained the end of `track`, after the
    /// last cancel check. Returns whether the worker should keep going.
    fn continue_after_drain(&self, index: usize, track: &Track) -> bool {
        let _token = lock(&self.commands);
        // A jump moved the resume point of the finished track.
        if track.is_paused() {
            return true;
        }
        let mut current = lock(&self.current);
        if *current == index {
            *current = self.catalog.next(index);
        }
        !self.queue.is_empty()
    }

    fn advance_from(&self, played: usize) {
        let _token = lock(&self.commands);
        let mut current = lock(&self.current);
        if *current == played {
            *current = self.catalog.next(played);
        }
    }
}

/// What the worker plays next, captured under the command lock.
struct Session {
    index: usize,
    token: CancelToken,
    skips: u64,
}

/// Cancel the live token and install a fresh one.
fn renew(token: &mut CancelToken, cause: CancelCause) {
    token.cancel(cause);
    *token = CancelToken::new();
}

/// Reader offset for `seconds` into `track`, aligned down to 4 bytes.
pub(crate) fn jump_position(track: &Track, seconds: u64) -> u64 {
    if track.duration_seconds == 0 {
        return 0;
    }
    let raw = u128::from(seconds) * u128::from(track.length) / u128::from(track.duration_seconds);
    let position = u64::try_from(raw).unwrap_or(u64::MAX).min(track.length);
    position & !3
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
