//! Local control surface: newline-delimited JSON over a Unix socket.
//!
//! Each request is one object, `{"command": "...", "payload": "..."}`, and
//! is answered with one line: the player state after the command, or
//! `{"error": "..."}`.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::{Player, PlayerError, PlayerState};

#[derive(Debug, Deserialize)]
struct Request {
    command: String,
    #[serde(default)]
    payload: String,
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed request: {0}")]
    BadRequest(#[from] serde_json::Error),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("invalid payload {0:?}")]
    BadPayload(String),
    #[error(transparent)]
    Player(#[from] PlayerError),
}

/// Parse and execute one request line and render the reply line (without
/// the trailing newline).
pub fn handle_request(player: &Player, line: &str) -> String {
    let reply = serde_json::from_str::<Request>(line)
        .map_err(ControlError::from)
        .and_then(|request| execute(player, &request));

    let rendered = match reply {
        Ok(state) => serde_json::to_string(&state),
        Err(e) => {
            debug!(error = %e, "control request rejected");
            serde_json::to_string(&serde_json::json!({ "error": e.to_string() }))
        }
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

fn execute(player: &Player, request: &Request) -> Result<PlayerState, ControlError> {
    match request.command.as_str() {
        "toggle" => player.toggle(),
        "next" => player.next(),
        "previous" => player.previous(),
        "jump" => player.jump(parse_payload(&request.payload)?),
        "select" => player.select_track(parse_payload(&request.payload)?)?,
        "tag" => player.select_tag(&request.payload)?,
        "state" => {}
        other => return Err(ControlError::UnknownCommand(other.to_string())),
    }
    Ok(player.snapshot())
}

fn parse_payload<T: std::str::FromStr>(payload: &str) -> Result<T, ControlError> {
    payload
        .trim()
        .parse()
        .map_err(|_| ControlError::BadPayload(payload.to_string()))
}

/// A bound control socket, removed again when dropped.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Bind `path`, replacing a stale socket left by a previous run.
    pub fn bind(path: &Path) -> io::Result<Self> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        info!(socket = %path.display(), "control socket listening");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept connections on a background thread, one thread per client.
    pub fn spawn(self, player: Arc<Player>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control".into())
            .spawn(move || self.accept_loop(&player))
    }

    fn accept_loop(&self, player: &Arc<Player>) {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "control accept failed");
                    continue;
                }
            };
            let player = Arc::clone(player);
            let spawned = thread::Builder::new()
                .name("control-conn".into())
                .spawn(move || {
                    if let Err(e) = serve_connection(stream, &player) {
                        debug!(error = %e, "control connection closed");
                    }
                });
            if let Err(e) = spawned {
                warn!(error = %e, "cannot serve control connection");
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn serve_connection(stream: UnixStream, player: &Player) -> io::Result<()> {
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_request(player, &line);
        writer.write_all(reply.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
