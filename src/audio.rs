//! Playback: format readers, audio sinks, the cancellable transfer loop and
//! the command-driven engine that ties them together.

mod cancel;
mod player;
mod queue;
mod reader;
mod sink;
mod transfer;
mod types;
mod worker;

pub use player::Player;
pub use sink::RodioOutput;
pub use types::{PlayerError, PlayerState};

#[cfg(test)]
pub use sink::{AudioOutput, AudioSink, SinkError, SinkParams};

#[cfg(test)]
mod tests;
