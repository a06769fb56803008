//! Push buttons: short/long press classification over polled digital inputs.

mod dispatcher;
mod sysfs;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ButtonSettings;

pub use dispatcher::spawn_button;
pub use sysfs::SysfsPin;

#[derive(Debug, Error)]
pub enum PinError {
    #[error("gpio not exported: {0}")]
    NotExported(PathBuf),
    #[error("gpio read failed: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected gpio value {0:?}")]
    InvalidValue(String),
    #[error("gpio disconnected")]
    Disconnected,
}

/// A digital input that can be waited on and sampled.
pub trait InputPin: Send {
    fn name(&self) -> &str;

    /// Block until the input becomes active. `Ok(false)` is a wake-up
    /// without an edge.
    fn wait_for_edge(&mut self) -> Result<bool, PinError>;

    fn is_active(&mut self) -> Result<bool, PinError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Press {
    Short,
    Long,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PressTiming {
    /// Poll interval while the input is held.
    pub tick: Duration,
    /// Hold time at which a press becomes long.
    pub long_press: Duration,
}

impl Default for PressTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(15),
            long_press: Duration::from_millis(1500),
        }
    }
}

impl From<&ButtonSettings> for PressTiming {
    fn from(settings: &ButtonSettings) -> Self {
        Self {
            tick: settings.tick(),
            long_press: settings.long_press(),
        }
    }
}
