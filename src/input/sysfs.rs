use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::{InputPin, PinError};

/// A GPIO exported through `/sys/class/gpio`, sampled by reading its
/// `value` file. Edges are found by polling.
#[derive(Debug)]
pub struct SysfsPin {
    name: String,
    value: PathBuf,
    active_low: bool,
    poll: Duration,
    last: bool,
}

impl SysfsPin {
    pub fn open(
        gpio_root: &Path,
        gpio: u32,
        active_low: bool,
        poll: Duration,
    ) -> Result<Self, PinError> {
        let value = gpio_root.join(format!("gpio{gpio}")).join("value");
        if !value.is_file() {
            return Err(PinError::NotExported(value));
        }
        let mut pin = Self {
            name: format!("GPIO{gpio}"),
            value,
            active_low,
            poll,
            last: false,
        };
        // A button held during start-up must be released before it counts.
        pin.is_active()?;
        Ok(pin)
    }

    fn read_level(&self) -> Result<bool, PinError> {
        let raw = fs::read_to_string(&self.value).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PinError::Disconnected,
            _ => PinError::Io(e),
        })?;
        let high = match raw.trim() {
            "0" => false,
            "1" => true,
            other => return Err(PinError::InvalidValue(other.to_string())),
        };
        Ok(high != self.active_low)
    }
}

impl InputPin for SysfsPin {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait_for_edge(&mut self) -> Result<bool, PinError> {
        loop {
            let was_active = self.last;
            if self.is_active()? && !was_active {
                return Ok(true);
            }
            thread::sleep(self.poll);
        }
    }

    fn is_active(&mut self) -> Result<bool, PinError> {
        let active = self.read_level()?;
        self.last = active;
        Ok(active)
    }
}
