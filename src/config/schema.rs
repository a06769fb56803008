use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level daemon settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path: `$XDG_CONFIG_HOME/jukebox/config.toml` (or
/// `~/.config/jukebox/config.toml`), falling back to
/// `/etc/jukebox/config.toml`.
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `JUKEBOX__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library: LibrarySettings,
    pub audio: AudioSettings,
    pub buttons: ButtonSettings,
    pub rfid: RfidSettings,
    pub control: ControlSettings,
    pub system: SystemSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Music directory scanned at start-up.
    pub root: PathBuf,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Whether to recurse into subdirectories.
    pub recursive: bool,
    /// Optional cap on directory recursion depth.
    pub max_depth: Option<usize>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/perm/jukebox-data"),
            follow_links: true,
            include_hidden: true,
            recursive: true,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Device buffer in bytes. Also bounds how much PCM the sink queues
    /// ahead of the device.
    pub buffer_size: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self { buffer_size: 4096 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ButtonSettings {
    /// Poll interval while a button is held (milliseconds).
    pub tick_ms: u64,
    /// Hold time after which a press counts as long (milliseconds).
    pub long_press_ms: u64,
    /// Treat a `0` value as pressed.
    pub active_low: bool,
    /// Root of the sysfs GPIO tree.
    pub gpio_root: PathBuf,
    pub bindings: Vec<ButtonBinding>,
}

impl ButtonSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            tick_ms: 15,
            long_press_ms: 1500,
            active_low: false,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            bindings: vec![
                ButtonBinding::new(4, ButtonAction::Previous, ButtonAction::None),
                ButtonBinding::new(23, ButtonAction::Toggle, ButtonAction::Reboot),
                ButtonBinding::new(24, ButtonAction::Next, ButtonAction::None),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ButtonBinding {
    pub gpio: u32,
    #[serde(default)]
    pub short: ButtonAction,
    #[serde(default)]
    pub long: ButtonAction,
}

impl ButtonBinding {
    pub fn new(gpio: u32, short: ButtonAction, long: ButtonAction) -> Self {
        Self { gpio, short, long }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonAction {
    #[serde(alias = "play-pause", alias = "pause")]
    Toggle,
    Next,
    #[serde(alias = "prev")]
    Previous,
    Reboot,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RfidSettings {
    /// Line-oriented tag source; `-` reads from stdin. Disabled when unset.
    pub device: Option<PathBuf>,
    /// Tag UID to track path, relative to the library root.
    pub tags: HashMap<String, PathBuf>,
    /// Extra TOML file with a `[tags]` table in the same shape.
    pub tags_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Unix socket for the JSON control protocol. Disabled when unset.
    pub socket: Option<PathBuf>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            socket: Some(PathBuf::from("/run/jukebox.sock")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    /// Program and arguments run for the reboot action.
    pub reboot_command: Vec<String>,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            reboot_command: vec!["/sbin/reboot".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
