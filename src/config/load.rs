use std::env;
use std::path::{Path, PathBuf};

use super::schema::Settings;

/// System-wide fallback used when no per-user file exists.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/jukebox/config.toml";

/// Configuration loading helpers.
///
/// `Settings::load` layers environment variables (prefix `JUKEBOX__`) over an
/// optional config file and falls back to struct defaults.
impl Settings {
    /// Load settings from environment and an optional config file.
    ///
    /// `explicit` (from the command line) wins over every other location.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let config_path = resolve_config_path(explicit);

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("JUKEBOX")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Perform basic validation checks on loaded settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.buttons.tick_ms == 0 {
            return Err("buttons.tick_ms must be >= 1".to_string());
        }
        if self.buttons.long_press_ms <= self.buttons.tick_ms {
            return Err("buttons.long_press_ms must be greater than buttons.tick_ms".to_string());
        }
        if self.audio.buffer_size < 1024 {
            return Err("audio.buffer_size must be >= 1024".to_string());
        }
        if self.system.reboot_command.is_empty() {
            return Err("system.reboot_command must name a program".to_string());
        }
        Ok(())
    }
}

/// Resolve the config path: `explicit`, then `JUKEBOX_CONFIG_PATH`, then the
/// per-user file when it exists, then [`SYSTEM_CONFIG_PATH`].
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = env::var_os("JUKEBOX_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    match default_config_path() {
        Some(p) if p.is_file() => Some(p),
        _ => Some(PathBuf::from(SYSTEM_CONFIG_PATH)),
    }
}

/// Compute the default config path under `$XDG_CONFIG_HOME/jukebox/config.toml`
/// or `~/.config/jukebox/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|d| d.join("jukebox").join("config.toml"))
}
