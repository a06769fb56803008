use std::path::Path;

use crate::config;

/// Settings plus the reason they fell back to defaults, if they did. The
/// warning is reported once logging is up, which itself needs the settings.
pub struct LoadedSettings {
    pub settings: config::Settings,
    pub warning: Option<String>,
}

pub fn load_settings(explicit: Option<&Path>) -> LoadedSettings {
    match config::Settings::load(explicit) {
        Ok(s) => match s.validate() {
            Ok(()) => LoadedSettings {
                settings: s,
                warning: None,
            },
            Err(msg) => LoadedSettings {
                settings: config::Settings::default(),
                warning: Some(format!("invalid config, using defaults: {msg}")),
            },
        },
        // Config is optional; failures should not prevent the daemon from starting.
        Err(e) => LoadedSettings {
            settings: config::Settings::default(),
            warning: Some(format!("failed to load config, using defaults: {e}")),
        },
    }
}
