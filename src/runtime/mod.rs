use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use crate::audio::{Player, RodioOutput};
use crate::control::ControlServer;
use crate::library::scan;
use crate::rfid::{TagTable, open_source, spawn_tag_reader};

mod buttons;
mod logging;
mod settings;

/// Command-line arguments for the jukebox daemon.
#[derive(Parser, Debug)]
#[command(name = "jukebox")]
#[command(about = "Button and RFID driven audio jukebox")]
#[command(version)]
struct Cli {
    /// Root folder containing music files (overrides `library.root`).
    #[arg(short, long, env = "JUKEBOX_MUSIC_DIR")]
    music_dir: Option<PathBuf>,

    /// Config file to load instead of the default locations.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = settings::load_settings(cli.config.as_deref());
    logging::init(&loaded.settings.log.level);
    if let Some(warning) = &loaded.warning {
        warn!("{warning}");
    }
    let settings = loaded.settings;

    let root = cli.music_dir.unwrap_or_else(|| settings.library.root.clone());
    info!(root = %root.display(), "scanning music library");
    let catalog = scan(&root, &settings.library)?;

    let tags = TagTable::build(&catalog, &root, &settings.rfid).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring tag file");
        TagTable::default()
    });

    if let Err(e) = RodioOutput::check_default_device() {
        error!(error = %e, "no audio output, exiting");
        return Err(e.into());
    }

    let player = Arc::new(
        Player::new(catalog, Box::new(RodioOutput), tags)?
            .with_buffer_size(settings.audio.buffer_size),
    );
    player.spawn_worker()?;

    buttons::spawn_buttons(&settings.buttons, &settings.system, &player);

    if let Some(device) = &settings.rfid.device {
        let started =
            open_source(device).and_then(|src| spawn_tag_reader(src, Arc::clone(&player)));
        if let Err(e) = started {
            warn!(device = %device.display(), error = %e, "rfid reader unavailable");
        }
    }

    if let Some(socket) = &settings.control.socket {
        let started =
            ControlServer::bind(socket).and_then(|server| server.spawn(Arc::clone(&player)));
        if let Err(e) = started {
            warn!(socket = %socket.display(), error = %e, "control socket unavailable");
        }
    }

    let on_signal = Arc::clone(&player);
    if let Err(e) = ctrlc::set_handler(move || on_signal.shutdown()) {
        warn!(error = %e, "cannot install signal handler");
    }

    info!(tracks = player.catalog().len(), "jukebox ready");
    player.join()?;
    info!("jukebox stopped");
    Ok(())
}
