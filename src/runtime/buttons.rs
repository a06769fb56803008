use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audio::Player;
use crate::config::{ButtonAction, ButtonSettings, SystemSettings};
use crate::input::{Press, PressTiming, SysfsPin, spawn_button};
use crate::system;

/// Start one dispatcher per configured binding. Pins that cannot be opened
/// are logged and skipped. Returns how many buttons are live.
pub fn spawn_buttons(
    buttons: &ButtonSettings,
    system: &SystemSettings,
    player: &Arc<Player>,
) -> usize {
    let timing = PressTiming::from(buttons);
    let mut live = 0;

    for binding in &buttons.bindings {
        let pin = match SysfsPin::open(
            &buttons.gpio_root,
            binding.gpio,
            buttons.active_low,
            timing.tick,
        ) {
            Ok(pin) => pin,
            Err(e) => {
                warn!(gpio = binding.gpio, error = %e, "button unavailable");
                continue;
            }
        };

        let player = Arc::clone(player);
        let reboot_command = system.reboot_command.clone();
        let (short, long) = (binding.short, binding.long);
        let on_press = Box::new(move |press: Press| {
            let action = match press {
                Press::Short => short,
                Press::Long => long,
            };
            perform(action, &player, &reboot_command);
        });

        match spawn_button(Box::new(pin), timing, on_press) {
            Ok(_) => live += 1,
            Err(e) => warn!(gpio = binding.gpio, error = %e, "cannot start button thread"),
        }
    }

    info!(live, configured = buttons.bindings.len(), "buttons ready");
    live
}

pub fn perform(action: ButtonAction, player: &Player, reboot_command: &[String]) {
    match action {
        ButtonAction::Toggle => player.toggle(),
        ButtonAction::Next => player.next(),
        ButtonAction::Previous => player.previous(),
        ButtonAction::Reboot => {
            if let Err(e) = system::reboot(reboot_command) {
                error!(error = %e, "reboot failed");
            }
        }
        ButtonAction::None => {}
    }
}
