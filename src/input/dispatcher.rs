use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{InputPin, PinError, Press, PressTiming};

/// Follow one press from its rising edge to release.
///
/// Every active sample adds one `tick` to the hold time. Once the hold time
/// reaches `timing.long_press` a long press is reported, exactly once, and
/// the input is polled until release without reporting anything else. A
/// release before that reports a short press.
pub fn classify_press(
    pin: &mut dyn InputPin,
    timing: &PressTiming,
    on_press: &mut dyn FnMut(Press),
    sleep: &mut dyn FnMut(Duration),
) -> Result<Press, PinError> {
    let mut held = Duration::ZERO;
    let mut long_fired = false;

    while pin.is_active()? {
        held += timing.tick;
        if !long_fired && held >= timing.long_press {
            long_fired = true;
            on_press(Press::Long);
        }
        sleep(timing.tick);
    }

    if long_fired {
        return Ok(Press::Long);
    }
    on_press(Press::Short);
    Ok(Press::Short)
}

/// Wait for presses on `pin` forever, or until it disconnects.
pub fn run_dispatcher(
    pin: &mut dyn InputPin,
    timing: &PressTiming,
    on_press: &mut dyn FnMut(Press),
    sleep: &mut dyn FnMut(Duration),
) {
    loop {
        match pin.wait_for_edge() {
            Ok(true) => {}
            Ok(false) => {
                warn!(pin = pin.name(), "woke up without an edge");
                continue;
            }
            Err(PinError::Disconnected) => break,
            Err(e) => {
                warn!(pin = pin.name(), error = %e, "waiting for edge failed");
                sleep(timing.tick);
                continue;
            }
        }

        match classify_press(pin, timing, on_press, sleep) {
            Ok(press) => debug!(pin = pin.name(), ?press, "button press"),
            Err(PinError::Disconnected) => break,
            Err(e) => warn!(pin = pin.name(), error = %e, "lost track of press"),
        }
    }
    info!(pin = pin.name(), "button disconnected");
}

/// Run a dispatcher for `pin` on its own thread.
pub fn spawn_button(
    mut pin: Box<dyn InputPin>,
    timing: PressTiming,
    mut on_press: Box<dyn FnMut(Press) + Send>,
) -> io::Result<JoinHandle<()>> {
    let name = format!("button-{}", pin.name());
    thread::Builder::new().name(name).spawn(move || {
        run_dispatcher(pin.as_mut(), &timing, on_press.as_mut(), &mut thread::sleep);
    })
}
