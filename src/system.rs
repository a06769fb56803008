//! Host actions triggered from the buttons.

use std::io;
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("no reboot command configured")]
    EmptyCommand,
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Flush filesystem buffers, then run `command` (program and arguments).
pub fn reboot(command: &[String]) -> Result<(), SystemError> {
    let (program, args) = command.split_first().ok_or(SystemError::EmptyCommand)?;

    if let Err(e) = run("sync", &[]) {
        warn!(error = %e, "sync before reboot failed");
    }
    info!(program, "rebooting");
    run(program, args)
}

fn run(program: &str, args: &[String]) -> Result<(), SystemError> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| SystemError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !status.success() {
        return Err(SystemError::Failed {
            program: program.to_string(),
            status,
        });
    }
    Ok(())
}
