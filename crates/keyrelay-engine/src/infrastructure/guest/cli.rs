//! Subprocess-backed hypervisor controller.
//!
//! Each operation spawns the controller executable and waits for it to
//! exit.  An invocation takes on the order of 150 ms; the forwarder bounds
//! how many run at once.  There is no per-invocation timeout — the
//! controller is trusted to return, and session teardown is the only
//! recovery if it wedges.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use keyrelay_core::RelayIntent;
use tokio::process::Command;
use tracing::debug;

use super::{parse_guest_list, Guest, GuestController, RelayError};

/// [`GuestController`] implementation that shells out to the controller CLI.
pub struct CliGuestController {
    controller: PathBuf,
}

impl CliGuestController {
    pub fn new(controller: impl Into<PathBuf>) -> Self {
        Self {
            controller: controller.into(),
        }
    }

    pub fn controller_path(&self) -> &Path {
        &self.controller
    }

    fn launch_error(&self, source: std::io::Error) -> RelayError {
        RelayError::ControllerLaunch {
            controller: self.controller.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl GuestController for CliGuestController {
    async fn send_key_event(&self, intent: RelayIntent) -> Result<(), RelayError> {
        let output: Output = Command::new(&self.controller)
            .arg("send-key-event")
            .arg(intent.target.to_string())
            .arg("--scancode")
            .arg(intent.scan_code.to_string())
            .arg("--event")
            .arg(intent.direction.as_controller_arg())
            .output()
            .await
            .map_err(|e| self.launch_error(e))?;

        if !output.status.success() {
            return Err(RelayError::SendFailed {
                guest: intent.target,
                scan_code: intent.scan_code,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(
            guest = %intent.target,
            scan_code = intent.scan_code,
            event = intent.direction.as_controller_arg(),
            "relayed key event"
        );
        Ok(())
    }

    async fn list_guests(&self) -> Result<Vec<Guest>, RelayError> {
        let output = Command::new(&self.controller)
            .arg("list")
            .arg("--all")
            .output()
            .await
            .map_err(|e| self.launch_error(e))?;

        if !output.status.success() {
            return Err(RelayError::ListFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_guest_list(&String::from_utf8_lossy(&output.stdout))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
