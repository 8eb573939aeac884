//! Hypervisor controller integration.
//!
//! The controller is an opaque external executable.  Two subcommands are
//! used:
//!
//! ```text
//! <controller> list --all
//! <controller> send-key-event <uuid> --scancode <decimal> --event press|release
//! ```
//!
//! `list --all` prints one guest per line as `UUID STATUS NAME`; a header
//! line starting with `UUID` and blank lines are skipped.  Scan codes are
//! decimal on the wire, never hex.
//!
//! A failed `send-key-event` is logged and the key event is considered
//! lost.  It is never retried: a retried press that lands after its
//! matching release would leave the key stuck down on the guest.

use async_trait::async_trait;
use keyrelay_core::RelayIntent;
use uuid::Uuid;

pub mod cli;
pub mod mock;

/// Power state of a guest as reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestStatus {
    Running,
    Stopped,
    Suspended,
    Unknown,
}

impl GuestStatus {
    /// Maps a controller status string; anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "running" => GuestStatus::Running,
            "stopped" => GuestStatus::Stopped,
            "suspended" => GuestStatus::Suspended,
            _ => GuestStatus::Unknown,
        }
    }
}

/// One guest VM known to the hypervisor controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guest {
    pub uuid: Uuid,
    pub status: GuestStatus,
    pub name: String,
}

/// Error type for controller operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The controller executable could not be spawned at all.
    #[error("failed to launch hypervisor controller `{controller}`: {source}")]
    ControllerLaunch {
        controller: String,
        #[source]
        source: std::io::Error,
    },
    /// `send-key-event` exited non-zero; the key event is lost.
    #[error("controller exited {code} sending scancode {scan_code} to {guest}: {stderr}")]
    SendFailed {
        guest: Uuid,
        scan_code: i32,
        code: i32,
        stderr: String,
    },
    /// `list --all` exited non-zero.
    #[error("controller list failed with exit {code}: {stderr}")]
    ListFailed { code: i32, stderr: String },
    /// A guest list line did not parse as `UUID STATUS NAME`.
    #[error("unparseable guest list line: {0:?}")]
    MalformedList(String),
}

/// Trait abstracting the hypervisor controller.
///
/// The production implementation is [`cli::CliGuestController`]; tests use
/// [`mock::RecordingGuestController`].
#[async_trait]
pub trait GuestController: Send + Sync {
    /// Forwards one key event to the guest named by `intent.target`.
    async fn send_key_event(&self, intent: RelayIntent) -> Result<(), RelayError>;

    /// Lists guests known to the hypervisor.
    async fn list_guests(&self) -> Result<Vec<Guest>, RelayError>;
}

/// Parses `list --all` output into guest records.
///
/// Skips blank lines and the header line (first token `UUID`).  The name
/// field is everything after the status token, so names containing spaces
/// survive.
pub fn parse_guest_list(output: &str) -> Result<Vec<Guest>, RelayError> {
    let mut guests = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let first = match fields.next() {
            Some(f) => f,
            None => continue,
        };
        if first.eq_ignore_ascii_case("UUID") {
            continue;
        }
        let uuid = Uuid::parse_str(first)
            .map_err(|_| RelayError::MalformedList(trimmed.to_string()))?;
        let status = fields
            .next()
            .map(GuestStatus::parse)
            .ok_or_else(|| RelayError::MalformedList(trimmed.to_string()))?;
        let name = fields.collect::<Vec<_>>().join(" ");
        guests.push(Guest { uuid, status, name });
    }
    Ok(guests)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_header_and_blank_lines() {
        // Arrange
        let output = "\
UUID                                 STATUS    NAME

6f2a1c9e-0d3b-4e5f-8a71-2b9c4d6e8f01 running   dev-vm
93b8e7d2-4c1a-4f6b-b0d5-7e2f9a3c5b14 stopped   Windows 11 Test
";

        // Act
        let guests = parse_guest_list(output).expect("list should parse");

        // Assert
        assert_eq!(guests.len(), 2);
        assert_eq!(guests[0].status, GuestStatus::Running);
        assert_eq!(guests[0].name, "dev-vm");
        assert_eq!(guests[1].status, GuestStatus::Stopped);
        assert_eq!(guests[1].name, "Windows 11 Test");
    }

    #[test]
    fn test_parse_unknown_status_maps_to_unknown() {
        let output = "6f2a1c9e-0d3b-4e5f-8a71-2b9c4d6e8f01 paused lab-vm\n";
        let guests = parse_guest_list(output).expect("list should parse");
        assert_eq!(guests[0].status, GuestStatus::Unknown);
    }

    #[test]
    fn test_parse_suspended_status() {
        let output = "6f2a1c9e-0d3b-4e5f-8a71-2b9c4d6e8f01 suspended lab-vm\n";
        let guests = parse_guest_list(output).expect("list should parse");
        assert_eq!(guests[0].status, GuestStatus::Suspended);
    }

    #[test]
    fn test_parse_rejects_malformed_uuid() {
        let output = "not-a-uuid running broken-vm\n";
        let result = parse_guest_list(output);
        assert!(matches!(result, Err(RelayError::MalformedList(_))));
    }

    #[test]
    fn test_parse_rejects_missing_status() {
        let output = "6f2a1c9e-0d3b-4e5f-8a71-2b9c4d6e8f01\n";
        let result = parse_guest_list(output);
        assert!(matches!(result, Err(RelayError::MalformedList(_))));
    }

    #[test]
    fn test_parse_empty_output_yields_no_guests() {
        assert!(parse_guest_list("").expect("empty is valid").is_empty());
        assert!(parse_guest_list("\n\n").expect("blank is valid").is_empty());
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(GuestStatus::parse("Running"), GuestStatus::Running);
        assert_eq!(GuestStatus::parse("STOPPED"), GuestStatus::Stopped);
    }
}
