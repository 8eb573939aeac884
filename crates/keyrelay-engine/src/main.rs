//! KeyRelay engine entry point.
//!
//! Headless operator surface over the engine facade:
//!
//! ```text
//! keyrelay devices                 list keyboard interfaces
//! keyrelay guests                  list guests via the controller
//! keyrelay detect                  identify the keyboard being typed on
//! keyrelay run [--guest UUID] ...  capture (and relay) until stopped
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use keyrelay_core::Selection;
use keyrelay_engine::application::detect_identity::stop_after_presses;
use keyrelay_engine::infrastructure::storage::config::{self, EngineConfig};
use keyrelay_engine::{Engine, SessionMode};

#[derive(Parser)]
#[command(name = "keyrelay", version, about = "Keyboard interposer engine")]
struct Cli {
    /// Path to a config file (defaults to the platform config location).
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached keyboard interfaces.
    Devices,
    /// List guests known to the hypervisor controller.
    Guests,
    /// Detect which keyboard is being typed on.
    Detect {
        /// Stop after this many observed presses.
        #[arg(long, default_value_t = 3)]
        presses: u32,
    },
    /// Run a capture session against the detected or named keyboard.
    Run {
        /// Interface keys to target, bypassing detection.  May repeat; all
        /// keys must belong to one physical keyboard.
        #[arg(long = "device-key")]
        device_keys: Vec<String>,
        /// Guest UUID to relay keystrokes to; capture-only when omitted.
        #[arg(long)]
        guest: Option<Uuid>,
        /// Safety deadline in seconds; unlimited when omitted.
        #[arg(long)]
        duration: Option<u64>,
        /// Presses required by detection when no device key is given.
        #[arg(long, default_value_t = 3)]
        presses: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load_config().context("loading config")?,
    };

    let engine = build_engine(&config)?;

    match cli.command {
        Commands::Devices => {
            let devices = engine.enumerate_devices().context("enumerating devices")?;
            if devices.is_empty() {
                println!("no keyboard interfaces found");
            }
            for d in devices {
                println!(
                    "{}  {:<9}  {}  ({})",
                    d.device_key, d.transport, d.name, d.manufacturer
                );
            }
        }
        Commands::Guests => {
            let guests = engine.list_guests().await.context("listing guests")?;
            for g in guests {
                println!("{}  {:?}  {}", g.uuid, g.status, g.name);
            }
        }
        Commands::Detect { presses } => {
            println!("type {presses} keys on the keyboard you want to interpose...");
            let selection = engine
                .detect_identity(stop_after_presses(presses))
                .context("identity detection")?;
            println!(
                "detected: {} ({} interface(s))",
                selection.display_name(),
                selection.devices().len()
            );
            for d in selection.devices() {
                println!("  {}  {}", d.device_key, d.transport);
            }
        }
        Commands::Run {
            device_keys,
            guest,
            duration,
            presses,
        } => {
            let selection = if device_keys.is_empty() {
                println!("type {presses} keys on the keyboard you want to interpose...");
                engine
                    .detect_identity(stop_after_presses(presses))
                    .context("identity detection")?
            } else {
                let devices = engine.enumerate_devices().context("enumerating devices")?;
                let chosen: Vec<_> = devices
                    .into_iter()
                    .filter(|d| device_keys.contains(&d.device_key))
                    .collect();
                anyhow::ensure!(
                    !chosen.is_empty(),
                    "none of the given device keys are attached"
                );
                Selection::new(chosen).context("device keys must belong to one physical keyboard")?
            };

            let mode = match guest {
                Some(uuid) => SessionMode::Relay(uuid),
                None => SessionMode::CaptureOnly,
            };
            let handle = engine
                .start_session(selection, mode, duration.map(Duration::from_secs))
                .context("starting session")?;
            info!("session running; press Ctrl-C to stop");

            // Block until the operator stops us or the safety deadline
            // drains the session on its own.
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("operator stop");
                        engine.stop_session(&handle);
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {
                        if !engine.session_status(&handle).active {
                            break;
                        }
                    }
                }
            }

            let status = engine.session_status(&handle);
            let log = engine.copy_keystroke_log(&handle);
            println!(
                "session ended: {} keystrokes captured ({} logged)",
                status.events_captured,
                log.len()
            );
        }
    }

    Ok(())
}

#[cfg(target_os = "macos")]
fn build_engine(config: &EngineConfig) -> anyhow::Result<Engine> {
    Ok(Engine::with_platform_sources(config))
}

#[cfg(not(target_os = "macos"))]
fn build_engine(config: &EngineConfig) -> anyhow::Result<Engine> {
    // The engine's decision core is platform-independent, but the HID
    // registry and event tap bindings exist only for macOS.  Off-platform
    // builds are for development and tests against the mock sources.
    use keyrelay_engine::infrastructure::guest::cli::CliGuestController;
    use keyrelay_engine::infrastructure::hid::mock::MockHidSource;
    use keyrelay_engine::infrastructure::host_tap::mock::MockHostTap;
    use std::sync::Arc;

    tracing::warn!("no platform HID/tap bindings for this OS; using inert mock sources");
    Ok(Engine::new(
        config,
        Arc::new(MockHidSource::new(Vec::new())),
        Arc::new(MockHostTap::new()),
        Arc::new(CliGuestController::new(config.controller.path.clone())),
    ))
}
