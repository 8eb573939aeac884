//! Session supervision: lifecycle of one capture/relay run.
//!
//! A session binds one selection, an optional relay target, and an
//! optional safety deadline.  The supervisor owns the state machine
//!
//! ```text
//! Idle ──► Preparing ──► Active ──► Draining ──► Idle
//! ```
//!
//! and the teardown ordering contract: the host tap is removed *before*
//! the HID stream, so the last in-flight host events still decide against
//! an authoritative pressed set.  Tearing down in the opposite order lets
//! stray Ups for held keys leak to the host.
//!
//! If one of the two streams fails to start, the session proceeds in a
//! degraded mode (capture-only without the tap, block-only without the
//! device stream) rather than aborting — the keystroke log and the event
//! channel retain their value either way.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc::Receiver, Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use keyrelay_core::{HostEvent, KeyDirection, KeyMapper, Keystroke, RelayIntent, Selection};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::correlator::{Correlator, CorrelatorTuning, Decision};
use crate::application::device_stream::DeviceStream;
use crate::application::forward_relay::{spawn_forwarder, RELAY_QUEUE_DEPTH};
use crate::events::EngineEvent;
use crate::infrastructure::guest::GuestController;
use crate::infrastructure::hid::{HidKeyValue, HidSource};
use crate::infrastructure::host_tap::{HostTap, TapCallback, TapDecision};

/// Supervisor state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Preparing,
    Active,
    Draining,
}

/// What a session does with captured keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Capture and block only; nothing is forwarded.
    CaptureOnly,
    /// Capture, block, and relay to the given guest.
    Relay(Uuid),
}

/// Degradation applied when one of the two streams failed to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedMode {
    /// The host tap is unavailable: keystrokes are captured (and relayed)
    /// but nothing is blocked from the host.
    CaptureOnly,
    /// The device stream is unavailable: the tap is installed but has no
    /// HID evidence to correlate against, so everything passes.
    BlockOnly,
}

/// Read-only status snapshot.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub active: bool,
    pub events_captured: u64,
    pub time_remaining: Option<Duration>,
    pub degraded: Option<DegradedMode>,
}

/// Error type for session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a session is already active")]
    AlreadyActive,
    #[error("selection is empty")]
    EmptySelection,
    #[error("both the device stream and the host tap failed to start")]
    StartFailed,
    #[error("failed to spawn device stream thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Supervisor knobs, normally derived from the config file.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub tuning: CorrelatorTuning,
    pub janitor_period: Duration,
    /// Cadence of the re-enumeration check for a vanished device.
    pub vanish_poll: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tuning: CorrelatorTuning::default(),
            janitor_period: crate::application::correlator::DEFAULT_JANITOR_PERIOD,
            vanish_poll: Duration::from_secs(2),
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Owns the collaborators and enforces one active session at a time.
pub struct SessionSupervisor {
    hid: Arc<dyn HidSource>,
    tap: Arc<dyn HostTap>,
    controller: Arc<dyn GuestController>,
    events: mpsc::UnboundedSender<EngineEvent>,
    config: SupervisorConfig,
    active: Mutex<Weak<SessionRuntime>>,
}

impl SessionSupervisor {
    pub fn new(
        hid: Arc<dyn HidSource>,
        tap: Arc<dyn HostTap>,
        controller: Arc<dyn GuestController>,
        events: mpsc::UnboundedSender<EngineEvent>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            hid,
            tap,
            controller,
            events,
            config,
            active: Mutex::new(Weak::new()),
        }
    }

    /// Starts a session.  Must be called from within a tokio runtime (the
    /// janitor, safety timer, and forwarder run as tasks on it).
    pub fn start_session(
        &self,
        selection: Selection,
        mode: SessionMode,
        duration: Option<Duration>,
    ) -> Result<SessionHandle, SessionError> {
        if selection.is_empty() {
            return Err(SessionError::EmptySelection);
        }
        {
            let active = lock_unpoisoned(&self.active);
            if let Some(runtime) = active.upgrade() {
                if runtime.state() != SessionState::Idle {
                    return Err(SessionError::AlreadyActive);
                }
            }
        }

        let _ = self.events.send(EngineEvent::SessionStateChanged {
            state: SessionState::Preparing,
        });
        info!(
            target_name = selection.display_name(),
            interfaces = selection.devices().len(),
            ?mode,
            "session preparing"
        );

        let correlator = Arc::new(Correlator::new(self.config.tuning.clone()));

        // Host tap: permission dry-open, then install with the decision
        // callback.  The callback runs on the tap thread and must stay
        // O(1); both decision functions are single map operations.
        let tap_active = match self.tap.probe_permission() {
            Ok(()) => {
                let callback = make_tap_callback(Arc::clone(&correlator), self.events.clone());
                match self.tap.install(callback) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "event tap install failed");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "event tap permission probe failed");
                false
            }
        };

        let hid_rx = match self.hid.start() {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!(error = %e, "device stream failed to start");
                None
            }
        };

        if hid_rx.is_none() && !tap_active {
            let _ = self.events.send(EngineEvent::SessionStateChanged {
                state: SessionState::Idle,
            });
            return Err(SessionError::StartFailed);
        }
        let degraded = match (hid_rx.is_some(), tap_active) {
            (true, true) => None,
            (true, false) => Some(DegradedMode::CaptureOnly),
            (false, true) => Some(DegradedMode::BlockOnly),
            (false, false) => unreachable!("rejected above"),
        };
        if let Some(d) = degraded {
            warn!(?d, "session starting degraded");
        }

        let started_at = Instant::now();
        let runtime = Arc::new(SessionRuntime {
            selection,
            mode,
            state: Mutex::new(SessionState::Active),
            degraded,
            deadline: duration.map(|d| started_at + d),
            started_at,
            events_captured: AtomicU64::new(0),
            keystroke_log: Mutex::new(Vec::new()),
            correlator,
            draining: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            hid: Arc::clone(&self.hid),
            tap: Arc::clone(&self.tap),
            events: self.events.clone(),
        });

        // Relay pipeline.  The forwarder is deliberately *not* tracked in
        // `tasks`: draining must let queued intents and in-flight
        // controller invocations complete, and the task exits on its own
        // once the intent sender drops with the device stream thread.
        let relay_tx = match mode {
            SessionMode::Relay(_) => {
                let (tx, rx) = mpsc::channel(RELAY_QUEUE_DEPTH);
                spawn_forwarder(rx, Arc::clone(&self.controller), self.events.clone());
                Some(tx)
            }
            SessionMode::CaptureOnly => None,
        };

        // Device stream thread: blocks on the report channel, exits when
        // `hid.stop()` closes it during draining.
        if let Some(rx) = hid_rx {
            let rt = Arc::clone(&runtime);
            let spawned = std::thread::Builder::new()
                .name("keyrelay-hid-stream".to_string())
                .spawn(move || run_device_stream(rx, rt, relay_tx));
            if let Err(e) = spawned {
                self.tap.uninstall();
                self.hid.stop();
                let _ = self.events.send(EngineEvent::SessionStateChanged {
                    state: SessionState::Idle,
                });
                return Err(SessionError::ThreadSpawn(e));
            }
        }

        // Janitor: periodic prune of the correlation maps.
        {
            let rt = Arc::clone(&runtime);
            let period = self.config.janitor_period;
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await; // immediate first tick
                loop {
                    ticker.tick().await;
                    rt.correlator.prune(Instant::now());
                }
            });
            lock_unpoisoned(&runtime.tasks).push(handle);
        }

        // Safety timer.
        if let Some(d) = duration {
            let rt = Arc::clone(&runtime);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(d).await;
                rt.drain("safety deadline");
            });
            lock_unpoisoned(&runtime.tasks).push(handle);
        }

        // Vanished-device monitor: re-enumerates and drains when no
        // interface of the selection is present any more.
        {
            let rt = Arc::clone(&runtime);
            let hid = Arc::clone(&self.hid);
            let poll = self.config.vanish_poll;
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match hid.enumerate() {
                        Ok(snapshot) => {
                            let present = rt.selection.devices().iter().any(|d| {
                                snapshot.iter().any(|s| s.device_key == d.device_key)
                            });
                            if !present {
                                let physical_id =
                                    rt.selection.physical_id().unwrap_or_default().to_string();
                                warn!(%physical_id, "selected keyboard vanished");
                                let _ = rt
                                    .events
                                    .send(EngineEvent::DeviceVanished { physical_id });
                                rt.drain("device vanished");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "enumeration failed during vanish check");
                        }
                    }
                }
            });
            lock_unpoisoned(&runtime.tasks).push(handle);
        }

        let _ = self.events.send(EngineEvent::SessionStateChanged {
            state: SessionState::Active,
        });
        info!("session active");

        *lock_unpoisoned(&self.active) = Arc::downgrade(&runtime);
        Ok(SessionHandle { runtime })
    }

    /// Operator stop: drains the session.
    pub fn stop_session(&self, handle: &SessionHandle) {
        handle.runtime.drain("operator stop");
    }
}

/// Builds the tap decision callback for one session.
fn make_tap_callback(
    correlator: Arc<Correlator>,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> TapCallback {
    Arc::new(move |host_event: HostEvent| {
        let decision = match host_event.direction {
            KeyDirection::Down => {
                correlator.should_block_down(host_event.key_code, host_event.at)
            }
            KeyDirection::Up => correlator.should_block_up(host_event.key_code),
        };
        match decision {
            Decision::Block => {
                let _ = events.send(EngineEvent::HostEventBlocked {
                    key_code: host_event.key_code,
                    direction: host_event.direction,
                });
                TapDecision::Drop
            }
            Decision::Pass => TapDecision::Pass,
        }
    })
}

/// Device stream pump, running on its own thread for the session's life.
fn run_device_stream(
    reports: Receiver<HidKeyValue>,
    rt: Arc<SessionRuntime>,
    relay_tx: Option<mpsc::Sender<RelayIntent>>,
) {
    let mut stream = DeviceStream::new(&rt.selection);
    while let Ok(report) = reports.recv() {
        let keystroke = match stream.accept(&report) {
            Some(k) => k,
            None => continue,
        };

        // Correlator first, relay second: this ordering is what guarantees
        // a key's press intent is enqueued before its release intent.
        rt.correlator.record(&keystroke);
        rt.events_captured.fetch_add(1, Ordering::Relaxed);
        let _ = rt.events.send(EngineEvent::KeystrokeCaptured {
            key_code: keystroke.key_code,
            key_name: KeyMapper::key_code_to_name(keystroke.key_code),
            direction: keystroke.direction,
            source_device_key: keystroke.source_device_key.clone(),
        });

        if let (Some(tx), SessionMode::Relay(guest)) = (&relay_tx, rt.mode) {
            let intent = RelayIntent {
                scan_code: KeyMapper::key_code_to_scan_code(keystroke.key_code),
                direction: keystroke.direction.into(),
                target: guest,
            };
            if tx.try_send(intent).is_err() {
                warn!(
                    scan_code = intent.scan_code,
                    "relay queue full, dropping intent"
                );
            }
        }

        lock_unpoisoned(&rt.keystroke_log).push(keystroke);
    }
    // Channel closed: hid.stop() ran, the session is draining.
}

/// Shared state of one running session.
pub struct SessionRuntime {
    selection: Selection,
    mode: SessionMode,
    state: Mutex<SessionState>,
    degraded: Option<DegradedMode>,
    deadline: Option<Instant>,
    started_at: Instant,
    events_captured: AtomicU64,
    keystroke_log: Mutex<Vec<Keystroke>>,
    correlator: Arc<Correlator>,
    draining: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    hid: Arc<dyn HidSource>,
    tap: Arc<dyn HostTap>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl SessionRuntime {
    fn set_state(&self, state: SessionState) {
        *lock_unpoisoned(&self.state) = state;
        let _ = self
            .events
            .send(EngineEvent::SessionStateChanged { state });
    }

    pub fn state(&self) -> SessionState {
        *lock_unpoisoned(&self.state)
    }

    /// Drains the session.  Idempotent; callable from the operator, the
    /// safety timer, or the vanish monitor.
    pub fn drain(&self, reason: &str) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(reason, "session draining");
        self.set_state(SessionState::Draining);

        // Tap before HID: in-flight host events must still see the
        // authoritative pressed set.
        self.tap.uninstall();
        self.hid.stop();
        self.correlator.drain();
        for task in lock_unpoisoned(&self.tasks).drain(..) {
            task.abort();
        }

        self.set_state(SessionState::Idle);
        info!(
            captured = self.events_captured.load(Ordering::Relaxed),
            uptime_ms = self.started_at.elapsed().as_millis() as u64,
            "session idle"
        );
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        SessionStatus {
            state,
            active: state == SessionState::Active,
            events_captured: self.events_captured.load(Ordering::Relaxed),
            time_remaining: match (state, self.deadline) {
                (SessionState::Active, Some(deadline)) => {
                    Some(deadline.saturating_duration_since(Instant::now()))
                }
                _ => None,
            },
            degraded: self.degraded,
        }
    }

    /// Snapshot of the keystroke log; preserved through draining.
    pub fn keystroke_log(&self) -> Vec<Keystroke> {
        lock_unpoisoned(&self.keystroke_log).clone()
    }
}

/// Caller-facing handle to a session.
#[derive(Clone)]
pub struct SessionHandle {
    runtime: Arc<SessionRuntime>,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        self.runtime.status()
    }

    pub fn keystroke_log(&self) -> Vec<Keystroke> {
        self.runtime.keystroke_log()
    }

    pub fn state(&self) -> SessionState {
        self.runtime.state()
    }
}
