//! macOS CGEventTap-backed host tap.
//!
//! Installs a session event tap for key-down/key-up at head insert, on a
//! dedicated CFRunLoop thread.  Returning null from the tap callback
//! consumes the event; nothing downstream of the tap sees it.
//!
//! The callback must return quickly: the window server disables taps that
//! stall, delivering `kCGEventTapDisabledByTimeout` instead of key events.
//! The callback re-enables the tap when that happens.
//!
//! # Safety
//!
//! This module uses `unsafe` exclusively for CoreGraphics/CoreFoundation
//! FFI.  All `unsafe` blocks carry `// SAFETY:` comments.

#![cfg(target_os = "macos")]

use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use keyrelay_core::{HostEvent, KeyDirection};

use super::{HostTap, TapCallback, TapDecision, TapError};
use crate::infrastructure::macos_ffi as ffi;

/// The installed decision callback.  One tap at a time.
static DECIDE: Mutex<Option<TapCallback>> = Mutex::new(None);

/// Mach port of the live tap, so the callback can re-enable after a
/// timeout disable and `uninstall` can tear it down.
static TAP_PORT: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());

/// Run loop of the tap thread, for `uninstall` to halt from outside.
static TAP_RUNLOOP: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());

/// CGEventTap-backed [`HostTap`].
pub struct MacosHostTap;

impl MacosHostTap {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacosHostTap {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTap for MacosHostTap {
    fn probe_permission(&self) -> Result<(), TapError> {
        // SAFETY: no preconditions; queries the TCC listen-event grant.
        let granted = unsafe { ffi::CGPreflightListenEventAccess() };
        if granted {
            Ok(())
        } else {
            Err(TapError::PermissionDenied)
        }
    }

    fn install(&self, callback: TapCallback) -> Result<(), TapError> {
        {
            let mut decide = DECIDE.lock().unwrap_or_else(|e| e.into_inner());
            if decide.is_some() {
                return Err(TapError::AlreadyInstalled);
            }
            *decide = Some(callback);
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), TapError>>();
        let spawn = thread::Builder::new()
            .name("keyrelay-tap-runloop".to_string())
            .spawn(move || run_tap_loop(ready_tx));
        if let Err(e) = spawn {
            *DECIDE.lock().unwrap_or_else(|p| p.into_inner()) = None;
            return Err(TapError::InstallFailed(e.to_string()));
        }

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                *DECIDE.lock().unwrap_or_else(|p| p.into_inner()) = None;
                Err(e)
            }
            Err(_) => {
                *DECIDE.lock().unwrap_or_else(|p| p.into_inner()) = None;
                Err(TapError::InstallFailed(
                    "tap thread did not report readiness".to_string(),
                ))
            }
        }
    }

    fn uninstall(&self) {
        // Clear the callback first: any event still in flight on the tap
        // thread passes through instead of consulting a dead session.
        *DECIDE.lock().unwrap_or_else(|e| e.into_inner()) = None;

        let port = TAP_PORT.swap(std::ptr::null_mut(), Ordering::SeqCst);
        if !port.is_null() {
            // SAFETY: the port was created by CGEventTapCreate and is
            // released by the tap thread after its run loop stops.
            unsafe { ffi::CGEventTapEnable(port, false) };
        }
        let run_loop = TAP_RUNLOOP.swap(std::ptr::null_mut(), Ordering::SeqCst);
        if !run_loop.is_null() {
            // SAFETY: CFRunLoopStop is callable from any thread.
            unsafe { ffi::CFRunLoopStop(run_loop) };
        }
    }
}

/// Body of the tap thread: creates the tap, runs the loop, cleans up.
fn run_tap_loop(ready_tx: Sender<Result<(), TapError>>) {
    // SAFETY: all FFI below runs on this thread; the mach port and run
    // loop source are released before the thread exits.
    unsafe {
        let mask: ffi::CGEventMask =
            (1u64 << ffi::kCGEventKeyDown) | (1u64 << ffi::kCGEventKeyUp);
        let port = ffi::CGEventTapCreate(
            ffi::kCGSessionEventTap,
            ffi::kCGHeadInsertEventTap,
            ffi::kCGEventTapOptionDefault,
            mask,
            tap_callback,
            std::ptr::null_mut(),
        );
        if port.is_null() {
            // Creation fails either for a missing grant or a dead window
            // server; the preflight disambiguates.
            let error = if ffi::CGPreflightListenEventAccess() {
                TapError::InstallFailed("CGEventTapCreate returned null".to_string())
            } else {
                TapError::PermissionDenied
            };
            let _ = ready_tx.send(Err(error));
            return;
        }

        let source = ffi::CFMachPortCreateRunLoopSource(ffi::kCFAllocatorDefault, port, 0);
        if source.is_null() {
            ffi::CFRelease(port as ffi::CFTypeRef);
            let _ = ready_tx.send(Err(TapError::InstallFailed(
                "CFMachPortCreateRunLoopSource returned null".to_string(),
            )));
            return;
        }

        let run_loop = ffi::CFRunLoopGetCurrent();
        ffi::CFRunLoopAddSource(run_loop, source, ffi::kCFRunLoopDefaultMode);
        ffi::CGEventTapEnable(port, true);

        TAP_PORT.store(port, Ordering::SeqCst);
        TAP_RUNLOOP.store(run_loop, Ordering::SeqCst);
        let _ = ready_tx.send(Ok(()));

        // Blocks until uninstall() calls CFRunLoopStop.
        ffi::CFRunLoopRun();

        ffi::CFRelease(source as ffi::CFTypeRef);
        ffi::CFRelease(port as ffi::CFTypeRef);
    }
}

/// CGEventTap callback: consult the session's decision function.
///
/// Returning `event` forwards it; returning null consumes it.
extern "C" fn tap_callback(
    _proxy: ffi::CGEventTapProxy,
    event_type: ffi::CGEventType,
    event: ffi::CGEventRef,
    _user_info: *mut c_void,
) -> ffi::CGEventRef {
    let direction = match event_type {
        ffi::kCGEventKeyDown => KeyDirection::Down,
        ffi::kCGEventKeyUp => KeyDirection::Up,
        ffi::kCGEventTapDisabledByTimeout | ffi::kCGEventTapDisabledByUserInput => {
            // The window server disabled us (callback stall or secure
            // input); re-enable and forward.
            let port = TAP_PORT.load(Ordering::SeqCst);
            if !port.is_null() {
                // SAFETY: port is the live tap created by run_tap_loop.
                unsafe { ffi::CGEventTapEnable(port, true) };
            }
            return event;
        }
        _ => return event,
    };

    // SAFETY: `event` is a live CGEventRef for the callback's duration.
    let key_code =
        unsafe { ffi::CGEventGetIntegerValueField(event, ffi::kCGKeyboardEventKeycode) } as i32;

    let decision = {
        let decide = DECIDE.lock().unwrap_or_else(|e| e.into_inner());
        match decide.as_ref() {
            Some(cb) => cb(HostEvent {
                key_code,
                direction,
                at: Instant::now(),
            }),
            None => TapDecision::Pass,
        }
    };

    match decision {
        TapDecision::Pass => event,
        TapDecision::Drop => std::ptr::null_mut(),
    }
}
