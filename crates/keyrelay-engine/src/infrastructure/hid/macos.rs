//! macOS IOHIDManager-backed HID source.
//!
//! Enumeration opens a manager matched to the generic-desktop keyboard and
//! keypad usages and snapshots the matching devices' identity properties.
//! The listener registers an input-value callback and runs a dedicated
//! CFRunLoop thread; raw values are pushed into an `mpsc` channel exactly
//! like the mock source, so nothing above this module is platform-aware.
//!
//! # Safety
//!
//! This module uses `unsafe` exclusively for IOKit/CoreFoundation FFI.
//! All `unsafe` blocks carry `// SAFETY:` comments.

#![cfg(target_os = "macos")]

use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use keyrelay_core::{Device, Transport};
use tracing::warn;

use super::{HidError, HidKeyValue, HidSource, GENERIC_DESKTOP_PAGE, USAGE_KEYBOARD, USAGE_KEYPAD};
use crate::infrastructure::macos_ffi as ffi;

/// Global sender used by the value callback to deliver reports.
/// Guarded by [`HidSource::start`]'s single-listener check.
static EVENT_SENDER: Mutex<Option<Sender<HidKeyValue>>> = Mutex::new(None);

/// Run loop of the listener thread, for `stop()` to halt from outside.
static LISTENER_RUNLOOP: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());

/// IOHIDManager-backed [`HidSource`].
pub struct MacosHidSource;

impl MacosHidSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacosHidSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HidSource for MacosHidSource {
    fn enumerate(&self) -> Result<Vec<Device>, HidError> {
        // SAFETY: manager creation has no preconditions; every Create/Copy
        // result is released before returning.
        unsafe {
            let manager = ffi::IOHIDManagerCreate(ffi::kCFAllocatorDefault, ffi::kIOHIDOptionsTypeNone);
            if manager.is_null() {
                return Err(HidError::SubsystemUnavailable(
                    "IOHIDManagerCreate returned null".to_string(),
                ));
            }
            set_keyboard_matching(manager);

            let status = ffi::IOHIDManagerOpen(manager, ffi::kIOHIDOptionsTypeNone);
            if status == ffi::kIOReturnNotPermitted {
                ffi::CFRelease(manager as ffi::CFTypeRef);
                return Err(HidError::PermissionDenied);
            }
            if status != ffi::kIOReturnSuccess {
                ffi::CFRelease(manager as ffi::CFTypeRef);
                return Err(HidError::SubsystemUnavailable(format!(
                    "IOHIDManagerOpen failed: {status:#x}"
                )));
            }

            let devices = copy_matched_devices(manager);
            ffi::IOHIDManagerClose(manager, ffi::kIOHIDOptionsTypeNone);
            ffi::CFRelease(manager as ffi::CFTypeRef);
            Ok(devices)
        }
    }

    fn start(&self) -> Result<mpsc::Receiver<HidKeyValue>, HidError> {
        let (tx, rx) = mpsc::channel::<HidKeyValue>();
        {
            let mut sender = EVENT_SENDER.lock().unwrap_or_else(|e| e.into_inner());
            if sender.is_some() {
                return Err(HidError::AlreadyStarted);
            }
            *sender = Some(tx);
        }

        // The listener thread reports whether the manager opened.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), HidError>>();
        thread::Builder::new()
            .name("keyrelay-hid-runloop".to_string())
            .spawn(move || run_listener_loop(ready_tx))
            .map_err(|e| HidError::SubsystemUnavailable(e.to_string()))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(rx),
            Ok(Err(e)) => {
                *EVENT_SENDER.lock().unwrap_or_else(|p| p.into_inner()) = None;
                Err(e)
            }
            Err(_) => {
                *EVENT_SENDER.lock().unwrap_or_else(|p| p.into_inner()) = None;
                Err(HidError::SubsystemUnavailable(
                    "HID listener thread did not report readiness".to_string(),
                ))
            }
        }
    }

    fn stop(&self) {
        // Drop the sender first so the consumer's channel closes, then
        // halt the run loop so the thread unwinds its manager.
        *EVENT_SENDER.lock().unwrap_or_else(|e| e.into_inner()) = None;
        let run_loop = LISTENER_RUNLOOP.swap(std::ptr::null_mut(), Ordering::SeqCst);
        if !run_loop.is_null() {
            // SAFETY: CFRunLoopStop is documented as safe to call from any
            // thread with a valid run loop reference.
            unsafe { ffi::CFRunLoopStop(run_loop) };
        }
    }
}

/// Installs matching dictionaries for keyboard and keypad usages.
///
/// # Safety
///
/// `manager` must be a live IOHIDManagerRef.
unsafe fn set_keyboard_matching(manager: ffi::IOHIDManagerRef) {
    let keyboard = usage_matching_dict(GENERIC_DESKTOP_PAGE, USAGE_KEYBOARD);
    let keypad = usage_matching_dict(GENERIC_DESKTOP_PAGE, USAGE_KEYPAD);
    let pair = [keyboard as *const c_void, keypad as *const c_void];
    let array = ffi::CFArrayCreate(
        ffi::kCFAllocatorDefault,
        pair.as_ptr(),
        pair.len() as ffi::CFIndex,
        &ffi::kCFTypeArrayCallBacks,
    );
    ffi::IOHIDManagerSetDeviceMatchingMultiple(manager, array);
    ffi::CFRelease(array as ffi::CFTypeRef);
    ffi::CFRelease(keyboard as ffi::CFTypeRef);
    ffi::CFRelease(keypad as ffi::CFTypeRef);
}

/// Builds `{DeviceUsagePage: page, DeviceUsage: usage}`.
///
/// # Safety
///
/// FFI only; the returned dictionary must be released by the caller.
unsafe fn usage_matching_dict(page: u32, usage: u32) -> ffi::CFMutableDictionaryRef {
    let dict = ffi::CFDictionaryCreateMutable(
        ffi::kCFAllocatorDefault,
        2,
        &ffi::kCFTypeDictionaryKeyCallBacks,
        &ffi::kCFTypeDictionaryValueCallBacks,
    );
    let page = page as i32;
    let usage = usage as i32;
    let page_num = ffi::CFNumberCreate(
        ffi::kCFAllocatorDefault,
        ffi::kCFNumberSInt32Type,
        &page as *const i32 as *const c_void,
    );
    let usage_num = ffi::CFNumberCreate(
        ffi::kCFAllocatorDefault,
        ffi::kCFNumberSInt32Type,
        &usage as *const i32 as *const c_void,
    );
    let page_key = ffi::cfstr("DeviceUsagePage\0");
    let usage_key = ffi::cfstr("DeviceUsage\0");
    ffi::CFDictionarySetValue(dict, page_key, page_num as *const c_void);
    ffi::CFDictionarySetValue(dict, usage_key, usage_num as *const c_void);
    ffi::CFRelease(page_key);
    ffi::CFRelease(usage_key);
    ffi::CFRelease(page_num as ffi::CFTypeRef);
    ffi::CFRelease(usage_num as ffi::CFTypeRef);
    dict
}

/// Snapshots identity properties of every matched device.
///
/// # Safety
///
/// `manager` must be a live, opened IOHIDManagerRef.
unsafe fn copy_matched_devices(manager: ffi::IOHIDManagerRef) -> Vec<Device> {
    let set = ffi::IOHIDManagerCopyDevices(manager);
    if set.is_null() {
        return Vec::new();
    }
    let count = ffi::CFSetGetCount(set) as usize;
    let mut handles: Vec<*const c_void> = vec![std::ptr::null(); count];
    ffi::CFSetGetValues(set, handles.as_mut_ptr());

    let mut devices = Vec::with_capacity(count);
    for &handle in &handles {
        let device = handle as ffi::IOHIDDeviceRef;
        if device.is_null() {
            continue;
        }
        devices.push(read_device_record(device));
    }
    ffi::CFRelease(set as ffi::CFTypeRef);
    devices
}

/// Builds a [`Device`] from one registry handle.
///
/// # Safety
///
/// `device` must be a live IOHIDDeviceRef.
unsafe fn read_device_record(device: ffi::IOHIDDeviceRef) -> Device {
    let vendor_id = ffi::device_u32_property(device, "VendorID\0").unwrap_or(0);
    let product_id = ffi::device_u32_property(device, "ProductID\0").unwrap_or(0);
    let location_id = ffi::device_u32_property(device, "LocationID\0").unwrap_or(0);
    let transport = ffi::device_string_property(device, "Transport\0");
    let name = ffi::device_string_property(device, "Product\0");
    let manufacturer = ffi::device_string_property(device, "Manufacturer\0");

    Device::new(
        vendor_id,
        product_id,
        location_id,
        Transport::classify(&transport, location_id),
        name,
        manufacturer,
    )
}

/// Body of the listener thread: owns the manager and the run loop.
fn run_listener_loop(ready_tx: Sender<Result<(), HidError>>) {
    // SAFETY: all FFI below runs on this thread; the manager is released
    // before the thread exits.
    unsafe {
        let manager = ffi::IOHIDManagerCreate(ffi::kCFAllocatorDefault, ffi::kIOHIDOptionsTypeNone);
        if manager.is_null() {
            let _ = ready_tx.send(Err(HidError::SubsystemUnavailable(
                "IOHIDManagerCreate returned null".to_string(),
            )));
            return;
        }
        set_keyboard_matching(manager);
        ffi::IOHIDManagerRegisterInputValueCallback(
            manager,
            input_value_callback,
            std::ptr::null_mut(),
        );

        let run_loop = ffi::CFRunLoopGetCurrent();
        ffi::IOHIDManagerScheduleWithRunLoop(manager, run_loop, ffi::kCFRunLoopDefaultMode);

        let status = ffi::IOHIDManagerOpen(manager, ffi::kIOHIDOptionsTypeNone);
        if status == ffi::kIOReturnNotPermitted {
            ffi::IOHIDManagerUnscheduleFromRunLoop(manager, run_loop, ffi::kCFRunLoopDefaultMode);
            ffi::CFRelease(manager as ffi::CFTypeRef);
            let _ = ready_tx.send(Err(HidError::PermissionDenied));
            return;
        }
        if status != ffi::kIOReturnSuccess {
            ffi::IOHIDManagerUnscheduleFromRunLoop(manager, run_loop, ffi::kCFRunLoopDefaultMode);
            ffi::CFRelease(manager as ffi::CFTypeRef);
            let _ = ready_tx.send(Err(HidError::SubsystemUnavailable(format!(
                "IOHIDManagerOpen failed: {status:#x}"
            ))));
            return;
        }

        LISTENER_RUNLOOP.store(run_loop, Ordering::SeqCst);
        let _ = ready_tx.send(Ok(()));

        // Blocks until stop() calls CFRunLoopStop.
        ffi::CFRunLoopRun();

        ffi::IOHIDManagerUnscheduleFromRunLoop(manager, run_loop, ffi::kCFRunLoopDefaultMode);
        ffi::IOHIDManagerClose(manager, ffi::kIOHIDOptionsTypeNone);
        ffi::CFRelease(manager as ffi::CFTypeRef);
    }
}

/// IOHIDManager input value callback.
///
/// Runs on the listener thread's run loop; must stay short.  Extracts the
/// element's usage pair, the integer value, and the reporting device's
/// identity triple, then forwards over the channel.
extern "C" fn input_value_callback(
    _context: *mut c_void,
    result: ffi::IOReturn,
    _sender: *mut c_void,
    value: ffi::IOHIDValueRef,
) {
    if result != ffi::kIOReturnSuccess || value.is_null() {
        return;
    }
    // SAFETY: `value` is a live IOHIDValueRef for the duration of the
    // callback; element and device references derived from it share that
    // lifetime and are not retained.
    let report = unsafe {
        let element = ffi::IOHIDValueGetElement(value);
        if element.is_null() {
            return;
        }
        let device = ffi::IOHIDElementGetDevice(element);
        if device.is_null() {
            return;
        }
        HidKeyValue {
            vendor_id: ffi::device_u32_property(device, "VendorID\0").unwrap_or(0),
            product_id: ffi::device_u32_property(device, "ProductID\0").unwrap_or(0),
            location_id: ffi::device_u32_property(device, "LocationID\0").unwrap_or(0),
            usage_page: ffi::IOHIDElementGetUsagePage(element),
            usage: ffi::IOHIDElementGetUsage(element),
            value: ffi::IOHIDValueGetIntegerValue(value) as i32,
            at: Instant::now(),
        }
    };

    let sender = EVENT_SENDER.lock().unwrap_or_else(|e| e.into_inner());
    match sender.as_ref() {
        Some(tx) => {
            // Send errors mean the consumer went away mid-teardown.
            let _ = tx.send(report);
        }
        None => warn!("HID value delivered with no listener attached"),
    }
}
