//! Criterion benchmarks for the key code translation tables.
//!
//! Every captured keystroke crosses two tables on the hot path: HID usage →
//! internal key code when the device stream decodes a state report, and
//! internal key code → guest scan code when a relay intent is built.  Both
//! are match-based lookups that should stay in the single-digit nanosecond
//! range; these benchmarks catch regressions if the tables ever grow an
//! allocation or a linear scan.
//!
//! ```bash
//! cargo bench --package keyrelay-core --bench keymap_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use keyrelay_core::KeyMapper;

/// A realistic spread of HID usages: common letters, digits at both ends of
/// their range, named keys, arrows, and one unmapped value for the fallback
/// path.
const BENCH_USAGES: &[u32] = &[
    0x04, // A
    0x1D, // Z
    0x1A, // W
    0x1E, // 1
    0x27, // 0
    0x28, // Return
    0x29, // Escape
    0x2A, // Backspace
    0x2B, // Tab
    0x2C, // Space
    0x39, // CapsLock
    0x3A, // F1
    0x45, // F12
    0x4C, // ForwardDelete
    0x4F, // Right arrow
    0x52, // Up arrow
    0xE0, // Left control
    0xE3, // Left command
    0x32, // unmapped, identity path
];

/// Internal key codes covering letters, named keys, and the fallback path.
const BENCH_KEY_CODES: &[i32] = &[0, 6, 13, 18, 29, 36, 48, 49, 53, 57, 96, 111, 117, 123, 126, 55];

fn bench_usage_to_key_code(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_usage");

    group.bench_function("usage_to_key_code_single", |b| {
        b.iter(|| KeyMapper::usage_to_key_code(black_box(0x1A)))
    });

    group.bench_function("usage_to_key_code_batch", |b| {
        b.iter(|| {
            BENCH_USAGES
                .iter()
                .filter_map(|&u| KeyMapper::usage_to_key_code(black_box(u)))
                .sum::<i32>()
        })
    });

    group.finish();
}

fn bench_key_code_to_scan_code(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_scancode");

    group.bench_function("key_code_to_scan_code_single", |b| {
        b.iter(|| KeyMapper::key_code_to_scan_code(black_box(13)))
    });

    group.bench_function("key_code_to_scan_code_batch", |b| {
        b.iter(|| {
            BENCH_KEY_CODES
                .iter()
                .map(|&k| KeyMapper::key_code_to_scan_code(black_box(k)))
                .sum::<i32>()
        })
    });

    group.finish();
}

fn bench_key_code_to_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_names");

    // Allocates a String per call; off the relay hot path but on the log path.
    group.bench_function("key_code_to_name_single", |b| {
        b.iter(|| KeyMapper::key_code_to_name(black_box(13)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_usage_to_key_code,
    bench_key_code_to_scan_code,
    bench_key_code_to_name,
);
criterion_main!(benches);
