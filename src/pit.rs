//! PIT timer programming (part of component G), a [`TickSource`].
//!
//! Grounded on `original_source/kernel/arch/i386/pit.c`: mode-3 square
//! wave, divisor = 1193180 / hz, `hz` clamped to at least 19 so the
//! divisor fits in 16 bits.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::interfaces::TickSource;
use crate::io::outb;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
const PIT_BASE_FREQUENCY: u32 = 1_193_180;
const MIN_HZ: u32 = 19;

const MODE3_CHANNEL0_BINARY: u8 = 0x36;

static TICKS: AtomicU64 = AtomicU64::new(0);
static CONFIGURED_HZ: AtomicU32 = AtomicU32::new(0);

/// Program channel 0 for the requested frequency (clamped to `MIN_HZ`).
///
/// # Safety
/// Must run once during boot, after the IDT/PIC are set up and before
/// `sti`.
pub unsafe fn init(hz: u32) {
    let hz = hz.max(MIN_HZ);
    let divisor = (PIT_BASE_FREQUENCY / hz) as u16;

    // SAFETY: the standard three-byte PIT programming sequence.
    unsafe {
        outb(PIT_COMMAND, MODE3_CHANNEL0_BINARY);
        outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL0, ((divisor >> 8) & 0xFF) as u8);
    }

    CONFIGURED_HZ.store(hz, Ordering::Relaxed);
    TICKS.store(0, Ordering::Relaxed);
}

/// Called from the timer IRQ handler, once per interrupt.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// A zero-sized handle implementing [`TickSource`] over the global
/// tick/Hz counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pit;

impl TickSource for Pit {
    fn ticks(&self) -> u64 {
        TICKS.load(Ordering::Relaxed)
    }

    fn hz(&self) -> u32 {
        CONFIGURED_HZ.load(Ordering::Relaxed)
    }
}

/// Seconds elapsed since boot, per `SYS_time`'s `ticks / configured Hz`.
#[must_use]
pub fn seconds_since_boot() -> u32 {
    let hz = CONFIGURED_HZ.load(Ordering::Relaxed).max(1);
    (TICKS.load(Ordering::Relaxed) / u64::from(hz)) as u32
}
