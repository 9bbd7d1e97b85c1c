//! IDT construction (component F): a 256-entry interrupt descriptor
//! table installing the entry stubs built in [`crate::isr`].
//!
//! Grounded on `original_source/kernel/core/idt.c`. Only vectors 0..=47
//! and 0x80 get a live gate; every other vector is left absent, which
//! triggers the CPU's own double/triple-fault path rather than this
//! kernel's, since nothing in scope here ever raises them.

use core::mem::size_of;

use crate::config::KERNEL_CS;
use crate::io::lidt;
use crate::isr;

const IDT_ENTRIES: usize = 256;

/// Present, ring-0-callable, 32-bit interrupt gate.
const GATE_FLAGS_KERNEL: u8 = 0x8E;
/// Present, ring-3-callable, 32-bit interrupt gate, for the syscall vector.
const GATE_FLAGS_USER: u8 = 0xEE;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    flags: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            flags: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, flags: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: KERNEL_CS,
            zero: 0,
            flags,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

static mut IDT: [IdtEntry; IDT_ENTRIES] = [IdtEntry::missing(); IDT_ENTRIES];

/// Build every live gate and load the table.
///
/// # Safety
/// Must run once during boot, after `gdt::init` (gates reference
/// `KERNEL_CS`), and before `sti`.
pub unsafe fn init() {
    // SAFETY: single-threaded boot sequence, no concurrent access to `IDT`.
    unsafe {
        for vector in 0..48u8 {
            IDT[vector as usize] = IdtEntry::new(isr::stub_address(vector), GATE_FLAGS_KERNEL);
        }
        IDT[usize::from(crate::config::SYSCALL_VECTOR)] =
            IdtEntry::new(isr::syscall_stub_address(), GATE_FLAGS_USER);

        let pointer = IdtPointer {
            limit: (size_of::<[IdtEntry; IDT_ENTRIES]>() - 1) as u16,
            base: core::ptr::addr_of!(IDT) as u32,
        };
        lidt(core::ptr::addr_of!(pointer).cast::<u8>());
    }
}
