//! 8259 PIC remap and EOI policy (part of component G).
//!
//! Grounded on `original_source/kernel/arch/i386/pic.c`: remap both
//! controllers while preserving the caller's interrupt masks, and send
//! EOI to the slave before the master whenever the originating vector
//! came from the slave (vector ≥ 40).

use crate::config::{PIC1_OFFSET, PIC2_OFFSET};
use crate::io::{inb, outb};

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const PIC_EOI: u8 = 0x20;

/// Remap the PIC pair to `PIC1_OFFSET`/`PIC2_OFFSET` and unmask only the
/// timer (IRQ 0) and keyboard (IRQ 1) lines.
///
/// # Safety
/// Must run once during boot, before `sti`.
pub unsafe fn init() {
    // SAFETY: sequential out/in on the two PIC command/data ports, the
    // standard ICW1-4 remap sequence; no aliasing, single-threaded boot.
    unsafe {
        let saved_mask1 = inb(PIC1_DATA);
        let saved_mask2 = inb(PIC2_DATA);

        outb(PIC1_COMMAND, ICW1_INIT);
        io_wait();
        outb(PIC2_COMMAND, ICW1_INIT);
        io_wait();

        outb(PIC1_DATA, PIC1_OFFSET);
        io_wait();
        outb(PIC2_DATA, PIC2_OFFSET);
        io_wait();

        outb(PIC1_DATA, 4); // tell master: slave is on IRQ2
        io_wait();
        outb(PIC2_DATA, 2); // tell slave its cascade identity
        io_wait();

        outb(PIC1_DATA, ICW4_8086);
        io_wait();
        outb(PIC2_DATA, ICW4_8086);
        io_wait();

        // Restore the caller's masks, then explicitly unmask timer+keyboard.
        outb(PIC1_DATA, saved_mask1);
        outb(PIC2_DATA, saved_mask2);

        unmask(0);
        unmask(1);
    }
}

fn io_wait() {
    // SAFETY: port 0x80 is the conventional unused "delay" port.
    unsafe {
        outb(0x80, 0);
    }
}

/// Unmask (enable) a single IRQ line, 0..=15.
///
/// # Safety
/// Must be called after [`init`].
pub unsafe fn unmask(irq: u8) {
    let (port, bit) = if irq < 8 {
        (PIC1_DATA, irq)
    } else {
        (PIC2_DATA, irq - 8)
    };
    // SAFETY: read-modify-write of a single PIC mask register.
    unsafe {
        let mask = inb(port) & !(1 << bit);
        outb(port, mask);
    }
}

/// Mask (disable) a single IRQ line, 0..=15.
///
/// # Safety
/// Must be called after [`init`].
pub unsafe fn mask(irq: u8) {
    let (port, bit) = if irq < 8 {
        (PIC1_DATA, irq)
    } else {
        (PIC2_DATA, irq - 8)
    };
    // SAFETY: read-modify-write of a single PIC mask register.
    unsafe {
        let mask = inb(port) | (1 << bit);
        outb(port, mask);
    }
}

/// Send end-of-interrupt for a vector in the remapped IRQ range
/// (`PIC1_OFFSET..PIC1_OFFSET+16`). Slave first if the vector came from
/// the slave controller.
///
/// # Safety
/// Must be called exactly once per handled hardware interrupt, from the
/// common ISR tail, after [`init`].
pub unsafe fn send_eoi(vector: u8) {
    // SAFETY: writes the EOI command byte to one or both PIC command ports.
    unsafe {
        if vector >= PIC2_OFFSET {
            outb(PIC2_COMMAND, PIC_EOI);
        }
        outb(PIC1_COMMAND, PIC_EOI);
    }
}
