//! PS/2 keyboard scancode decode and keystroke queue (part of component
//! G), a [`KeystrokeSource`].
//!
//! Scancode-to-key decoding is delegated to the `pc-keyboard` crate,
//! which is pure software (no port access) and therefore arch-neutral;
//! the ring buffer and the extended control-code mapping are grounded on
//! `original_source/kernel/drivers/keyboard.c`, including that source's
//! "sticky scroll" quirk: holding Ctrl or Alt while pressing Up/Down
//! yields scroll-up/scroll-down codes instead of cursor movement.

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::config::KEYSTROKE_RING_SIZE;
use crate::interfaces::KeystrokeSource;
use crate::io::inb;

const DATA_PORT: u16 = 0x60;

/// Control codes delivered alongside ASCII [1,127], one byte each.
pub const KEY_ARROW_UP: u8 = 0x81;
pub const KEY_ARROW_DOWN: u8 = 0x82;
pub const KEY_ARROW_LEFT: u8 = 0x83;
pub const KEY_ARROW_RIGHT: u8 = 0x84;
pub const KEY_PAGE_UP: u8 = 0x85;
pub const KEY_PAGE_DOWN: u8 = 0x86;
pub const KEY_SCROLL_UP: u8 = 0x87;
pub const KEY_SCROLL_DOWN: u8 = 0x88;

struct Ring {
    buf: [u8; KEYSTROKE_RING_SIZE],
    head: usize,
    tail: usize,
    len: usize,
}

impl Ring {
    const fn new() -> Self {
        Self {
            buf: [0; KEYSTROKE_RING_SIZE],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Push one byte. Drops the newest byte (does nothing) on overflow.
    fn push(&mut self, byte: u8) {
        if self.len == KEYSTROKE_RING_SIZE {
            return;
        }
        self.buf[self.tail] = byte;
        self.tail = (self.tail + 1) % KEYSTROKE_RING_SIZE;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % KEYSTROKE_RING_SIZE;
        self.len -= 1;
        Some(byte)
    }
}

lazy_static! {
    static ref RING: Mutex<Ring> = Mutex::new(Ring::new());
    static ref DECODER: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(
        Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore)
    );
}

/// Whether Ctrl or Alt is currently held, tracked from raw key events so
/// the arrow-to-scroll override can be applied.
static MODIFIER_HELD: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

/// Called from the keyboard IRQ handler. Reads one scancode byte, decodes
/// it, and enqueues the resulting key (if any) onto the keystroke ring.
pub fn on_irq() {
    // SAFETY: reading the 8042 data port in response to IRQ1 is standard.
    let scancode = unsafe { inb(DATA_PORT) };

    let mut decoder = DECODER.lock();
    let Ok(Some(event)) = decoder.add_byte(scancode) else {
        return;
    };

    use pc_keyboard::KeyState;
    if matches!(event.code, KeyCode::LControl | KeyCode::RControl | KeyCode::LAlt | KeyCode::RAlt)
    {
        MODIFIER_HELD.store(event.state == KeyState::Down, core::sync::atomic::Ordering::Relaxed);
        return;
    }

    let Some(decoded) = decoder.process_keyevent(event) else {
        return;
    };

    let sticky = MODIFIER_HELD.load(core::sync::atomic::Ordering::Relaxed);
    let byte = match decoded {
        DecodedKey::Unicode(c) if (c as u32) < 128 && c as u32 != 0 => Some(c as u8),
        DecodedKey::RawKey(KeyCode::ArrowUp) => Some(if sticky { KEY_SCROLL_UP } else { KEY_ARROW_UP }),
        DecodedKey::RawKey(KeyCode::ArrowDown) => {
            Some(if sticky { KEY_SCROLL_DOWN } else { KEY_ARROW_DOWN })
        }
        DecodedKey::RawKey(KeyCode::ArrowLeft) => Some(KEY_ARROW_LEFT),
        DecodedKey::RawKey(KeyCode::ArrowRight) => Some(KEY_ARROW_RIGHT),
        DecodedKey::RawKey(KeyCode::PageUp) => Some(KEY_PAGE_UP),
        DecodedKey::RawKey(KeyCode::PageDown) => Some(KEY_PAGE_DOWN),
        _ => None,
    };

    if let Some(byte) = byte {
        RING.lock().push(byte);
    }
}

/// A zero-sized handle implementing [`KeystrokeSource`] over the global
/// ring buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ps2Keyboard;

impl KeystrokeSource for Ps2Keyboard {
    fn pop(&mut self) -> Option<u8> {
        RING.lock().pop()
    }
}

#[cfg(test)]
mod tests {
    use super::Ring;

    #[test_case]
    fn ring_overflow_drops_newest() {
        let mut ring = Ring::new();
        for i in 0..super::KEYSTROKE_RING_SIZE {
            ring.push(i as u8);
        }
        ring.push(0xFF);
        assert_eq!(ring.len, super::KEYSTROKE_RING_SIZE, "ring must not grow past capacity");
        assert_eq!(ring.pop(), Some(0), "oldest byte must still be first out");
    }

    #[test_case]
    fn ring_fifo_order() {
        let mut ring = Ring::new();
        ring.push(b'a');
        ring.push(b'b');
        ring.push(b'c');
        assert_eq!(ring.pop(), Some(b'a'));
        assert_eq!(ring.pop(), Some(b'b'));
        assert_eq!(ring.pop(), Some(b'c'));
        assert_eq!(ring.pop(), None);
    }
}
