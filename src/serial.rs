//! 16550 UART driver (part of component G), a [`CharSink`].
//!
//! `uart_16550` is built on the `x86_64` crate's `Port` type and cannot
//! target this kernel's 32-bit mode, so the divisor/LCR/FCR/LSR sequence
//! is hand-written here, grounded on
//! `original_source/kernel/arch/i386/serial.c`. The `serial_print!`/
//! `serial_println!` macro surface is kept exactly as the teacher's.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::interfaces::CharSink;
use crate::io::{inb, outb};

const COM1: u16 = 0x3F8;

struct SerialPort {
    base: u16,
}

impl SerialPort {
    /// # Safety
    /// `base` must be a valid, present COM port.
    const unsafe fn new(base: u16) -> Self {
        Self { base }
    }

    fn init(&mut self) {
        // SAFETY: standard 16550 bring-up sequence on a dedicated port.
        unsafe {
            outb(self.base + 1, 0x00); // disable interrupts
            outb(self.base + 3, 0x80); // enable DLAB
            outb(self.base, 0x03); // divisor low byte: 38400 baud
            outb(self.base + 1, 0x00); // divisor high byte
            outb(self.base + 3, 0x03); // 8 bits, no parity, one stop bit
            outb(self.base + 2, 0xC7); // enable FIFO, clear, 14-byte threshold
            outb(self.base + 4, 0x0B); // IRQs enabled, RTS/DSR set
        }
    }

    fn line_status(&self) -> u8 {
        // SAFETY: reads the line status register, no side effect beyond that.
        unsafe { inb(self.base + 5) }
    }

    fn transmit_empty(&self) -> bool {
        self.line_status() & 0x20 != 0
    }
}

impl CharSink for SerialPort {
    fn write_byte(&mut self, byte: u8) {
        while !self.transmit_empty() {
            core::hint::spin_loop();
        }
        // SAFETY: THR is only written when the transmit-empty bit is set.
        unsafe {
            outb(self.base, byte);
        }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

lazy_static! {
    static ref SERIAL1: Mutex<SerialPort> = {
        // SAFETY: 0x3F8 is the standard COM1 base port.
        let mut port = unsafe { SerialPort::new(COM1) };
        port.init();
        Mutex::new(port)
    };
}

/// Write raw bytes to the serial line, bypassing the `core::fmt`
/// machinery. Used by [`crate::syscall`]'s `SYS_write`/`SYS_read` echo
/// path and by [`crate::klog`].
pub fn write_bytes(bytes: &[u8]) {
    SERIAL1.lock().write_bytes(bytes);
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;

    #[expect(
        clippy::expect_used,
        reason = "Serial port should be correctly initialized."
    )]
    SERIAL1
        .lock()
        .write_fmt(args)
        .expect("Failed to print on serial port.");
}

/// Print to host machine through serial port interface.
#[macro_export]
macro_rules! serial_print {
    ($($args:tt)*) => {
        $crate::serial::_print(format_args!($($args)*));
    };
}

/// Print to host machine through serial port interface a line.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(
        concat!($fmt, "\n"), $($arg)*));
}
