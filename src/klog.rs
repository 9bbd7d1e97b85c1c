//! `log` crate sink: every record goes to the serial line (always
//! reachable, including in the `stack_overflow`/`should_panic` test
//! harnesses), mirrored to the VGA text buffer once the kernel has
//! reached a point where writing to it is safe.
//!
//! Nothing in `original_source` has an equivalent: its `kprintf`/`printk`
//! calls are scattered directly at call sites. Routing everything
//! through `log` instead keeps one place to filter by level and one
//! place to silence during tests.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Flipped on once `vga_buffer`'s higher-half mapping is live; until
/// then, `Logger` only writes to serial.
static VGA_READY: AtomicBool = AtomicBool::new(false);

/// Call once the VGA text buffer's virtual mapping is installed.
pub fn mark_vga_ready() {
    VGA_READY.store(true, Ordering::Release);
}

struct Logger;

static LOGGER: Logger = Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = record.level();
        let target = record.target();
        let args = record.args();

        crate::serial_println!("[{level:<5}] {target}: {args}");
        if VGA_READY.load(Ordering::Acquire) {
            crate::println!("[{level:<5}] {target}: {args}");
        }
    }

    fn flush(&self) {}
}

/// Install the global logger at `LevelFilter::Info`.
///
/// # Panics
/// Panics if a logger has already been installed.
pub fn init() {
    log::set_logger(&LOGGER).expect("logger already initialised");
    log::set_max_level(LevelFilter::Info);
}
