//! Core of a small higher-half 32-bit x86 monolithic kernel: memory
//! management (PMM/VMM/heap), trap and interrupt dispatch (GDT/IDT/ISR),
//! the process/thread scheduling core, and the `int 0x80` syscall
//! surface. See `DESIGN.md` for how each module traces back to
//! `examples/original_source` and to the teacher this crate started
//! from.
//!
//! `main.rs` is the thin `_start`-and-Multiboot-header binary entry;
//! everything reusable and testable lives here.

#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks, naked_functions)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use core::panic::PanicInfo;

pub mod allocator;
pub mod config;
pub mod fs;
pub mod gdt;
pub mod idt;
pub mod interfaces;
pub mod io;
pub mod isr;
pub mod keyboard;
pub mod klog;
pub mod multiboot;
pub mod pic;
pub mod pit;
pub mod pmm;
pub mod proc;
pub mod regs;
pub mod sched;
pub mod serial;
pub mod syscall;
pub mod vga_buffer;
pub mod vmm;

const QEMU_EXIT_PORT: u16 = 0xf4;

/// Test entry point for `cargo test`.
#[cfg(test)]
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    test_main();

    #[expect(clippy::empty_loop, reason = "Infinite loop after the test main function is done.")]
    loop {}
}

/// Exit code passed to QEMU's `isa-debug-exit` device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    /// All tests passed.
    Success = 0x10,
    /// At least one test failed.
    Failure = 0x11,
}

/// Exit QEMU by writing `exit_code` to the `isa-debug-exit` I/O port
/// configured in `Cargo.toml`'s `[package.metadata.qemu]`.
pub fn exit_qemu(exit_code: QemuExitCode) {
    // SAFETY: `QEMU_EXIT_PORT` is only present (and only written) under
    // the `isa-debug-exit` device this kernel's QEMU test runner adds.
    unsafe {
        io::outl(QEMU_EXIT_PORT, exit_code as u32);
    }
}

/// Panic handler shared by every integration test binary.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {info}\n");
    exit_qemu(QemuExitCode::Failure);

    #[expect(clippy::empty_loop, reason = "Endless loop if a test panics. It should not be possible as we exit_qemu before.")]
    loop {}
}

/// Custom test runner for `no_std` testing.
pub fn test_runner(tests: &[&dyn Testable]) {
    println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }

    exit_qemu(QemuExitCode::Success);
}

/// Panic handler for unit tests (`cargo test --lib`).
#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {info}\n");
    exit_qemu(QemuExitCode::Failure);
    loop {}
}

/// Encapsulates the `serial_print!`/`[ok]` bookkeeping around a single
/// `#[test_case]` function.
pub trait Testable {
    /// Run the test, printing its name before and `[ok]` after.
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        use core::any::type_name;

        serial_print!("{}...\t", type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}
