//! Unbounded recursion eventually walks the call stack off the single
//! boot-reserved 4 MiB identity/higher-half mapping and takes a page
//! fault, which `isr::panic_from_trap` turns into a Rust panic. There is
//! no 32-bit equivalent of the teacher's IST-based double-fault-safe
//! handler here: a separate double-fault TSS/task-gate is a distinct
//! mechanism this core's GDT (one TSS, for ring transitions only) does
//! not provide, so this test exercises the page-fault path instead of a
//! double fault.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use higherhalf_kernel::{gdt, idt, serial_print};

mod common;

kernel_test_boot!();

/// # Panics
/// This test should panic (via a page fault) once the stack overflows.
#[unsafe(no_mangle)]
extern "C" fn kernel_main(_multiboot_magic: u32, _multiboot_info_phys: u32) -> ! {
    serial_print!("stack_overflow::stack_overflow...\t");

    // SAFETY: runs once, single-threaded, before interrupts are enabled.
    unsafe {
        gdt::init();
        idt::init();
    }

    stack_overflow();

    panic!("Execution should not reach here");
}

#[expect(unconditional_recursion, reason = "This function is expected to cause a stack overflow.")]
fn stack_overflow() {
    stack_overflow();
    volatile::Volatile::new(0).read();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    higherhalf_kernel::test_panic_handler(info)
}
