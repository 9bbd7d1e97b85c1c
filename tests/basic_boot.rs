//! Simple boot test for the kernel.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(higherhalf_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;

use higherhalf_kernel::println;

mod common;

kernel_test_boot!();

#[unsafe(no_mangle)]
extern "C" fn kernel_main(_multiboot_magic: u32, _multiboot_info_phys: u32) -> ! {
    test_main();

    #[expect(clippy::empty_loop, reason = "Infinite loop after the test main function is done.")]
    loop {}
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    higherhalf_kernel::test_panic_handler(info)
}

/// Test that we can print a line.
#[test_case]
fn test_println() {
    println!("test_println output");
}
