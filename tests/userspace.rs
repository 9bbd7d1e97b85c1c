//! Integration test for user-mode execution.
//!
//! Boots the kernel core, loads a tiny hand-assembled flat binary into
//! the user-accessible code region, switches the CPU to ring 3 via
//! `proc::run_user_and_wait`, and verifies the syscall gate, GDT user
//! segments and the resume-point mechanism all work end to end.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(higherhalf_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![allow(missing_docs)]

extern crate alloc;

use core::panic::PanicInfo;

use higherhalf_kernel::multiboot::BootInfo;
use higherhalf_kernel::pmm::ReservedExtents;
use higherhalf_kernel::{allocator, config, gdt, idt, pmm, proc, serial_println};

mod common;

kernel_test_boot!();

extern "C" {
    static __kernel_pstart: u8;
    static __kernel_pend: u8;
    static stack_top: u8;
}

/// `mov eax, 2` (`SYS_exit`); `mov ebx, 7`; `int 0x80`. A process running
/// this should exit with code 7 without ever reaching the `ud2` past it.
static TEST_BIN: [u8; 13] = [
    0xB8, 0x02, 0x00, 0x00, 0x00, // mov eax, 2
    0xBB, 0x07, 0x00, 0x00, 0x00, // mov ebx, 7
    0xCD, 0x80, // int 0x80
    0x0F, // first byte of ud2, never reached
];

#[unsafe(no_mangle)]
extern "C" fn kernel_main(multiboot_magic: u32, multiboot_info_phys: u32) -> ! {
    // SAFETY: runs once, single-threaded, before interrupts are enabled.
    unsafe {
        gdt::init();
        idt::init();
    }

    // SAFETY: `multiboot_info_phys` is handed off by the boot stub,
    // unmodified, within the identity-aliased first 4 MiB.
    let boot_info = unsafe { BootInfo::new(multiboot_magic, multiboot_info_phys) }
        .expect("boot stub did not hand off a valid Multiboot info structure");

    // SAFETY: linker-provided symbols bounding this image; only their
    // addresses are read.
    let (kernel_start, kernel_end) =
        unsafe { (core::ptr::addr_of!(__kernel_pstart) as u64, core::ptr::addr_of!(__kernel_pend) as u64) };
    pmm::init(
        &boot_info,
        ReservedExtents {
            kernel_phys_start: kernel_start,
            kernel_phys_end: kernel_end,
            boot_phys_start: 0,
            boot_phys_end: 0,
        },
    );
    allocator::init();

    // SAFETY: `stack_top` bounds the kernel stack the TSS `esp0` must
    // point at before the first ring-3 entry.
    let esp0 = unsafe { core::ptr::addr_of!(stack_top) as u32 };
    gdt::set_kernel_stack(esp0);

    test_main();

    #[expect(clippy::empty_loop)]
    loop {}
}

/// `config`'s user-region layout must stay consistent: stack and heap
/// page-aligned, and the code region below the stack.
#[test_case]
fn user_region_layout_is_consistent() {
    assert_eq!(config::USER_STACK_BOTTOM % 4096, 0, "USER_STACK_BOTTOM must be page-aligned.");
    assert_eq!(config::USER_REGION_END % 4096, 0, "USER_REGION_END must be page-aligned.");
    assert_eq!(config::USER_CODE_START % 4096, 0, "USER_CODE_START must be page-aligned.");
    assert!(config::USER_CODE_START < config::USER_STACK_BOTTOM, "user code region must be below the user stack.");
    assert_eq!(config::USER_HEAP_START, config::USER_REGION_END, "sbrk grows from the end of the stack region.");
}

/// The syscall gate must sit at vector 0x80.
#[test_case]
fn syscall_vector_is_0x80() {
    assert_eq!(config::SYSCALL_VECTOR, 0x80, "syscall gate must be vector 0x80.");
}

/// Run the hand-assembled `TEST_BIN` in ring 3 and confirm its exit code
/// comes back through `run_user_and_wait` unharmed.
#[test_case]
fn run_user_and_wait_returns_exit_code() {
    // SAFETY: `kernel_main` already initialised GDT/IDT/PMM/heap and the
    // TSS kernel stack; this is the only user-mode transition this test
    // performs.
    let code = unsafe { proc::run_user_and_wait(&TEST_BIN) }.expect("user program should run to completion");
    assert_eq!(code, 7, "user program should exit with the code it passed to SYS_exit.");
    serial_println!("[ok] user program exited with code {code}");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    higherhalf_kernel::test_panic_handler(info)
}
