//! Tests for heap allocation in a `no_std` environment using the kernel's
//! own bump/list allocator.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(higherhalf_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_assert_message)]

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::panic::PanicInfo;

use higherhalf_kernel::multiboot::BootInfo;
use higherhalf_kernel::pmm::ReservedExtents;
use higherhalf_kernel::{allocator, pmm};

mod common;

kernel_test_boot!();

extern "C" {
    static __kernel_pstart: u8;
    static __kernel_pend: u8;
}

/// Iteration count for the "many small allocations" test below; stands
/// in for the teacher's `allocator::HEAP_SIZE` constant, which this
/// allocator's growable heap (`HEAP_INITIAL_SIZE`/`HEAP_MAX_SIZE`) has no
/// direct equivalent of.
const MANY_ALLOCATIONS: usize = 1000;

#[unsafe(no_mangle)]
extern "C" fn kernel_main(multiboot_magic: u32, multiboot_info_phys: u32) -> ! {
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

    test_main();

    #[expect(clippy::empty_loop)]
    loop {}
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    higherhalf_kernel::test_panic_handler(info)
}

#[test_case]
fn when_creating_simple_allocation_then_memory_is_allocated() {
    let heap_value_1 = Box::new(41);
    let heap_value_2 = Box::new(42);

    assert_eq!(*heap_value_1, 41);
    assert_eq!(*heap_value_2, 42);
}

#[test_case]
fn when_creating_large_vec_then_memory_is_allocated() {
    let mut vec = Vec::new();
    for i in 0..1000 {
        vec.push(i);
    }
    assert_eq!(vec.iter().sum::<u64>(), (0..1000).sum());
}

#[test_case]
fn when_many_boxes_are_allocated_then_memory_is_allocated() {
    for i in 0..MANY_ALLOCATIONS {
        let x = Box::new(i);
        assert_eq!(*x, i);
    }
}
