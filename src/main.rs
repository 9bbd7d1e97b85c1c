//! Multiboot header, real entry point, and the boot-time page tables
//! that get the CPU from the loader's flat 32-bit protected mode into
//! the higher half — the "early boot" external collaborator spec §1
//! names (out of scope for the core, but something has to hand the
//! core its CR3 and Multiboot pointer).
//!
//! Grounded in shape on `original_source/kernel/core/kernel.c`'s
//! `kernel_main` for the init order, and on the Multiboot 1 header
//! layout `kernel/include/kernel/multiboot.h` parses.

#![no_std]
#![no_main]

use core::arch::global_asm;
use core::panic::PanicInfo;

use higherhalf_kernel::multiboot::BootInfo;
use higherhalf_kernel::pmm::ReservedExtents;
use higherhalf_kernel::{gdt, idt, io, klog, pic, pit, sched};

extern "C" {
    /// `__kernel_pstart`, from `linker.ld`.
    static __kernel_pstart: u8;
    /// `__kernel_pend`, from `linker.ld`.
    static __kernel_pend: u8;
    /// Top of the boot-reserved kernel stack (`stack_top` below); also
    /// the TSS `esp0` value installed before the first ring-3 entry.
    static stack_top: u8;
}

extern "C" fn idle_kthread(_arg: u32) {
    loop {
        sched::sched_yield();
    }
}

/// Called from the higher-half entry stub below, once paging and the
/// stack switch are done. Runs the control flow spec §2 lays out:
/// GDT/IDT → PIC remap + timer → memory subsystems → process/scheduler
/// init → drivers/FS init → `sti` → shell loop (here, an idle kthread
/// standing in for the out-of-scope shell).
#[unsafe(no_mangle)]
extern "C" fn kernel_main(multiboot_magic: u32, multiboot_info_phys: u32) -> ! {
    // SAFETY: runs once, single-threaded, before interrupts are enabled.
    unsafe {
        gdt::init();
        idt::init();
    }

    klog::init();
    log::info!("gdt/idt installed");

    // SAFETY: `multiboot_info_phys` was handed to us by the loader via
    // the boot stub, unmodified, and the identity-aliased first 4 MiB
    // makes it dereferenceable here.
    let boot_info = unsafe { BootInfo::new(multiboot_magic, multiboot_info_phys) }
        .expect("loader did not hand off a valid Multiboot info structure");

    // SAFETY: `__kernel_pstart`/`__kernel_pend` are linker-provided
    // symbols bounding this image; only their addresses are read.
    let (kernel_start, kernel_end) = unsafe {
        (
            core::ptr::addr_of!(__kernel_pstart) as u64,
            core::ptr::addr_of!(__kernel_pend) as u64,
        )
    };
    higherhalf_kernel::pmm::init(
        &boot_info,
        ReservedExtents {
            kernel_phys_start: kernel_start,
            kernel_phys_end: kernel_end,
            boot_phys_start: 0,
            boot_phys_end: 0,
        },
    );
    higherhalf_kernel::allocator::init();
    log::info!("pmm/heap ready: {} frames free", higherhalf_kernel::pmm::free_frames());

    // SAFETY: runs once during boot, before `sti`.
    unsafe {
        pic::init();
        pit::init(higherhalf_kernel::config::TIMER_HZ);
        sched::init();
    }
    klog::mark_vga_ready();

    // SAFETY: `stack_top` bounds the single kernel stack every ring-3
    // transition and same-privilege interrupt re-entry shares.
    let esp0 = unsafe { core::ptr::addr_of!(stack_top) as u32 };
    gdt::set_kernel_stack(esp0);

    sched::kthread_create(idle_kthread, 0, b"idle");

    io::sti();
    log::info!("boot complete");

    loop {
        io::sti();
        io::hlt();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("{info}");
    loop {
        io::cli();
        io::hlt();
    }
}

global_asm!(
    ".section .multiboot_header",
    ".align 4",
    ".long 0x1BADB002",                 // magic
    ".long 0x00000003",                 // flags: ALIGN | MEMINFO
    ".long -(0x1BADB002 + 0x00000003)", // checksum
);

global_asm!(
    ".section .boot.bss, \"aw\", @nobits",
    ".align 4096",
    "boot_page_directory:", ".skip 4096",
    "boot_page_table:", ".skip 4096",
    ".align 16",
    "boot_multiboot_magic:", ".skip 4",
    "boot_multiboot_info:", ".skip 4",

    ".section .bss, \"aw\", @nobits",
    ".align 16",
    ".global stack_bottom",
    "stack_bottom:", ".skip 65536",
    ".global stack_top",
    "stack_top:",
);

global_asm!(
    ".section .boot.text",
    ".global _start",
    "_start:",
    "mov [boot_multiboot_magic], eax",
    "mov [boot_multiboot_info], ebx",

    // Identity-map the first 4 MiB with one page table, present+write.
    "mov edi, boot_page_table",
    "mov esi, 0x3",
    "mov ecx, 1024",
    "2:",
    "mov [edi], esi",
    "add esi, 0x1000",
    "add edi, 4",
    "loop 2b",

    // PDE 0 (identity) and PDE 768 (0xC0000000 >> 22, higher-half alias)
    // both point at the same page table.
    "mov eax, boot_page_table",
    "or eax, 0x3",
    "mov [boot_page_directory], eax",
    "mov [boot_page_directory + 768*4], eax",

    "mov eax, boot_page_directory",
    "mov cr3, eax",

    "mov eax, cr0",
    "or eax, 0x80000000",
    "mov cr0, eax",

    "lea eax, [higher_half_entry]",
    "jmp eax",

    ".section .text",
    "higher_half_entry:",
    "mov esp, offset stack_top",
    "push dword ptr [boot_multiboot_info]",
    "push dword ptr [boot_multiboot_magic]",
    "call kernel_main",
    "3:",
    "cli",
    "hlt",
    "jmp 3b",
);
