//! Shared Multiboot1 boot stub for integration tests.
//!
//! Every integration test binary is its own freestanding kernel image: it
//! needs the same multiboot header, boot-time identity/higher-half page
//! tables and stack switch that `src/main.rs` sets up, before it can call
//! into anything in `higherhalf_kernel` (virtually everything, starting
//! with VGA text output, lives at a `0xC0000000+` address). Invoking
//! [`kernel_test_boot!`] once per test binary generates that stub and
//! arranges for it to call the `kernel_main(magic: u32, info: u32) -> !`
//! the test binary defines itself.

#![allow(dead_code)]

use core::arch::global_asm;

/// Emits the Multiboot1 header, boot page tables/stack, and `_start`,
/// mirroring `src/main.rs`'s boot stub. Call once at file scope.
#[macro_export]
macro_rules! kernel_test_boot {
    () => {
        core::arch::global_asm!(
            ".section .multiboot_header",
            ".align 4",
            ".long 0x1BADB002",
            ".long 0x00000003",
            ".long -(0x1BADB002 + 0x00000003)",
        );

        core::arch::global_asm!(
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

        core::arch::global_asm!(
            ".section .boot.text",
            ".global _start",
            "_start:",
            "mov [boot_multiboot_magic], eax",
            "mov [boot_multiboot_info], ebx",

            "mov edi, boot_page_table",
            "mov esi, 0x3",
            "mov ecx, 1024",
            "2:",
            "mov [edi], esi",
            "add esi, 0x1000",
            "add edi, 4",
            "loop 2b",

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
    };
}
