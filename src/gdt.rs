//! GDT + TSS (component E).
//!
//! Six descriptors in a fixed order: null, kernel code, kernel data, user
//! code, user data, TSS. The `x86_64` crate's `GlobalDescriptorTable` type
//! only builds 64-bit-mode descriptors, so the table is hand-rolled here
//! against the exact byte layout `original_source/kernel/core/gdt.c` uses.

use core::mem::size_of;

use crate::config::{KERNEL_CS, KERNEL_DS, USER_CS, USER_DS};
use crate::io::{lgdt, ltr};

const GDT_ENTRIES: usize = 6;

const ACCESS_KERNEL_CODE: u8 = 0x9A;
const ACCESS_KERNEL_DATA: u8 = 0x92;
const ACCESS_USER_CODE: u8 = 0xFA;
const ACCESS_USER_DATA: u8 = 0xF2;
const ACCESS_TSS: u8 = 0x89;

/// 4 KiB granularity, 32-bit operand size, flat limit.
const GRANULARITY_FLAT: u8 = 0xCF;
/// Byte granularity, used for the TSS descriptor (its limit is its size).
const GRANULARITY_TSS: u8 = 0x00;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn new(base: u32, limit: u32, access: u8, granularity: u8) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: (granularity & 0xF0) | (((limit >> 16) & 0x0F) as u8),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }
}

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

/// The 32-bit Task State Segment. Only `ss0`/`esp0` are used for ring-3 to
/// ring-0 stack switches; the rest default to user data so ring-3 code can
/// reload its own segment registers on entry without the TSS fighting it.
#[repr(C, packed)]
struct Tss {
    link: u16,
    link_hi: u16,
    esp0: u32,
    ss0: u16,
    ss0_hi: u16,
    esp1: u32,
    ss1: u16,
    ss1_hi: u16,
    esp2: u32,
    ss2: u16,
    ss2_hi: u16,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u16,
    es_hi: u16,
    cs: u16,
    cs_hi: u16,
    ss: u16,
    ss_hi: u16,
    ds: u16,
    ds_hi: u16,
    fs: u16,
    fs_hi: u16,
    gs: u16,
    gs_hi: u16,
    ldt: u16,
    ldt_hi: u16,
    trap: u16,
    iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        Self {
            link: 0,
            link_hi: 0,
            esp0: 0,
            ss0: KERNEL_DS,
            ss0_hi: 0,
            esp1: 0,
            ss1: 0,
            ss1_hi: 0,
            esp2: 0,
            ss2: 0,
            ss2_hi: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: USER_DS,
            es_hi: 0,
            cs: USER_CS,
            cs_hi: 0,
            ss: USER_DS,
            ss_hi: 0,
            ds: USER_DS,
            ds_hi: 0,
            fs: USER_DS,
            fs_hi: 0,
            gs: USER_DS,
            gs_hi: 0,
            ldt: 0,
            ldt_hi: 0,
            trap: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

static mut GDT: [GdtEntry; GDT_ENTRIES] = [GdtEntry::null(); GDT_ENTRIES];
static mut TSS: Tss = Tss::new();

const TSS_SELECTOR: u16 = 5 * 8;

/// Build the GDT, install the TSS descriptor, load both via `lgdt`/`ltr`.
///
/// # Safety
/// Must run once, early in boot, before any segment reload or ring-3
/// transition; the bootstrap stub's temporary flat GDT already uses the
/// same selector numbering, so reloading here is a like-for-like swap.
pub unsafe fn init() {
    // SAFETY: single-threaded, runs once during boot before interrupts
    // are enabled; no concurrent access to these statics is possible.
    unsafe {
        let tss_base = core::ptr::addr_of!(TSS) as u32;
        let tss_limit = (size_of::<Tss>() - 1) as u32;

        GDT[0] = GdtEntry::null();
        GDT[1] = GdtEntry::new(0, 0x000F_FFFF, ACCESS_KERNEL_CODE, GRANULARITY_FLAT);
        GDT[2] = GdtEntry::new(0, 0x000F_FFFF, ACCESS_KERNEL_DATA, GRANULARITY_FLAT);
        GDT[3] = GdtEntry::new(0, 0x000F_FFFF, ACCESS_USER_CODE, GRANULARITY_FLAT);
        GDT[4] = GdtEntry::new(0, 0x000F_FFFF, ACCESS_USER_DATA, GRANULARITY_FLAT);
        GDT[5] = GdtEntry::new(tss_base, tss_limit, ACCESS_TSS, GRANULARITY_TSS);

        let pointer = GdtPointer {
            limit: (size_of::<[GdtEntry; GDT_ENTRIES]>() - 1) as u16,
            base: core::ptr::addr_of!(GDT) as u32,
        };

        lgdt(core::ptr::addr_of!(pointer).cast::<u8>());
        reload_segments();
        ltr(TSS_SELECTOR);
    }
}

/// Reload the segment registers to the kernel selectors and far-return
/// through `cs`, the usual trick to reload `cs` without a direct `mov`.
unsafe fn reload_segments() {
    use core::arch::asm;
    // SAFETY: `KERNEL_CS`/`KERNEL_DS` are valid selectors just installed
    // into the GDT above.
    unsafe {
        asm!(
            "push {cs}",
            "lea eax, [2f]",
            "push eax",
            "retf",
            "2:",
            "mov ax, {ds}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            cs = const KERNEL_CS as u32,
            ds = const KERNEL_DS as u32,
            out("eax") _,
        );
    }
}

/// Update the TSS's `esp0` before any ring-3 transition; otherwise the CPU
/// has no valid kernel stack to switch to on the next interrupt.
pub fn set_kernel_stack(esp0: u32) {
    // SAFETY: single-threaded; `TSS` is only mutated here, only read by
    // the CPU itself during a privilege-level change.
    unsafe {
        (*core::ptr::addr_of_mut!(TSS)).esp0 = esp0;
    }
}
