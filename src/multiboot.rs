//! Multiboot 1 info-struct parsing.
//!
//! Grounded on `original_source/kernel/include/kernel/multiboot.h`. The
//! loader (out of scope, see spec §1) hands the core `eax = 0x2BADB002`
//! and the physical address of this structure; the bootstrap stub's
//! identity mapping of the first 4 MiB is what makes dereferencing it
//! safe before paging to the higher half is fully set up (see spec §9's
//! "ambiguity" note on multiboot module address space).

use crate::config::MULTIBOOT_MAGIC;

const FLAG_MEM: u32 = 1 << 0;
const FLAG_MMAP: u32 = 1 << 6;
const FLAG_MODS: u32 = 1 << 3;

#[repr(C)]
struct RawInfo {
    flags: u32,
    mem_lower: u32,
    mem_upper: u32,
    boot_device: u32,
    cmdline: u32,
    mods_count: u32,
    mods_addr: u32,
    syms: [u32; 4],
    mmap_length: u32,
    mmap_addr: u32,
    drives_length: u32,
    drives_addr: u32,
    config_table: u32,
    boot_loader_name: u32,
    apm_table: u32,
    vbe_control_info: u32,
    vbe_mode_info: u32,
    vbe_mode: u16,
    vbe_interface_seg: u16,
    vbe_interface_off: u16,
    vbe_interface_len: u16,
}

#[repr(C)]
struct RawMmapEntry {
    size: u32,
    base_addr: u64,
    length: u64,
    entry_type: u32,
}

#[repr(C)]
struct RawModule {
    mod_start: u32,
    mod_end: u32,
    string: u32,
    reserved: u32,
}

/// A single usable-or-reserved physical memory range from the BIOS map.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub usable: bool,
}

/// A loaded Multiboot module's physical extent.
#[derive(Debug, Clone, Copy)]
pub struct Module {
    pub start: u32,
    pub end: u32,
}

/// A validated, already-parsed view of the loader's handoff.
pub struct BootInfo {
    info: *const RawInfo,
}

/// Maximum number of modules/memory regions this kernel iterates before
/// giving up; the multiboot tables never come close to this in practice,
/// it just bounds the loops against a malformed loader.
const MAX_ITEMS: usize = 64;

impl BootInfo {
    /// Validate `magic` and wrap `info_phys` (already identity-mapped by
    /// the bootstrap stub) for parsing.
    ///
    /// # Safety
    /// `info_phys` must point at a live Multiboot info structure placed
    /// by the loader in memory the kernel can currently dereference
    /// (identity-mapped low memory, per the early-boot contract).
    pub unsafe fn new(magic: u32, info_phys: u32) -> Option<Self> {
        if magic != MULTIBOOT_MAGIC {
            return None;
        }
        Some(Self {
            info: info_phys as *const RawInfo,
        })
    }

    fn flags(&self) -> u32 {
        // SAFETY: validated pointer, read-only access to a POD struct.
        unsafe { (*self.info).flags }
    }

    /// `mem_upper`, in KiB, when no full memory map is present.
    #[must_use]
    pub fn mem_upper_kib(&self) -> Option<u32> {
        if self.flags() & FLAG_MEM == 0 {
            return None;
        }
        // SAFETY: `FLAG_MEM` guarantees `mem_upper` is valid.
        Some(unsafe { (*self.info).mem_upper })
    }

    /// Iterate the BIOS memory map, if present.
    pub fn memory_regions(&self, mut visit: impl FnMut(MemoryRegion)) {
        if self.flags() & FLAG_MMAP == 0 {
            return;
        }
        // SAFETY: `FLAG_MMAP` guarantees `mmap_addr`/`mmap_length` are valid.
        unsafe {
            let mut cursor = (*self.info).mmap_addr;
            let end = cursor + (*self.info).mmap_length;
            let mut guard = 0;
            while cursor < end && guard < MAX_ITEMS {
                let entry = &*(cursor as *const RawMmapEntry);
                visit(MemoryRegion {
                    base: entry.base_addr,
                    length: entry.length,
                    usable: entry.entry_type == 1,
                });
                cursor += entry.size + 4;
                guard += 1;
            }
        }
    }

    /// Iterate the loaded module table, if present.
    pub fn modules(&self, mut visit: impl FnMut(Module)) {
        if self.flags() & FLAG_MODS == 0 {
            return;
        }
        // SAFETY: `FLAG_MODS` guarantees `mods_addr`/`mods_count` are valid.
        unsafe {
            let base = (*self.info).mods_addr;
            let count = (*self.info).mods_count.min(MAX_ITEMS as u32);
            for i in 0..count {
                let module = &*((base as usize + i as usize * core::mem::size_of::<RawModule>())
                    as *const RawModule);
                visit(Module {
                    start: module.mod_start,
                    end: module.mod_end,
                });
            }
        }
    }
}
