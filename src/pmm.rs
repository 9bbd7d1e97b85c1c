//! Physical frame allocator (component B).
//!
//! A bitmap over 4 KiB frames up to [`PMM_MAX_MEMORY`], grounded on
//! `original_source/kernel/mm/pmm.c`. Replaces the teacher's
//! `BootInfoFrameAllocator` (linear bump, no free) because this spec
//! requires `free_frame` and the reserved-region invariants below.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::config::{FRAME_SIZE, PMM_MAX_MEMORY};
use crate::io::without_interrupts;
use crate::multiboot::BootInfo;

const TOTAL_FRAMES: usize = PMM_MAX_MEMORY / FRAME_SIZE;
const BITMAP_WORDS: usize = (TOTAL_FRAMES + 31) / 32;

struct Bitmap {
    words: [u32; BITMAP_WORDS],
    free_count: usize,
    highest_usable_frame: usize,
}

impl Bitmap {
    const fn new() -> Self {
        Self {
            words: [0xFFFF_FFFF; BITMAP_WORDS], // everything reserved until init() clears usable ranges
            free_count: 0,
            highest_usable_frame: 0,
        }
    }

    fn is_set(&self, frame: usize) -> bool {
        self.words[frame / 32] & (1 << (frame % 32)) != 0
    }

    fn set(&mut self, frame: usize) {
        if frame >= TOTAL_FRAMES {
            return;
        }
        let was_set = self.is_set(frame);
        self.words[frame / 32] |= 1 << (frame % 32);
        if !was_set {
            self.free_count = self.free_count.saturating_sub(1);
        }
    }

    fn clear(&mut self, frame: usize) {
        if frame >= TOTAL_FRAMES {
            return;
        }
        let was_set = self.is_set(frame);
        self.words[frame / 32] &= !(1 << (frame % 32));
        if was_set {
            self.free_count += 1;
        }
    }

    fn mark_range_reserved(&mut self, start_phys: u64, end_phys: u64) {
        let start_frame = (start_phys as usize) / FRAME_SIZE;
        let end_frame = (end_phys as usize).div_ceil(FRAME_SIZE);
        for frame in start_frame..end_frame.min(TOTAL_FRAMES) {
            self.set(frame);
        }
    }

    fn mark_range_usable(&mut self, start_phys: u64, end_phys: u64) {
        let start_frame = ((start_phys as usize) / FRAME_SIZE).max(1); // never frame 0
        let end_frame = (end_phys as usize / FRAME_SIZE).min(TOTAL_FRAMES);
        for frame in start_frame..end_frame {
            self.clear(frame);
            self.highest_usable_frame = self.highest_usable_frame.max(frame);
        }
    }

    fn alloc_below(&mut self, max_frame: usize) -> Option<usize> {
        let limit = max_frame.min(TOTAL_FRAMES);
        for frame in 0..limit {
            if !self.is_set(frame) {
                self.set(frame);
                return Some(frame);
            }
        }
        None
    }

    fn free(&mut self, frame: usize) {
        if frame >= TOTAL_FRAMES {
            return;
        }
        self.clear(frame);
    }
}

lazy_static! {
    static ref BITMAP: Mutex<Bitmap> = Mutex::new(Bitmap::new());
}

/// Extent of the linker-provided kernel image and the bootstrap stub,
/// supplied by `main.rs` from linker symbols once known.
#[derive(Debug, Clone, Copy)]
pub struct ReservedExtents {
    pub kernel_phys_start: u64,
    pub kernel_phys_end: u64,
    pub boot_phys_start: u64,
    pub boot_phys_end: u64,
}

/// Initialise the bitmap: everything starts reserved, the Multiboot
/// memory map (or `mem_upper` fallback) marks usable RAM free, then the
/// low 1 MiB, kernel image, bootstrap stub, VGA frame, and every
/// Multiboot module are (re-)marked reserved, per spec §3/§4.1.
pub fn init(boot_info: &BootInfo, reserved: ReservedExtents) {
    without_interrupts(|| {
        let mut bitmap = BITMAP.lock();

        let mut saw_mmap = false;
        boot_info.memory_regions(|region| {
            saw_mmap = true;
            if region.usable {
                let end = region.base.saturating_add(region.length).min(PMM_MAX_MEMORY as u64);
                bitmap.mark_range_usable(region.base, end);
            }
        });

        if !saw_mmap {
            if let Some(upper_kib) = boot_info.mem_upper_kib() {
                let end = (u64::from(upper_kib) * 1024 + 0x10_0000).min(PMM_MAX_MEMORY as u64);
                bitmap.mark_range_usable(0x10_0000, end);
            }
        }

        bitmap.mark_range_reserved(0, 0x10_0000); // low 1 MiB
        bitmap.mark_range_reserved(reserved.kernel_phys_start, reserved.kernel_phys_end);
        bitmap.mark_range_reserved(reserved.boot_phys_start, reserved.boot_phys_end);
        bitmap.mark_range_reserved(
            u64::from(crate::config::VGA_PHYS_BASE),
            u64::from(crate::config::VGA_PHYS_BASE) + FRAME_SIZE as u64,
        );

        boot_info.modules(|module| {
            bitmap.mark_range_reserved(u64::from(module.start), u64::from(module.end));
        });
    });
}

/// Allocate any free frame. Returns physical address, or 0 on OOM.
pub fn alloc_frame() -> u32 {
    alloc_frame_below(u32::MAX)
}

/// Allocate a free frame whose physical address is below `max_phys`.
/// Required by code handing physical addresses to hardware limited to
/// the low 16 MiB (AHCI/UHCI buffers, new page tables).
pub fn alloc_frame_below(max_phys: u32) -> u32 {
    let max_frame = (max_phys as usize) / FRAME_SIZE;
    without_interrupts(|| {
        BITMAP
            .lock()
            .alloc_below(max_frame)
            .map_or(0, |frame| (frame * FRAME_SIZE) as u32)
    })
}

/// Free a previously allocated frame. Out-of-range or already-free
/// indices are silently ignored and never underflow `free_frames`.
pub fn free_frame(phys: u32) {
    let frame = (phys as usize) / FRAME_SIZE;
    without_interrupts(|| {
        BITMAP.lock().free(frame);
    });
}

/// Total frames describable by the bitmap (the 256 MiB cap / 4 KiB).
#[must_use]
pub fn total_frames() -> usize {
    TOTAL_FRAMES
}

/// Frames currently marked free.
#[must_use]
pub fn free_frames() -> usize {
    without_interrupts(|| BITMAP.lock().free_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_then_free_restores_free_count() {
        let before = free_frames();
        let frame = alloc_frame();
        assert_ne!(frame, 0, "allocator should not be exhausted in tests");
        assert_eq!(free_frames(), before - 1);
        free_frame(frame);
        assert_eq!(free_frames(), before, "free_frame must restore the prior free count");
    }

    #[test_case]
    fn alloc_frame_below_respects_ceiling() {
        let frame = alloc_frame_below(crate::config::LOW_MEMORY_CEILING);
        if frame != 0 {
            assert!(
                frame < crate::config::LOW_MEMORY_CEILING,
                "alloc_frame_below must never return a frame at or above the ceiling",
            );
            free_frame(frame);
        }
    }

    #[test_case]
    fn double_free_does_not_underflow() {
        let frame = alloc_frame();
        assert_ne!(frame, 0);
        free_frame(frame);
        let before = free_frames();
        free_frame(frame); // already free; must be a no-op
        assert_eq!(free_frames(), before, "freeing an already-free frame must not change the count");
    }
}
