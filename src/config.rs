//! Boot-time tunables, centralised the way the teacher hardcoded
//! `HEAP_SIZE`/`HEART_START` in `allocator.rs`, collected in one place
//! instead of scattered module constants.

/// Upper bound of physical memory the PMM bitmap can describe.
pub const PMM_MAX_MEMORY: usize = 256 * 1024 * 1024;

/// Frame size, fixed by the paging model.
pub const FRAME_SIZE: usize = 4096;

/// Ceiling used by `alloc_frame_below` callers that need identity-mapped,
/// low-memory-addressable pages (new page tables, AHCI/UHCI buffers).
pub const LOW_MEMORY_CEILING: u32 = 16 * 1024 * 1024;

/// Higher-half split: everything at or above this address is kernel space.
pub const KERNEL_VBASE: u32 = 0xC000_0000;

/// VGA text-mode frame buffer, physical.
pub const VGA_PHYS_BASE: u32 = 0x000B_8000;

/// VGA text-mode frame buffer, higher-half alias used by the kernel.
pub const VGA_VIRT_BASE: u32 = KERNEL_VBASE + VGA_PHYS_BASE;

/// Kernel heap base (kernel-virtual).
pub const HEAP_BASE: u32 = 0xD000_0000;

/// Kernel heap initial size.
pub const HEAP_INITIAL_SIZE: usize = 1024 * 1024;

/// Upper bound the heap may grow to before `kmalloc` starts failing.
pub const HEAP_MAX_SIZE: usize = 16 * 1024 * 1024;

/// Start of the user code/data region.
pub const USER_CODE_START: u32 = 0x0040_0000;

/// One past the end of the user code/data region; also the user stack top.
pub const USER_REGION_END: u32 = 0x0080_0000;

/// Size reserved for the user stack at the top of the user region.
pub const USER_STACK_SIZE: u32 = 4096 * 4;

/// Bottom of the user stack (stack grows down from `USER_REGION_END`).
pub const USER_STACK_BOTTOM: u32 = USER_REGION_END - USER_STACK_SIZE;

/// Start of the user heap, growable upward via `SYS_sbrk`.
pub const USER_HEAP_START: u32 = 0x0080_0000;

/// Interrupt vector used for the syscall gate.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// [`SYSCALL_VECTOR`] widened for matching against `TrapFrame::int_num`.
pub const SYSCALL_VECTOR_U32: u32 = SYSCALL_VECTOR as u32;

/// PIC vector offsets after remap.
pub const PIC1_OFFSET: u8 = 32;
pub const PIC2_OFFSET: u8 = 40;

/// Default timer frequency in Hz. Clamped to 19 minimum (see `pit::init`)
/// to avoid 16-bit divisor overflow (1193180 / 19 < 65536).
pub const TIMER_HZ: u32 = 100;

/// Maximum concurrent processes.
pub const MAX_PROCESSES: usize = 32;

/// Maximum concurrent kernel threads.
pub const MAX_KTHREADS: usize = 16;

/// Kernel thread stack size.
pub const KTHREAD_STACK_SIZE: usize = 8 * 1024;

/// Depth of the keystroke ring buffer.
pub const KEYSTROKE_RING_SIZE: usize = 256;

/// Selector values, fixed by the GDT layout in `gdt.rs`.
pub const KERNEL_CS: u16 = 0x08;
pub const KERNEL_DS: u16 = 0x10;
pub const USER_CS: u16 = 0x1B;
pub const USER_DS: u16 = 0x23;

/// Multiboot magic the loader must hand back in EAX.
pub const MULTIBOOT_MAGIC: u32 = 0x2BAD_B002;

/// Number of in-memory file slots the demo filesystem supports.
pub const FS_MAX_FILES: usize = 16;

/// Maximum bytes per in-memory file.
pub const FS_MAX_FILE_SIZE: usize = 16 * 1024;
