//! Trait seams for the external collaborators named in spec §1:
//! a clocked tick source, a character sink / keystroke source, and a
//! block device. Concrete drivers (serial, VGA, PIT, PS/2 keyboard) live
//! in their own modules and implement these traits; anything the task
//! names as out of scope (USB, PCI, AHCI/ATA, ext2) stops at the trait
//! boundary and is not implemented.

/// A source of periodic ticks driving the scheduler's preemption.
pub trait TickSource {
    /// Ticks elapsed since this source was initialised.
    fn ticks(&self) -> u64;
    /// Configured frequency in Hz.
    fn hz(&self) -> u32;
}

/// A byte-oriented output device (terminal, serial line, ...).
pub trait CharSink {
    /// Write a single byte.
    fn write_byte(&mut self, byte: u8);

    /// Write a full buffer.
    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }
}

/// A source of decoded keystrokes, as fed by the keyboard IRQ handler.
pub trait KeystrokeSource {
    /// Pop the next available keystroke, if any.
    fn pop(&mut self) -> Option<u8>;
}

/// A single block-addressable storage device, serialised by one spinlock
/// per spec §5 ("the block device is serialised by a single spinlock
/// because DMA buffers are shared").
pub trait BlockDevice {
    /// Size of one addressable block, in bytes.
    fn block_size(&self) -> usize;

    /// Read one block into `buf`. `buf.len()` must equal `block_size()`.
    fn read_block(&mut self, index: u64, buf: &mut [u8]) -> Result<(), BlockError>;

    /// Write one block from `buf`. `buf.len()` must equal `block_size()`.
    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<(), BlockError>;
}

/// Failure modes a block device can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// `index` is past the end of the device.
    OutOfRange,
    /// `buf.len()` did not match `block_size()`.
    BadBufferSize,
    /// The underlying medium reported a fault.
    MediumError,
}
