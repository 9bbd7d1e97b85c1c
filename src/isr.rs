//! Trap/IRQ entry stubs and the common saved-register frame (component
//! F), grounded on `original_source/kernel/core/idt.c` and
//! `kernel/core/irq.c`.
//!
//! Every vector's stub converges on `common_stub`: it builds the
//! [`TrapFrame`] on the interrupted stack (general registers via `pusha`,
//! then the caller's `ds`), swaps the data segments to the kernel
//! selector, calls [`common_handler`], restores registers and the
//! original `ds`, discards the `int_num`/`err_code` pair, and executes
//! `iret` — unless the handler requested the "resume point" short
//! circuit used by `SYS_exit` (component J), in which case it reloads
//! `esp`/`ebp` and jumps straight back into the kernel caller of
//! `run_user_and_wait` instead of returning through `iret`.

use core::arch::global_asm;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::KERNEL_DS;
use crate::regs::TrapFrame;
use crate::{pic, pit};

/// Vectors that carry a real CPU-pushed error code; all others get a
/// stub-pushed zero so every frame has the same shape.
const fn has_error_code(vector: u32) -> bool {
    matches!(vector, 8 | 10 | 11 | 12 | 13 | 14 | 17)
}

/// Set by the syscall handler when it services `SYS_exit`: instead of
/// `iret`-ing back into the (now-dead) user process, `common_stub`
/// reloads the kernel context captured by `run_user_and_wait` and jumps
/// back into it directly.
pub static RESUME_REQUESTED: AtomicBool = AtomicBool::new(false);
pub static RESUME_ESP: AtomicU32 = AtomicU32::new(0);
pub static RESUME_EBP: AtomicU32 = AtomicU32::new(0);
pub static RESUME_EIP: AtomicU32 = AtomicU32::new(0);

/// Arm the resume-point short circuit. Called by the syscall dispatcher
/// when servicing `SYS_exit`.
pub fn request_resume(esp: u32, ebp: u32, eip: u32) {
    RESUME_ESP.store(esp, Ordering::Relaxed);
    RESUME_EBP.store(ebp, Ordering::Relaxed);
    RESUME_EIP.store(eip, Ordering::Relaxed);
    RESUME_REQUESTED.store(true, Ordering::Release);
}

/// The single Rust-level entry point every stub calls. Dispatch rule:
/// vector 0x80 → syscall dispatcher, 32..=47 → IRQ dispatch with PIC
/// EOI, 0..=31 → panic with the decoded vector/error code/CR2.
extern "C" fn common_handler(frame: *mut TrapFrame) {
    // SAFETY: `frame` points at the live interrupt frame on the
    // interrupted stack; it stays valid for the duration of this call.
    let frame = unsafe { &mut *frame };

    match frame.int_num {
        crate::config::SYSCALL_VECTOR_U32 => crate::syscall::dispatch(frame),
        32..=47 => {
            let irq = frame.int_num as u8 - crate::config::PIC1_OFFSET;
            handle_irq(irq, frame);
            // SAFETY: EOI must follow exactly once per serviced IRQ.
            unsafe {
                pic::send_eoi(frame.int_num as u8);
            }
        }
        0..=31 => panic_from_trap(frame),
        _ => panic_from_trap(frame),
    }
}

fn handle_irq(irq: u8, frame: &mut TrapFrame) {
    match irq {
        0 => {
            pit::tick();
            crate::sched::on_timer_tick();
            crate::proc::process_schedule(frame);
        }
        1 => crate::keyboard::on_irq(),
        _ => {}
    }
}

fn panic_from_trap(frame: &TrapFrame) -> ! {
    let cr2 = crate::io::read_cr2();
    panic!(
        "CPU exception: vector={} err_code={:#x} eip={:#x} cs={:#x} eflags={:#x} cr2={:#x}",
        frame.int_num, frame.err_code, frame.eip, frame.cs, frame.eflags, cr2
    );
}

extern "C" {
    /// Base of a table of 48 stub entry points, one per vector 0..=47,
    /// built by the `.irp` blocks below.
    static ISR_STUB_TABLE: [u32; 48];
    /// Entry point for the syscall gate (vector 0x80).
    static ISR_SYSCALL_STUB: u32;
}

/// Address of the generated entry stub for `vector` (0..=47).
#[must_use]
pub fn stub_address(vector: u8) -> u32 {
    // SAFETY: `ISR_STUB_TABLE` is a read-only table emitted by the
    // assembly below, fully initialised at link time.
    unsafe { ISR_STUB_TABLE[vector as usize] }
}

/// Address of the syscall gate's entry stub.
#[must_use]
pub fn syscall_stub_address() -> u32 {
    // SAFETY: `ISR_SYSCALL_STUB` is a read-only word emitted by the
    // assembly below, fully initialised at link time.
    unsafe { ISR_SYSCALL_STUB }
}

global_asm!(
    ".section .text",
    ".macro isr_noerr num",
    "  push 0",
    "  push \\num",
    "  jmp common_stub",
    ".endm",
    ".macro isr_err num",
    "  push \\num",
    "  jmp common_stub",
    ".endm",

    ".global isr_stub_0",  "isr_stub_0:",  "isr_noerr 0",
    ".global isr_stub_1",  "isr_stub_1:",  "isr_noerr 1",
    ".global isr_stub_2",  "isr_stub_2:",  "isr_noerr 2",
    ".global isr_stub_3",  "isr_stub_3:",  "isr_noerr 3",
    ".global isr_stub_4",  "isr_stub_4:",  "isr_noerr 4",
    ".global isr_stub_5",  "isr_stub_5:",  "isr_noerr 5",
    ".global isr_stub_6",  "isr_stub_6:",  "isr_noerr 6",
    ".global isr_stub_7",  "isr_stub_7:",  "isr_noerr 7",
    ".global isr_stub_8",  "isr_stub_8:",  "isr_err 8",
    ".global isr_stub_9",  "isr_stub_9:",  "isr_noerr 9",
    ".global isr_stub_10", "isr_stub_10:", "isr_err 10",
    ".global isr_stub_11", "isr_stub_11:", "isr_err 11",
    ".global isr_stub_12", "isr_stub_12:", "isr_err 12",
    ".global isr_stub_13", "isr_stub_13:", "isr_err 13",
    ".global isr_stub_14", "isr_stub_14:", "isr_err 14",
    ".global isr_stub_15", "isr_stub_15:", "isr_noerr 15",
    ".global isr_stub_16", "isr_stub_16:", "isr_noerr 16",
    ".global isr_stub_17", "isr_stub_17:", "isr_err 17",
    ".global isr_stub_18", "isr_stub_18:", "isr_noerr 18",
    ".global isr_stub_19", "isr_stub_19:", "isr_noerr 19",
    ".global isr_stub_20", "isr_stub_20:", "isr_noerr 20",
    ".global isr_stub_21", "isr_stub_21:", "isr_noerr 21",
    ".global isr_stub_22", "isr_stub_22:", "isr_noerr 22",
    ".global isr_stub_23", "isr_stub_23:", "isr_noerr 23",
    ".global isr_stub_24", "isr_stub_24:", "isr_noerr 24",
    ".global isr_stub_25", "isr_stub_25:", "isr_noerr 25",
    ".global isr_stub_26", "isr_stub_26:", "isr_noerr 26",
    ".global isr_stub_27", "isr_stub_27:", "isr_noerr 27",
    ".global isr_stub_28", "isr_stub_28:", "isr_noerr 28",
    ".global isr_stub_29", "isr_stub_29:", "isr_noerr 29",
    ".global isr_stub_30", "isr_stub_30:", "isr_noerr 30",
    ".global isr_stub_31", "isr_stub_31:", "isr_noerr 31",
);

macro_rules! irq_stub {
    ($label:literal, $vec:literal) => {
        concat!(".global ", $label, "\n", $label, ":\n", "push 0\n", "push ", $vec, "\n", "jmp common_stub\n")
    };
}

global_asm!(
    concat!(
        irq_stub!("isr_stub_32", 32), irq_stub!("isr_stub_33", 33),
        irq_stub!("isr_stub_34", 34), irq_stub!("isr_stub_35", 35),
        irq_stub!("isr_stub_36", 36), irq_stub!("isr_stub_37", 37),
        irq_stub!("isr_stub_38", 38), irq_stub!("isr_stub_39", 39),
        irq_stub!("isr_stub_40", 40), irq_stub!("isr_stub_41", 41),
        irq_stub!("isr_stub_42", 42), irq_stub!("isr_stub_43", 43),
        irq_stub!("isr_stub_44", 44), irq_stub!("isr_stub_45", 45),
        irq_stub!("isr_stub_46", 46), irq_stub!("isr_stub_47", 47),
    )
);

global_asm!(
    ".global isr_syscall_stub",
    "isr_syscall_stub:",
    "push 0",
    "push 0x80",
    "jmp common_stub",
);

global_asm!(
    ".global common_stub",
    "common_stub:",
    "pusha",
    "mov ax, ds",
    "push eax",
    "mov ax, {kernel_ds}",
    "mov ds, ax",
    "mov es, ax",
    "mov fs, ax",
    "mov gs, ax",
    "push esp",
    "call {handler}",
    "add esp, 4",
    "mov al, [{resume_flag}]",
    "test al, al",
    "jnz 2f",
    "pop eax",
    "mov ds, ax",
    "mov es, ax",
    "mov fs, ax",
    "mov gs, ax",
    "popa",
    "add esp, 8",
    "iret",
    "2:",
    "mov byte ptr [{resume_flag}], 0",
    "mov esp, [{resume_esp}]",
    "mov ebp, [{resume_ebp}]",
    "jmp dword ptr [{resume_eip}]",
    kernel_ds = const KERNEL_DS as u32,
    handler = sym common_handler,
    resume_flag = sym RESUME_REQUESTED,
    resume_esp = sym RESUME_ESP,
    resume_ebp = sym RESUME_EBP,
    resume_eip = sym RESUME_EIP,
);

global_asm!(
    ".section .rodata",
    ".global ISR_STUB_TABLE",
    "ISR_STUB_TABLE:",
    ".irp n, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23,24,25,26,27,28,29,30,31,32,33,34,35,36,37,38,39,40,41,42,43,44,45,46,47",
    ".long isr_stub_\\n",
    ".endr",
    ".global ISR_SYSCALL_STUB",
    "ISR_SYSCALL_STUB:",
    ".long isr_syscall_stub",
    ".section .text",
);
