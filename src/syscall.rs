//! `int 0x80` syscall dispatcher (component K).
//!
//! Grounded on `original_source/kernel/proc/syscall.c`'s `syscall_dispatch`:
//! same register convention (`eax` = number, `ebx`/`ecx`/`edx`/`esi`/`edi`
//! = args, return in `eax`), same per-call argument order, same
//! `SYS_write` dual-sink behaviour and `SYS_read(fd=0)` blocking/echo
//! loop. `SYS_exit` deviates from the source's unconditional hard
//! kernel-return: see [`sys_exit`] below.

use crate::interfaces::KeystrokeSource;
use crate::regs::TrapFrame;
use crate::{fs, keyboard, pit, proc, serial, vga_buffer};

const SYS_WRITE: u32 = 1;
const SYS_EXIT: u32 = 2;
const SYS_READ: u32 = 3;
const SYS_OPEN: u32 = 4;
const SYS_CLOSE: u32 = 5;
const SYS_SBRK: u32 = 6;
const SYS_TIME: u32 = 7;
const SYS_FS_LIST: u32 = 8;
const SYS_FWRITE: u32 = 9;
const SYS_FORK: u32 = 10;
const SYS_WAIT: u32 = 11;
const SYS_GETPID: u32 = 12;
const SYS_GETPPID: u32 = 13;

/// Dispatch one syscall trap, reading arguments from and writing the
/// return value into `frame`. Called by [`crate::isr::common_handler`]
/// for vector [`crate::config::SYSCALL_VECTOR_U32`].
pub fn dispatch(frame: &mut TrapFrame) {
    let (nr, ebx, ecx, edx, _esi, _edi) = frame.syscall_args();

    let result = match nr {
        SYS_WRITE => sys_write(ebx, ecx),
        SYS_EXIT => {
            sys_exit(frame, ebx as i32);
            return;
        }
        SYS_READ => sys_read(ebx as i32, ecx, edx),
        SYS_OPEN => sys_open(ebx),
        SYS_CLOSE => fs::close(ebx as i32),
        SYS_SBRK => proc::sbrk(ebx as i32) as i32,
        SYS_TIME => pit::seconds_since_boot() as i32,
        SYS_FS_LIST => sys_fs_list(ebx, ecx),
        SYS_FWRITE => sys_fwrite(ebx as i32, ecx, edx),
        SYS_FORK => proc::fork(frame),
        SYS_WAIT => sys_wait(ebx),
        SYS_GETPID => proc::current_pid(),
        SYS_GETPPID => proc::parent_pid(proc::current_pid()),
        _ => -1,
    };

    frame.eax = result as u32;
}

/// Borrow `len` bytes at user-virtual address `ptr` as a slice.
///
/// # Safety
/// The caller must only call this with a `(ptr, len)` pair that a user
/// program plausibly owns; there is no separate validation layer here
/// (spec's Non-goals exclude a full user/kernel pointer-range checker).
unsafe fn user_slice<'a>(ptr: u32, len: u32) -> &'a [u8] {
    core::slice::from_raw_parts(ptr as *const u8, len as usize)
}

/// # Safety
/// See [`user_slice`].
unsafe fn user_slice_mut<'a>(ptr: u32, len: u32) -> &'a mut [u8] {
    core::slice::from_raw_parts_mut(ptr as *mut u8, len as usize)
}

fn sys_write(ptr: u32, len: u32) -> i32 {
    if len == 0 {
        return 0;
    }
    // SAFETY: `ptr`/`len` describe a buffer the calling user process
    // owns, per `user_slice`'s documented contract.
    let buf = unsafe { user_slice(ptr, len) };
    serial::write_bytes(buf);
    vga_buffer::write_bytes(buf);
    buf.len() as i32
}

/// Root processes (launched directly by [`proc::run_user_and_wait`])
/// jump back to the kernel caller, exactly as `original_source`'s
/// `SYS_exit` always does. A forked child must not: its exit only marks
/// it `ZOMBIE` and wakes a waiting parent, then this process is
/// rescheduled away from — jumping to the kernel resume point here
/// would hijack the `run_user_and_wait` call the *root* process owns,
/// breaking `fork`+`wait` (spec §8 scenario 2).
fn sys_exit(frame: &mut TrapFrame, code: i32) {
    let pid = proc::current_pid();
    proc::exit(code);
    if proc::parent_pid(pid) <= 0 {
        proc::request_exit(code);
    } else {
        proc::process_schedule(frame);
    }
}

fn sys_read(fd: i32, ptr: u32, len: u32) -> i32 {
    if len == 0 {
        return 0;
    }
    if fd != 0 {
        // SAFETY: see `user_slice_mut`.
        let buf = unsafe { user_slice_mut(ptr, len) };
        return fs::read(fd, buf);
    }

    // SAFETY: see `user_slice_mut`.
    let buf = unsafe { user_slice_mut(ptr, len) };
    let mut n = 0usize;
    let mut kbd = keyboard::Ps2Keyboard;

    crate::io::sti();
    while n < buf.len() {
        let Some(raw) = kbd.pop() else {
            crate::io::sti();
            crate::io::hlt();
            continue;
        };
        let mut ch = raw;
        if ch == b'\r' {
            ch = b'\n';
        }
        if ch == 0x08 {
            if n > 0 {
                n -= 1;
                echo(&[0x08, b' ', 0x08]);
            }
            continue;
        }
        buf[n] = ch;
        n += 1;
        echo(&[ch]);
        if ch == b'\n' {
            break;
        }
    }
    n as i32
}

fn echo(bytes: &[u8]) {
    serial::write_bytes(bytes);
    vga_buffer::write_bytes(bytes);
}

fn sys_open(name_ptr: u32) -> i32 {
    const MAX_NAME: usize = 64;
    // SAFETY: `name_ptr` points at a NUL-terminated string the calling
    // user process owns, scanned no further than `MAX_NAME` bytes.
    let bytes = unsafe { core::slice::from_raw_parts(name_ptr as *const u8, MAX_NAME) };
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
    fs::open(&bytes[..len])
}

fn sys_fwrite(fd: i32, ptr: u32, len: u32) -> i32 {
    // SAFETY: see `user_slice`.
    let buf = unsafe { user_slice(ptr, len) };
    fs::write(fd, buf)
}

fn sys_fs_list(ptr: u32, len: u32) -> i32 {
    // SAFETY: see `user_slice_mut`.
    let buf = unsafe { user_slice_mut(ptr, len) };
    fs::list(buf) as i32
}

fn sys_wait(status_ptr: u32) -> i32 {
    let mut status = 0i32;
    let pid = proc::wait(&mut status);
    if status_ptr != 0 {
        // SAFETY: `status_ptr` points at a single `i32` the calling user
        // process owns, per this syscall's contract (mirrors
        // `original_source`'s `int* status` argument).
        unsafe {
            *(status_ptr as *mut i32) = status;
        }
    }
    pid
}
