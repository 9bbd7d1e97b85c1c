//! Process manager and user-mode bridge (components I and J).
//!
//! Grounded on `original_source/kernel/proc/process.c` and
//! `kernel/include/kernel/process.h`. The fork path resolves this
//! repository's Open Question the way spec §9 requires: a full
//! deep copy of every user `PTE`, never a shared page directory.

use core::sync::atomic::{AtomicI32, Ordering};

use crate::config::{
    KERNEL_DS, MAX_PROCESSES, USER_CS, USER_DS, USER_STACK_BOTTOM, USER_STACK_SIZE,
};
use crate::io::without_interrupts;
use crate::regs::TrapFrame;
use crate::vmm::{self, PageFlags};
use crate::{isr, pmm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Ready,
    Running,
    Blocked,
    Zombie,
}

/// Saved user context, a superset of [`TrapFrame`]: the trap frame only
/// tracks `ds` (the common ISR tail mirrors `es`/`fs`/`gs` onto it), so
/// those three are reconstructed as equal to `ds` on every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcContext {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub eflags: u32,
    pub cs: u32,
    pub ds: u32,
    pub ss: u32,
    pub es: u32,
    pub fs: u32,
    pub gs: u32,
}

impl ProcContext {
    fn snapshot(frame: &TrapFrame) -> Self {
        Self {
            eax: frame.eax,
            ebx: frame.ebx,
            ecx: frame.ecx,
            edx: frame.edx,
            esi: frame.esi,
            edi: frame.edi,
            ebp: frame.ebp,
            esp: frame.useresp,
            eip: frame.eip,
            eflags: frame.eflags,
            cs: frame.cs,
            ds: frame.ds,
            ss: frame.ss,
            es: frame.ds,
            fs: frame.ds,
            gs: frame.ds,
        }
    }

    fn restore_into(&self, frame: &mut TrapFrame) {
        frame.eax = self.eax;
        frame.ebx = self.ebx;
        frame.ecx = self.ecx;
        frame.edx = self.edx;
        frame.esi = self.esi;
        frame.edi = self.edi;
        frame.ebp = self.ebp;
        frame.useresp = self.esp;
        frame.eip = self.eip;
        frame.eflags = self.eflags;
        frame.cs = self.cs;
        frame.ds = self.ds;
        frame.ss = self.ss;
    }
}

pub struct Process {
    pub pid: i32,
    pub ppid: i32,
    pub state: ProcState,
    pub page_dir: u32,
    pub context: ProcContext,
    pub exit_code: i32,
    pub brk: u32,
}

impl Process {
    const fn unused() -> Self {
        Self {
            pid: 0,
            ppid: 0,
            state: ProcState::Unused,
            page_dir: 0,
            context: ProcContext {
                eax: 0,
                ebx: 0,
                ecx: 0,
                edx: 0,
                esi: 0,
                edi: 0,
                ebp: 0,
                esp: 0,
                eip: 0,
                eflags: 0,
                cs: 0,
                ds: 0,
                ss: 0,
                es: 0,
                fs: 0,
                gs: 0,
            },
            exit_code: 0,
            brk: 0,
        }
    }
}

static mut TABLE: [Process; MAX_PROCESSES] = {
    const UNUSED: Process = Process::unused();
    [UNUSED; MAX_PROCESSES]
};
static CURRENT_PID: AtomicI32 = AtomicI32::new(-1);
static NEXT_PID: AtomicI32 = AtomicI32::new(1);

fn find_slot(pid: i32) -> Option<usize> {
    // SAFETY: caller holds the `without_interrupts` guard.
    unsafe {
        (0..MAX_PROCESSES).find(|&i| TABLE[i].state != ProcState::Unused && TABLE[i].pid == pid)
    }
}

/// Current running process's pid, or -1 if none.
#[must_use]
pub fn current_pid() -> i32 {
    CURRENT_PID.load(Ordering::Relaxed)
}

/// `pid`'s parent pid, or -1 if `pid` is unknown. The root process
/// launched directly by [`run_user_and_wait`] has `ppid <= 0`.
#[must_use]
pub fn parent_pid(pid: i32) -> i32 {
    without_interrupts(|| {
        // SAFETY: guarded by `without_interrupts`.
        unsafe { find_slot(pid).map_or(-1, |i| TABLE[i].ppid) }
    })
}

/// Allocate the lowest `UNUSED` slot for a fresh, `READY` process.
/// Returns -1 if the table is full.
pub fn create(ppid: i32) -> i32 {
    without_interrupts(|| {
        // SAFETY: guarded by `without_interrupts`.
        unsafe {
            for i in 0..MAX_PROCESSES {
                if TABLE[i].state == ProcState::Unused {
                    let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
                    TABLE[i] = Process {
                        pid,
                        ppid,
                        state: ProcState::Ready,
                        page_dir: 0,
                        context: ProcContext::default(),
                        exit_code: 0,
                        brk: 0,
                    };
                    return pid;
                }
            }
            -1
        }
    })
}

/// Reclaim every USER page/page-table owned by `pid`'s directory
/// (walking PDEs 0..768, per spec §4.7) and mark its slot `UNUSED`.
pub fn destroy(pid: i32) {
    without_interrupts(|| {
        // SAFETY: guarded by `without_interrupts`.
        unsafe {
            let Some(i) = find_slot(pid) else { return };
            if TABLE[i].page_dir != 0 {
                free_user_address_space(TABLE[i].page_dir);
            }
            TABLE[i] = Process::unused();
        }
    });
}

/// Free every USER PTE (and its frame) reachable from `pd_phys`; if
/// `pd_phys` is the active directory, go through the VMM so TLB entries
/// are flushed, otherwise clear and free the raw tables directly.
///
/// Only walks PDEs `0..768`: the kernel-resident PDEs `deep_copy_directory`
/// shares into every child (index >= 768) are never touched here, so
/// tearing down a child's address space never frees the kernel's own page
/// tables.
fn free_user_address_space(pd_phys: u32) {
    if pd_phys == 0 {
        return;
    }
    let active = crate::io::read_cr3();
    // SAFETY: `pd_phys` is a page directory previously installed by this
    // module (either the active one, or one built by `deep_copy_directory`
    // and never shared outside it).
    unsafe {
        let pd = pd_phys as *mut u32;
        for pde_index in 0..768usize {
            let pde = *pd.add(pde_index);
            if pde & PageFlags::PRESENT.bits() == 0 || pde & PageFlags::USER.bits() == 0 {
                continue;
            }
            let pt_phys = pde & !0xFFF;
            let pt = pt_phys as *mut u32;

            if pd_phys == active {
                for pte_index in 0..1024usize {
                    let pte = *pt.add(pte_index);
                    if pte & PageFlags::PRESENT.bits() == 0 || pte & PageFlags::USER.bits() == 0 {
                        continue;
                    }
                    let virt = ((pde_index as u32) << 22) | ((pte_index as u32) << 12);
                    vmm::unmap(virt);
                    pmm::free_frame(pte & !0xFFF);
                }
                let still_user = (0..1024)
                    .any(|j| *pt.add(j) & (PageFlags::PRESENT | PageFlags::USER).bits() == (PageFlags::PRESENT | PageFlags::USER).bits());
                if !still_user {
                    *pd.add(pde_index) = 0;
                    pmm::free_frame(pt_phys);
                }
            } else {
                for pte_index in 0..1024usize {
                    let pte = *pt.add(pte_index);
                    if pte & PageFlags::PRESENT.bits() != 0 && pte & PageFlags::USER.bits() != 0 {
                        pmm::free_frame(pte & !0xFFF);
                    }
                    *pt.add(pte_index) = 0;
                }
                *pd.add(pde_index) = 0;
                pmm::free_frame(pt_phys);
            }
        }
        if pd_phys != active {
            pmm::free_frame(pd_phys);
        }
    }
}

/// Deep-copy every present USER PTE of `src_pd_phys` into a freshly
/// allocated directory: a new frame per mapped page, its 4 KiB of data
/// copied, installed with matching flags. This is the resolution of
/// this repository's Open Question (spec §9): the source shares
/// directories and documents the resulting parent/child corruption as a
/// known defect; this implementation never shares.
fn deep_copy_directory(src_pd_phys: u32) -> Option<u32> {
    let dst_pd_phys = pmm::alloc_frame_below(crate::config::LOW_MEMORY_CEILING);
    if dst_pd_phys == 0 {
        return None;
    }
    // SAFETY: `dst_pd_phys` is a freshly allocated, identity-mapped frame.
    unsafe {
        core::ptr::write_bytes(dst_pd_phys as *mut u8, 0, 4096);
    }

    // SAFETY: `src_pd_phys` is a valid, fully formed page directory
    // (the parent's, currently active during `fork`).
    let result = unsafe {
        let src_pd = src_pd_phys as *const u32;
        let dst_pd = dst_pd_phys as *mut u32;
        let mut ok = true;

        'outer: for pde_index in 0..768usize {
            let pde = *src_pd.add(pde_index);
            if pde & PageFlags::PRESENT.bits() == 0 || pde & PageFlags::USER.bits() == 0 {
                continue;
            }
            let src_pt_phys = pde & !0xFFF;
            let dst_pt_phys = pmm::alloc_frame_below(crate::config::LOW_MEMORY_CEILING);
            if dst_pt_phys == 0 {
                ok = false;
                break;
            }
            core::ptr::write_bytes(dst_pt_phys as *mut u8, 0, 4096);
            let src_pt = src_pt_phys as *const u32;
            let dst_pt = dst_pt_phys as *mut u32;

            for pte_index in 0..1024usize {
                let pte = *src_pt.add(pte_index);
                if pte & PageFlags::PRESENT.bits() == 0 || pte & PageFlags::USER.bits() == 0 {
                    continue;
                }
                let src_frame = pte & !0xFFF;
                let dst_frame = pmm::alloc_frame_below(crate::config::LOW_MEMORY_CEILING);
                if dst_frame == 0 {
                    ok = false;
                    break 'outer;
                }
                // Every frame the PMM hands out sits below the
                // identity-mapped ceiling, so the source frame's
                // physical address doubles as a readable pointer
                // regardless of which directory currently owns it.
                core::ptr::copy_nonoverlapping(src_frame as *const u8, dst_frame as *mut u8, 4096);
                *dst_pt.add(pte_index) = dst_frame | (pte & 0xFFF);
            }
            *dst_pd.add(pde_index) = dst_pt_phys | (pde & 0xFFF);
        }

        // Kernel-resident PDEs (index >= 768, the higher-half mapping
        // installed by the boot stub) are shared across every process
        // directory, never copied: the child must be able to fetch
        // kernel code and touch kernel data the instant its CR3 is
        // loaded, including while still running inside the kernel
        // between `fork` returning and the next `iret` to ring 3.
        if ok {
            for pde_index in 768..1024usize {
                *dst_pd.add(pde_index) = *src_pd.add(pde_index);
            }
        }

        ok
    };

    if result {
        Some(dst_pd_phys)
    } else {
        free_user_address_space(dst_pd_phys);
        None
    }
}

/// Fork the current process: deep-copy its address space and enqueue
/// the child `READY` with `eax = 0`. Returns the child pid to the
/// parent, or -1 on failure (no free slot, or the copy ran out of
/// memory).
pub fn fork(parent_frame: &TrapFrame) -> i32 {
    without_interrupts(|| {
        let parent_pid = current_pid();
        if parent_pid < 0 {
            return -1;
        }
        // SAFETY: guarded by `without_interrupts`.
        let parent_page_dir = unsafe {
            let Some(i) = find_slot(parent_pid) else { return -1 };
            TABLE[i].page_dir
        };

        let child_pid = create(parent_pid);
        if child_pid < 0 {
            return -1;
        }

        let Some(child_pd) = deep_copy_directory(parent_page_dir) else {
            destroy(child_pid);
            return -1;
        };

        let mut child_context = ProcContext::snapshot(parent_frame);
        child_context.eax = 0;

        // SAFETY: guarded by `without_interrupts`.
        unsafe {
            let Some(i) = find_slot(child_pid) else {
                return -1;
            };
            TABLE[i].page_dir = child_pd;
            TABLE[i].context = child_context;
            let parent_brk = find_slot(parent_pid).map(|p| TABLE[p].brk).unwrap_or(0);
            TABLE[i].brk = parent_brk;
        }

        child_pid
    })
}

/// Mark the current process `ZOMBIE`, record `code`, and wake its
/// parent if it was `BLOCKED` on a `wait` with no zombie child yet.
pub fn exit(code: i32) {
    without_interrupts(|| {
        let pid = current_pid();
        // SAFETY: guarded by `without_interrupts`.
        unsafe {
            let Some(i) = find_slot(pid) else { return };
            TABLE[i].exit_code = code;
            TABLE[i].state = ProcState::Zombie;
            let ppid = TABLE[i].ppid;
            if ppid > 0 {
                if let Some(p) = find_slot(ppid) {
                    if TABLE[p].state == ProcState::Blocked {
                        TABLE[p].state = ProcState::Ready;
                    }
                }
            }
        }
    });
}

/// Scan for any `ZOMBIE` child of the current process. If none exist
/// but at least one non-zombie child does, block (halting with
/// interrupts enabled) until a reschedule; with no children at all,
/// return -1 immediately.
pub fn wait(status_out: &mut i32) -> i32 {
    loop {
        let outcome = without_interrupts(|| {
            let parent_pid = current_pid();
            // SAFETY: guarded by `without_interrupts`.
            unsafe {
                for i in 0..MAX_PROCESSES {
                    if TABLE[i].state == ProcState::Zombie && TABLE[i].ppid == parent_pid {
                        let pid = TABLE[i].pid;
                        let code = TABLE[i].exit_code;
                        return WaitOutcome::Collected(pid, code);
                    }
                }
                let has_children =
                    (0..MAX_PROCESSES).any(|i| TABLE[i].state != ProcState::Unused && TABLE[i].ppid == parent_pid);
                if has_children {
                    WaitOutcome::KeepWaiting
                } else {
                    WaitOutcome::NoChildren
                }
            }
        });

        match outcome {
            WaitOutcome::Collected(pid, code) => {
                destroy(pid);
                *status_out = code;
                return pid;
            }
            WaitOutcome::NoChildren => return -1,
            WaitOutcome::KeepWaiting => {
                crate::io::sti();
                crate::io::hlt();
            }
        }
    }
}

enum WaitOutcome {
    Collected(i32, i32),
    KeepWaiting,
    NoChildren,
}

/// Round-robin `pick_next` policy: successor of `current`, skipping
/// non-`READY`/`RUNNING` slots, falling through to `current` if none
/// found.
fn pick_next_round_robin(current: i32) -> Option<i32> {
    // SAFETY: caller holds the `without_interrupts` guard.
    unsafe {
        let Some(from) = find_slot(current) else { return None };
        for k in 1..=MAX_PROCESSES {
            let i = (from + k) % MAX_PROCESSES;
            if TABLE[i].state == ProcState::Ready {
                return Some(TABLE[i].pid);
            }
        }
        Some(current)
    }
}

/// Called from the timer IRQ (component F's IRQ0 handler): snapshots
/// the outgoing process from `regs`, asks the scheduling policy for the
/// next one, and rewrites `regs` and `CR3` if a different process was
/// chosen.
pub fn process_schedule(regs: &mut TrapFrame) {
    without_interrupts(|| {
        let current = current_pid();
        if current < 0 {
            return;
        }
        // SAFETY: guarded by `without_interrupts`.
        unsafe {
            let Some(cur_idx) = find_slot(current) else { return };
            let was_running = TABLE[cur_idx].state == ProcState::Running;
            if was_running {
                TABLE[cur_idx].context = ProcContext::snapshot(regs);
                TABLE[cur_idx].state = ProcState::Ready;
            }

            let Some(next_pid) = pick_next_round_robin(current) else {
                if was_running {
                    TABLE[cur_idx].state = ProcState::Running;
                }
                return;
            };

            if next_pid == current {
                TABLE[cur_idx].state = ProcState::Running;
                return;
            }

            let Some(next_idx) = find_slot(next_pid) else { return };
            if TABLE[next_idx].state != ProcState::Ready && TABLE[next_idx].state != ProcState::Running {
                if was_running {
                    TABLE[cur_idx].state = ProcState::Running;
                }
                return;
            }

            CURRENT_PID.store(next_pid, Ordering::Relaxed);
            TABLE[next_idx].state = ProcState::Running;
            crate::io::write_cr3(TABLE[next_idx].page_dir);
            TABLE[next_idx].context.restore_into(regs);
        }
    });
}

/// Process-wide slot for the exit code stashed by `SYS_exit`, read back
/// by [`run_user_and_wait`] once the resume jump lands.
static EXIT_CODE_SLOT: AtomicI32 = AtomicI32::new(0);

/// Record the exit code for the process currently running in user mode
/// and arm the common ISR tail's resume-point jump. Called by the
/// syscall dispatcher servicing `SYS_exit`.
pub fn request_exit(code: i32) {
    EXIT_CODE_SLOT.store(code, Ordering::Relaxed);
    let (esp, ebp, eip) = resume_point();
    isr::request_resume(esp, ebp, eip);
}

/// The `(esp, ebp, eip)` resume point captured by [`enter_user_mode`]
/// just before the ring-3 transition; consumed once, by [`request_exit`].
static CAPTURED_ESP: AtomicI32 = AtomicI32::new(0);
static CAPTURED_EBP: AtomicI32 = AtomicI32::new(0);
static CAPTURED_EIP: AtomicI32 = AtomicI32::new(0);

fn resume_point() -> (u32, u32, u32) {
    (
        CAPTURED_ESP.load(Ordering::Relaxed) as u32,
        CAPTURED_EBP.load(Ordering::Relaxed) as u32,
        CAPTURED_EIP.load(Ordering::Relaxed) as u32,
    )
}

/// Map `binary` at `USER_CODE_START`-relative pages and the user stack,
/// per the same two-phase approach as the teacher's `map_user_binary`/
/// `map_user_stack`, generalised to this kernel's 32-bit page flags.
fn load_user_image(binary: &[u8]) -> Result<(), &'static str> {
    let base = crate::config::USER_CODE_START;
    let num_pages = (binary.len() as u32).div_ceil(4096).max(1);

    for i in 0..num_pages {
        let virt = base + i * 4096;
        let frame = pmm::alloc_frame();
        if frame == 0 {
            return Err("out of physical memory loading user image");
        }
        // SAFETY: `virt` is page-aligned and in the user region; `frame`
        // is freshly allocated.
        unsafe {
            vmm::map(virt, frame, PageFlags::PRESENT | PageFlags::WRITE | PageFlags::USER)
                .map_err(|_| "vmm exhausted mapping user image")?;
            core::ptr::write_bytes(virt as *mut u8, 0, 4096);
            let start = (i * 4096) as usize;
            let end = (start + 4096).min(binary.len());
            if start < binary.len() {
                core::ptr::copy_nonoverlapping(binary[start..end].as_ptr(), virt as *mut u8, end - start);
            }
        }
    }

    let stack_pages = USER_STACK_SIZE / 4096;
    for i in 0..stack_pages {
        let virt = USER_STACK_BOTTOM + i * 4096;
        let frame = pmm::alloc_frame();
        if frame == 0 {
            return Err("out of physical memory mapping user stack");
        }
        // SAFETY: `virt` is page-aligned and in the user stack region.
        unsafe {
            vmm::map(virt, frame, PageFlags::PRESENT | PageFlags::WRITE | PageFlags::USER)
                .map_err(|_| "vmm exhausted mapping user stack")?;
            core::ptr::write_bytes(virt as *mut u8, 0, 4096);
        }
    }

    Ok(())
}

/// The synchronous "run a user image and block until it exits" bridge
/// (spec §4.7's user-mode bridge). Captures the resume point, creates
/// the process, and transitions to ring 3. Returns the exit code once
/// `SYS_exit` jumps back here.
///
/// Mirrors the teacher's `switch_to_user_mode`/`KERNEL_RSP` pattern,
/// generalised from `iretq` to 32-bit `iret` and from a single saved
/// `rsp` to the `(esp, ebp, eip)` triple spec §4.7 requires.
///
/// # Safety
/// GDT, IDT (including the syscall gate), PMM, and VMM must already be
/// initialised. Must not be called re-entrantly.
#[inline(never)]
pub unsafe fn run_user_and_wait(binary: &[u8]) -> Result<i32, &'static str> {
    load_user_image(binary)?;

    let pid = create(-1);
    if pid < 0 {
        return Err("process table full");
    }
    // SAFETY: guarded process-table mutation during boot, no concurrent
    // scheduling of this slot has started yet.
    unsafe {
        let Some(i) = find_slot(pid) else {
            return Err("process vanished immediately after creation");
        };
        TABLE[i].state = ProcState::Running;
        TABLE[i].page_dir = crate::io::read_cr3();
    }
    CURRENT_PID.store(pid, Ordering::Relaxed);

    core::sync::atomic::compiler_fence(Ordering::SeqCst);
    enter_user_mode(crate::config::USER_CODE_START, crate::config::USER_STACK_BOTTOM + USER_STACK_SIZE);
    core::sync::atomic::compiler_fence(Ordering::SeqCst);

    destroy(pid);
    Ok(EXIT_CODE_SLOT.load(Ordering::Relaxed))
}

/// Grow or shrink the current process's heap break by `inc` bytes,
/// mapping freshly touched pages `USER|WRITE` on demand (never unmapping
/// on shrink, matching `original_source`'s `SYS_sbrk`: a bump allocator
/// with no free). Returns the break's value *before* the adjustment, or
/// `u32::MAX` if there is no current process.
pub fn sbrk(inc: i32) -> u32 {
    without_interrupts(|| {
        let pid = current_pid();
        // SAFETY: guarded by `without_interrupts`.
        unsafe {
            let Some(i) = find_slot(pid) else { return u32::MAX };
            if TABLE[i].brk == 0 {
                TABLE[i].brk = crate::config::USER_HEAP_START;
            }
            let old = TABLE[i].brk;
            if inc == 0 {
                return old;
            }

            let new_brk = (i64::from(old) + i64::from(inc)) as u32;
            if inc > 0 {
                let start_page = (old + 0xFFF) & !0xFFF;
                let end_page = (new_brk + 0xFFF) & !0xFFF;
                let mut addr = start_page;
                while addr < end_page {
                    let frame = pmm::alloc_frame();
                    if frame == 0 {
                        break;
                    }
                    if vmm::map(addr, frame, PageFlags::PRESENT | PageFlags::WRITE | PageFlags::USER).is_err()
                    {
                        pmm::free_frame(frame);
                        break;
                    }
                    addr += 4096;
                }
            }

            TABLE[i].brk = new_brk;
            old
        }
    })
}

/// Builds the ring-3 `iret` frame and performs the transition. Returns
/// (via the resume-point jump in `isr::common_stub`, not via a normal
/// `ret`) once the user process calls `SYS_exit`.
#[naked]
unsafe extern "C" fn enter_user_mode(_entry: u32, _user_stack_top: u32) {
    // SAFETY: naked function; on entry (cdecl) `[esp+4] = entry`,
    // `[esp+8] = user_stack_top`, `[esp] = return address into
    // `run_user_and_wait`.
    unsafe {
        core::arch::naked_asm!(
            "push ebx",
            "push esi",
            "push edi",
            "push ebp",

            "mov eax, [esp + 20]", // entry
            "mov ecx, [esp + 24]", // user_stack_top

            "mov [{resume_esp}], esp",
            "mov [{resume_ebp}], ebp",
            "lea edx, [2f]",
            "mov [{resume_eip}], edx",

            "mov dx, {user_ds}",
            "mov ds, dx",
            "mov es, dx",
            "mov fs, dx",
            "mov gs, dx",

            "push {user_ds}",   // SS
            "push ecx",         // ESP
            "pushfd",
            "pop edx",
            "or edx, 0x200",    // IF
            "push edx",         // EFLAGS
            "push {user_cs}",   // CS
            "push eax",         // EIP

            "iret",

            "2:",
            "mov dx, {kernel_ds}",
            "mov ds, dx",
            "mov es, dx",
            "mov fs, dx",
            "mov gs, dx",

            "pop ebp",
            "pop edi",
            "pop esi",
            "pop ebx",
            "ret",

            resume_esp = sym CAPTURED_ESP,
            resume_ebp = sym CAPTURED_EBP,
            resume_eip = sym CAPTURED_EIP,
            user_ds = const USER_DS as u32,
            user_cs = const USER_CS as u32,
            kernel_ds = const KERNEL_DS as u32,
        );
    }
}
