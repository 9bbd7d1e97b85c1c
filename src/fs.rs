//! Narrow in-memory filesystem (new, not ported) backing
//! `SYS_open`/`SYS_close`/`SYS_read`(fd>2)/`SYS_fwrite`/`SYS_fs_list`.
//!
//! `original_source/kernel/fs/fs.c` delegates every operation to an
//! ext2 driver over a block device, both explicitly out of scope per
//! spec's Non-goals. What survives here is the shape of that API
//! (`fs_open`/`fs_read`/`fs_write`/`fs_close`/`fs_dump_list`) with a
//! fixed-size, heapless store standing in for the disk, serialised by
//! one spinlock per spec §5's "the block device is serialised by a
//! single spinlock" rule, applied here to the whole namespace since
//! there is no real block device behind it.

use spin::Mutex;

use crate::config::{FS_MAX_FILES, FS_MAX_FILE_SIZE};

const MAX_NAME: usize = 32;
/// Lowest fd this filesystem hands out; 0..=2 are reserved for
/// stdin/stdout/stderr by `syscall`.
const FIRST_FD: i32 = 3;
/// Fixed-size open-file table; generous relative to `FS_MAX_FILES`
/// since the same file may be open more than once.
const MAX_OPEN: usize = FS_MAX_FILES * 2;

struct FileSlot {
    in_use: bool,
    name_len: usize,
    name: [u8; MAX_NAME],
    data: [u8; FS_MAX_FILE_SIZE],
    len: usize,
}

impl FileSlot {
    const fn empty() -> Self {
        Self {
            in_use: false,
            name_len: 0,
            name: [0; MAX_NAME],
            data: [0; FS_MAX_FILE_SIZE],
            len: 0,
        }
    }

    fn name_bytes(&self) -> &[u8] {
        &self.name[..self.name_len]
    }
}

#[derive(Clone, Copy)]
struct OpenFile {
    in_use: bool,
    slot: usize,
    cursor: usize,
}

impl OpenFile {
    const fn closed() -> Self {
        Self { in_use: false, slot: 0, cursor: 0 }
    }
}

struct Filesystem {
    files: [FileSlot; FS_MAX_FILES],
    open: [OpenFile; MAX_OPEN],
}

impl Filesystem {
    fn find_by_name(&self, name: &[u8]) -> Option<usize> {
        self.files.iter().position(|f| f.in_use && f.name_bytes() == name)
    }

    fn create(&mut self, name: &[u8]) -> Option<usize> {
        let n = name.len().min(MAX_NAME);
        let i = self.files.iter().position(|f| !f.in_use)?;
        self.files[i] = FileSlot::empty();
        self.files[i].in_use = true;
        self.files[i].name[..n].copy_from_slice(&name[..n]);
        self.files[i].name_len = n;
        Some(i)
    }
}

static FS: Mutex<Filesystem> = Mutex::new(Filesystem {
    files: {
        const EMPTY: FileSlot = FileSlot::empty();
        [EMPTY; FS_MAX_FILES]
    },
    open: [OpenFile::closed(); MAX_OPEN],
});

/// Open `name`, creating an empty file if it does not already exist.
/// Returns a fd in `FIRST_FD..` or -1 if both the file table and the
/// open-file table are full.
pub fn open(name: &[u8]) -> i32 {
    let mut fs = FS.lock();
    let slot = fs.find_by_name(name).or_else(|| fs.create(name));
    let Some(slot) = slot else { return -1 };

    let Some(fd_index) = fs.open.iter().position(|o| !o.in_use) else { return -1 };
    fs.open[fd_index] = OpenFile { in_use: true, slot, cursor: 0 };
    FIRST_FD + fd_index as i32
}

fn fd_index(fd: i32) -> Option<usize> {
    if fd < FIRST_FD {
        return None;
    }
    let i = (fd - FIRST_FD) as usize;
    (i < MAX_OPEN).then_some(i)
}

/// Close `fd`. Returns 0 on success, -1 if `fd` was not open.
pub fn close(fd: i32) -> i32 {
    let Some(i) = fd_index(fd) else { return -1 };
    let mut fs = FS.lock();
    if !fs.open[i].in_use {
        return -1;
    }
    fs.open[i] = OpenFile::closed();
    0
}

/// Read up to `buf.len()` bytes from `fd` at its current cursor,
/// advancing it. Returns bytes read, or -1 on a bad fd.
pub fn read(fd: i32, buf: &mut [u8]) -> i32 {
    let Some(i) = fd_index(fd) else { return -1 };
    let mut fs = FS.lock();
    if !fs.open[i].in_use {
        return -1;
    }
    let (slot, cursor) = (fs.open[i].slot, fs.open[i].cursor);
    let file = &fs.files[slot];
    let remaining = file.len.saturating_sub(cursor);
    let n = buf.len().min(remaining);
    buf[..n].copy_from_slice(&file.data[cursor..cursor + n]);
    fs.open[i].cursor += n;
    n as i32
}

/// Write `buf` to `fd` at its current cursor, advancing it and growing
/// the file's recorded length. Returns bytes written, or -1 on a bad fd
/// or if the write would exceed `FS_MAX_FILE_SIZE`.
pub fn write(fd: i32, buf: &[u8]) -> i32 {
    let Some(i) = fd_index(fd) else { return -1 };
    let mut fs = FS.lock();
    if !fs.open[i].in_use {
        return -1;
    }
    let (slot, cursor) = (fs.open[i].slot, fs.open[i].cursor);
    let room = FS_MAX_FILE_SIZE.saturating_sub(cursor);
    let n = buf.len().min(room);
    if n == 0 && !buf.is_empty() {
        return -1;
    }
    let file = &mut fs.files[slot];
    file.data[cursor..cursor + n].copy_from_slice(&buf[..n]);
    file.len = file.len.max(cursor + n);
    fs.open[i].cursor += n;
    n as i32
}

/// Write every file name, newline-separated, into `buf`. Returns the
/// number of bytes written (silently truncating names that would
/// overflow `buf`).
pub fn list(buf: &mut [u8]) -> usize {
    let fs = FS.lock();
    let mut pos = 0;
    for file in fs.files.iter().filter(|f| f.in_use) {
        let name = file.name_bytes();
        if pos + name.len() + 1 > buf.len() {
            break;
        }
        buf[pos..pos + name.len()].copy_from_slice(name);
        pos += name.len();
        buf[pos] = b'\n';
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn open_write_read_round_trips() {
        let fd = open(b"greeting");
        assert!(fd >= FIRST_FD);
        assert_eq!(write(fd, b"hi"), 2);
        assert_eq!(close(fd), 0);

        let fd2 = open(b"greeting");
        let mut buf = [0u8; 8];
        let n = read(fd2, &mut buf);
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], b"hi");
        close(fd2);
    }

    #[test_case]
    fn list_enumerates_open_names() {
        let fd = open(b"listed");
        let mut buf = [0u8; 64];
        let n = list(&mut buf);
        assert!(core::str::from_utf8(&buf[..n]).unwrap().contains("listed"));
        close(fd);
    }
}
