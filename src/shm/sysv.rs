//! SysV shared-memory segments - keyed, world-RW, page-aligned
//!
//! Keys and 0666 mode are part of the wire contract with the strategy-side
//! processes; segments are an infra-internal IPC surface, not a public API.

use std::ffi::c_void;

use crate::core::{Error, Result};

const SHM_MODE: i32 = 0o666;

/// An attached SysV shared-memory segment.
///
/// Dropping does NOT detach: queues handed to other threads keep raw
/// pointers into the mapping, so teardown is explicit via `detach`.
#[derive(Debug)]
pub struct ShmSegment {
    id: i32,
    addr: *mut u8,
    size: usize,
}

unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create (or attach to an existing) segment for `key`, sized at least
    /// `size` bytes. Server-side call: the bridge creates the queues.
    pub fn create(key: i32, size: usize) -> Result<Self> {
        let total = page_align(size);
        let mut id = unsafe {
            libc::shmget(key, total, libc::IPC_CREAT | libc::IPC_EXCL | SHM_MODE)
        };
        if id < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::EEXIST) {
                // Segment survived a previous run; attach to it as-is.
                id = unsafe { libc::shmget(key, total, libc::IPC_CREAT | SHM_MODE) };
            }
            if id < 0 {
                return Err(Error::Shm(format!(
                    "shmget create failed, key=0x{key:x} size={total}: {}",
                    std::io::Error::last_os_error()
                )));
            }
        }
        Self::attach(id, key, total)
    }

    /// Attach to an existing segment. Client-side call: missing segment is
    /// a fatal startup error, not something to retry.
    pub fn open(key: i32, size: usize) -> Result<Self> {
        let total = page_align(size);
        let id = unsafe { libc::shmget(key, total, SHM_MODE) };
        if id < 0 {
            return Err(Error::Shm(format!(
                "shmget open failed, key=0x{key:x} size={total}: {}",
                std::io::Error::last_os_error()
            )));
        }
        Self::attach(id, key, total)
    }

    fn attach(id: i32, key: i32, size: usize) -> Result<Self> {
        let addr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if addr == usize::MAX as *mut c_void {
            return Err(Error::Shm(format!(
                "shmat failed, key=0x{key:x}: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(Self {
            id,
            addr: addr as *mut u8,
            size,
        })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Detach the mapping from this process.
    pub fn detach(&self) -> Result<()> {
        let rc = unsafe { libc::shmdt(self.addr as *const c_void) };
        if rc != 0 {
            return Err(Error::Shm(format!(
                "shmdt failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    /// Mark the segment for removal. Test cleanup only; production
    /// segments outlive the processes on purpose.
    pub fn remove(&self) -> Result<()> {
        let rc = unsafe { libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(Error::Shm(format!(
                "shmctl(IPC_RMID) failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

/// Round up to the next page boundary.
pub fn page_align(size: usize) -> usize {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    if page == 0 || size % page == 0 {
        return size;
    }
    size + page - (size % page)
}
