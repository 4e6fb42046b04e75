//! MWMR ring queue over SysV shared memory
//!
//! Layout: `[ head: AtomicI64 ][ QueueElem<T> ; size ]` with `size` a power
//! of two. Writers claim a sequence number with one fetch-add on `head` and
//! publish the slot by storing the sequence number *after* the payload, so
//! a reader detects a fully-written slot with a single load. The consumer
//! cursor (`tail`) is process-local and never stored in shared memory.
//!
//! There is no back-pressure: writers that outrun the single consumer by
//! more than `size` slots overwrite unread records, and the consumer
//! silently resumes at whatever sequence number the probed slot carries.
//! Drop-oldest is the contract at every integration boundary; size the
//! ring for the burst, not the average.

use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::atomic::{fence, AtomicI64, AtomicU64, Ordering};

use crate::core::Result;
use crate::shm::sysv::ShmSegment;

/// One ring slot: payload first, completion token last.
#[repr(C)]
pub struct QueueElem<T> {
    pub data: T,
    pub seq_no: u64,
}

const HEADER_SIZE: usize = 8;

/// Multi-writer multi-reader queue, single-consumer drain.
///
/// `enqueue` takes `&self` and is safe from any number of threads or
/// processes. `dequeue`/`is_empty` advance the local cursor and belong to
/// exactly one consumer, hence `&mut self`.
pub struct MwmrQueue<T: Copy> {
    seg: ShmSegment,
    elems: *mut u8,
    size: i64,
    mask: i64,
    tail: i64,
    _marker: PhantomData<T>,
}

unsafe impl<T: Copy + Send> Send for MwmrQueue<T> {}
unsafe impl<T: Copy + Send> Sync for MwmrQueue<T> {}

impl<T: Copy> MwmrQueue<T> {
    const ELEM_SIZE: usize = mem::size_of::<QueueElem<T>>();
    const SEQ_OFFSET: usize = mem::offset_of!(QueueElem<T>, seq_no);

    /// Create the ring (server side). Resets the header and zeroes the
    /// slot array even if the segment already existed.
    pub fn create(key: i32, requested_size: i64) -> Result<Self> {
        let size = next_pow2(requested_size);
        let total = HEADER_SIZE + size as usize * Self::ELEM_SIZE;
        let seg = ShmSegment::create(key, total)?;

        let q = Self::init(seg, size);
        unsafe {
            ptr::write_bytes(q.elems, 0, size as usize * Self::ELEM_SIZE);
        }
        q.header().store(1, Ordering::Relaxed);

        tracing::info!(
            "mwmr: created queue key=0x{:x} size={} elem_size={} total_bytes={}",
            key,
            size,
            Self::ELEM_SIZE,
            total
        );
        Ok(q)
    }

    /// Attach to an existing ring (client side). The consumer cursor is
    /// initialized to the current head: history is skipped on reconnect.
    pub fn open(key: i32, requested_size: i64) -> Result<Self> {
        let size = next_pow2(requested_size);
        let total = HEADER_SIZE + size as usize * Self::ELEM_SIZE;
        let seg = ShmSegment::open(key, total)?;

        let mut q = Self::init(seg, size);
        q.tail = q.header().load(Ordering::Relaxed);
        Ok(q)
    }

    fn init(seg: ShmSegment, size: i64) -> Self {
        let elems = unsafe { seg.as_ptr().add(HEADER_SIZE) };
        Self {
            seg,
            elems,
            size,
            mask: size - 1,
            tail: 1,
            _marker: PhantomData,
        }
    }

    fn header(&self) -> &AtomicI64 {
        unsafe { &*(self.seg.as_ptr() as *const AtomicI64) }
    }

    fn slot_ptr(&self, seq: i64) -> *mut u8 {
        unsafe { self.elems.add((seq & self.mask) as usize * Self::ELEM_SIZE) }
    }

    fn slot_seq(&self, slot: *mut u8) -> &AtomicU64 {
        unsafe { &*(slot.add(Self::SEQ_OFFSET) as *const AtomicU64) }
    }

    /// Enqueue one record. Multi-writer safe; never blocks, never fails.
    pub fn enqueue(&self, value: &T) {
        let my_head = self.header().fetch_add(1, Ordering::AcqRel);
        let slot = self.slot_ptr(my_head);
        unsafe {
            ptr::copy_nonoverlapping(
                value as *const T as *const u8,
                slot,
                mem::size_of::<T>(),
            );
        }
        // Payload must be globally visible before the completion token.
        fence(Ordering::Release);
        self.slot_seq(slot).store(my_head as u64, Ordering::Release);
    }

    /// True when no published record is waiting at the cursor.
    pub fn is_empty(&self) -> bool {
        let slot = self.slot_ptr(self.tail);
        self.slot_seq(slot).load(Ordering::Acquire) < self.tail as u64
    }

    /// Dequeue the next record, or `None` when empty. Single consumer.
    pub fn dequeue(&mut self) -> Option<T> {
        let slot = self.slot_ptr(self.tail);
        let seq = self.slot_seq(slot).load(Ordering::Acquire);
        if seq < self.tail as u64 {
            return None;
        }
        fence(Ordering::Acquire);

        let mut out = mem::MaybeUninit::<T>::uninit();
        unsafe {
            ptr::copy_nonoverlapping(
                slot as *const u8,
                out.as_mut_ptr() as *mut u8,
                mem::size_of::<T>(),
            );
        }
        self.tail = seq as i64 + 1;
        Some(unsafe { out.assume_init() })
    }

    /// Capacity in slots (power of two).
    pub fn capacity(&self) -> i64 {
        self.size
    }

    /// Detach from the segment. The segment itself stays alive for the
    /// peer processes.
    pub fn close(&self) -> Result<()> {
        self.seg.detach()
    }

    /// Detach and remove the segment. Test teardown only.
    pub fn destroy(&self) -> Result<()> {
        self.seg.detach()?;
        self.seg.remove()
    }
}

/// Smallest power of two >= `value`.
pub fn next_pow2(value: i64) -> i64 {
    if value <= 1 {
        return 1;
    }
    if value & (value - 1) == 0 {
        return value;
    }
    let mut result = 1i64;
    while result < value {
        result <<= 1;
    }
    result
}
