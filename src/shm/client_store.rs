//! Shared client-id counter - 16 bytes of SysV memory
//!
//! Issues unique client identifiers across processes via one fetch-add.
//! Unrelated to the ring queues; kept tiny on purpose.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::core::Result;
use crate::shm::sysv::ShmSegment;

#[repr(C)]
struct ClientStoreData {
    data: AtomicI64,
    first_client_id: i64,
}

const _: () = assert!(std::mem::size_of::<ClientStoreData>() == 16);

pub struct ClientStore {
    seg: ShmSegment,
}

impl ClientStore {
    pub fn create(key: i32, initial_value: i64) -> Result<Self> {
        let seg = ShmSegment::create(key, std::mem::size_of::<ClientStoreData>())?;
        let store = Self { seg };
        store.data().data.store(initial_value, Ordering::Relaxed);
        unsafe {
            (*(store.seg.as_ptr() as *mut ClientStoreData)).first_client_id = initial_value;
        }
        tracing::info!("client-store: created key=0x{:x} initial={}", key, initial_value);
        Ok(store)
    }

    pub fn open(key: i32) -> Result<Self> {
        let seg = ShmSegment::open(key, std::mem::size_of::<ClientStoreData>())?;
        Ok(Self { seg })
    }

    fn data(&self) -> &ClientStoreData {
        unsafe { &*(self.seg.as_ptr() as *const ClientStoreData) }
    }

    /// Claim the next client id.
    pub fn next_client_id(&self) -> i64 {
        self.data().data.fetch_add(1, Ordering::AcqRel)
    }

    /// Peek at the counter without claiming.
    pub fn current(&self) -> i64 {
        self.data().data.load(Ordering::Acquire)
    }

    /// First id this store was created with.
    pub fn first_client_id(&self) -> i64 {
        self.data().first_client_id
    }

    pub fn close(&self) -> Result<()> {
        self.seg.detach()
    }

    pub fn destroy(&self) -> Result<()> {
        self.seg.detach()?;
        self.seg.remove()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_across_handles() {
        let key = 0x7E5200;
        let store = ClientStore::create(key, 7).unwrap();
        assert_eq!(store.first_client_id(), 7);
        assert_eq!(store.next_client_id(), 7);
        assert_eq!(store.next_client_id(), 8);

        let peer = ClientStore::open(key).unwrap();
        assert_eq!(peer.next_client_id(), 9);
        assert_eq!(store.current(), 10);

        peer.close().unwrap();
        store.destroy().unwrap();
    }
}
