//! SysV shared-memory transport: segments, MWMR rings, client-id store

pub mod client_store;
pub mod mwmr;
pub mod sysv;

pub use client_store::ClientStore;
pub use mwmr::{next_pow2, MwmrQueue, QueueElem};
pub use sysv::{page_align, ShmSegment};
