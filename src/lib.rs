//! Counter Bridge - multi-broker order-routing gateway
//!
//! Sits between strategy processes and exchange-counter adapters,
//! decoupled through SysV shared-memory MWMR ring queues carrying
//! binary-stable records. A position ledger derives the Chinese-futures
//! open/close flag for every order; counters plug in behind one trait,
//! with a software matching simulator bundled for development and
//! backtesting.

pub mod bridge;
pub mod broker;
pub mod core;
pub mod ledger;
pub mod monitor;
pub mod shm;
pub mod sim;
pub mod wire;

pub use crate::core::{Error, Result};
