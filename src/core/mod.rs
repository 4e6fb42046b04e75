//! Core types shared across the gateway

pub mod config;
pub mod error;

pub use config::{BrokerSpec, ShmConfig};
pub use error::{Error, Result};
