//! Configuration - SHM wiring defaults and broker specs

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// SysV shared-memory wiring. Defaults match the legacy deployment; every
/// process on the box must agree on these keys and capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShmConfig {
    /// Request queue key (strategy -> bridge)
    pub request_key: i32,
    /// Request queue capacity in slots (rounded up to a power of two)
    pub request_size: i64,
    /// Response queue key (bridge -> strategy)
    pub response_key: i32,
    /// Response queue capacity in slots
    pub response_size: i64,
    /// Market-data queue key (feeder -> strategy)
    pub md_key: i32,
    /// Market-data queue capacity in slots
    pub md_size: i64,
    /// Client-id counter segment key
    pub client_store_key: i32,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            request_key: 0x0F20,     // 3872
            request_size: 4096,
            response_key: 0x1308,    // 4872
            response_size: 4096,
            md_key: 0x1001,          // 4097
            md_size: 65536,
            client_store_key: 0x16F0, // 5872
        }
    }
}

/// One `<name>:<config_path>` broker argument, e.g. `simulator:/etc/sim.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSpec {
    pub name: String,
    pub config_path: String,
}

impl BrokerSpec {
    pub fn parse(arg: &str) -> Result<Self> {
        let (name, config_path) = arg.split_once(':').ok_or_else(|| {
            Error::Config(format!(
                "invalid broker spec '{arg}', expected <name>:<config_path>"
            ))
        })?;
        if name.is_empty() {
            return Err(Error::Config(format!("empty broker name in '{arg}'")));
        }
        Ok(Self {
            name: name.to_string(),
            config_path: config_path.to_string(),
        })
    }
}
