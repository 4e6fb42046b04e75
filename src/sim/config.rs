//! Simulator configuration - YAML with defaults and validation

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Matching-simulator configuration. Every section is optional in the
/// YAML; missing values take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Matching mode. Only "immediate" is implemented; "market_driven"
    /// fails validation.
    pub mode: String,
    pub account: AccountSection,
    pub matching: MatchingSection,
    pub risk: RiskSection,
    pub persistence: PersistenceSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSection {
    pub initial_balance: f64,
    pub commission_rate: f64,
    pub margin_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSection {
    pub accept_delay_ms: u64,
    pub fill_delay_ms: u64,
    pub slippage_ticks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub max_position_per_symbol: u32,
    pub max_daily_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    pub data_dir: String,
    pub enable: bool,
    pub snapshot_interval_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    pub console: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            mode: "immediate".to_string(),
            account: AccountSection::default(),
            matching: MatchingSection::default(),
            risk: RiskSection::default(),
            persistence: PersistenceSection::default(),
            log: LogSection::default(),
        }
    }
}

impl Default for AccountSection {
    fn default() -> Self {
        Self {
            initial_balance: 1_000_000.0,
            commission_rate: 0.0003,
            margin_rate: 0.10,
        }
    }
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            accept_delay_ms: 50,
            fill_delay_ms: 100,
            slippage_ticks: 1.0,
        }
    }
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            max_position_per_symbol: 1000,
            max_daily_loss: 100_000.0,
        }
    }
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            data_dir: "data/simulator".to_string(),
            enable: true,
            snapshot_interval_sec: 60,
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
        }
    }
}

impl SimulatorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode != "immediate" {
            return Err(Error::Config(format!(
                "unsupported matching mode '{}', only 'immediate' is implemented",
                self.mode
            )));
        }
        if self.account.initial_balance <= 0.0 {
            return Err(Error::Config("initial_balance must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.account.commission_rate) {
            return Err(Error::Config("commission_rate must be in [0, 1]".into()));
        }
        if self.account.margin_rate <= 0.0 || self.account.margin_rate > 1.0 {
            return Err(Error::Config("margin_rate must be in (0, 1]".into()));
        }
        if self.matching.slippage_ticks < 0.0 {
            return Err(Error::Config("slippage_ticks must be non-negative".into()));
        }
        if self.risk.max_position_per_symbol == 0 {
            return Err(Error::Config("max_position_per_symbol must be positive".into()));
        }
        Ok(())
    }
}
