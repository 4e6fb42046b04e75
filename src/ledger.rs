//! Position ledger - four buckets per symbol, freeze-on-send semantics
//!
//! The bridge derives the open/close flag for every outgoing order from
//! this table and speculatively debits the chosen bucket in the same
//! locked section (freeze). Rejects and cancels credit the unfilled
//! quantity back; trade confirms for opens credit the today bucket; trade
//! confirms for closes are no-ops because the debit already happened.
//!
//! One mutex covers the map and all buckets. It is never held across a
//! broker call or a response enqueue.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;

use crate::broker::{Direction, OffsetFlag};
use crate::core::Result;
use crate::wire::ResponseType;

/// Per-symbol contract position: overnight/today x long/short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContractPosition {
    pub on_long: u32,
    pub today_long: u32,
    pub on_short: u32,
    pub today_short: u32,
}

#[derive(Default)]
pub struct PositionLedger {
    positions: Mutex<HashMap<String, ContractPosition>>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide open/close for an order and freeze the closed bucket,
    /// atomically with the decision.
    ///
    /// Buys close shorts, sells close longs. On today-aware exchanges
    /// (SHFE/INE) the today bucket is tried first and flagged CloseToday;
    /// elsewhere only the overnight bucket is considered and the flag is
    /// the generic Close. Quantities that fit no bucket open instead.
    pub fn derive_offset(
        &self,
        symbol: &str,
        direction: Direction,
        quantity: u32,
        today_aware: bool,
    ) -> OffsetFlag {
        let mut positions = self.positions.lock();
        let pos = positions.entry(symbol.to_string()).or_default();

        let (today_bucket, on_bucket) = match direction {
            Direction::Buy => (&mut pos.today_short, &mut pos.on_short),
            Direction::Sell => (&mut pos.today_long, &mut pos.on_long),
        };

        if today_aware && quantity <= *today_bucket {
            *today_bucket -= quantity;
            return OffsetFlag::CloseToday;
        }
        if quantity <= *on_bucket {
            *on_bucket -= quantity;
            return if today_aware {
                OffsetFlag::CloseYesterday
            } else {
                OffsetFlag::Close
            };
        }
        OffsetFlag::Open
    }

    /// Position effect of a response.
    ///
    /// `side` and `offset` come from the cached order, `quantity` from the
    /// response record: traded volume on trade confirms, unfilled
    /// remainder on rejects and cancels.
    pub fn apply_response(
        &self,
        response_type: ResponseType,
        side: Direction,
        offset: OffsetFlag,
        quantity: u32,
        symbol: &str,
    ) {
        if quantity == 0 {
            return;
        }
        let mut positions = self.positions.lock();
        let pos = positions.entry(symbol.to_string()).or_default();

        match response_type {
            ResponseType::TradeConfirm => {
                // Close fills were already debited at send time.
                if offset == OffsetFlag::Open {
                    match side {
                        Direction::Buy => pos.today_long += quantity,
                        Direction::Sell => pos.today_short += quantity,
                    }
                }
            }
            ResponseType::OrderError
            | ResponseType::OrsReject
            | ResponseType::RmsReject
            | ResponseType::CancelOrderConfirm => {
                // Unfreeze: credit the unfilled quantity back to the bucket
                // the send-time debit came from. The closed direction is the
                // opposite of the order side.
                match offset {
                    OffsetFlag::CloseToday => match side {
                        Direction::Buy => pos.today_short += quantity,
                        Direction::Sell => pos.today_long += quantity,
                    },
                    OffsetFlag::CloseYesterday | OffsetFlag::Close => match side {
                        Direction::Buy => pos.on_short += quantity,
                        Direction::Sell => pos.on_long += quantity,
                    },
                    OffsetFlag::Open => {}
                }
            }
            _ => {}
        }
    }

    /// Current buckets for one symbol.
    pub fn get(&self, symbol: &str) -> ContractPosition {
        self.positions.lock().get(symbol).copied().unwrap_or_default()
    }

    /// Cloned view of the whole table, for export and diagnostics.
    pub fn snapshot(&self) -> HashMap<String, ContractPosition> {
        self.positions.lock().clone()
    }

    /// Load a warm-start file: `symbol,ONLong,todayLong,ONShort,todayShort`
    /// per line, `#` comments. Best-effort; malformed lines are skipped
    /// with a warning.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)?;
        let mut positions = self.positions.lock();
        let mut loaded = 0;

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 5 {
                tracing::warn!("position file {}:{}: expected 5 fields", path.display(), lineno + 1);
                continue;
            }
            let parsed: Option<Vec<u32>> =
                fields[1..].iter().map(|f| f.parse().ok()).collect();
            match parsed {
                Some(v) => {
                    positions.insert(
                        fields[0].to_string(),
                        ContractPosition {
                            on_long: v[0],
                            today_long: v[1],
                            on_short: v[2],
                            today_short: v[3],
                        },
                    );
                    loaded += 1;
                }
                None => {
                    tracing::warn!("position file {}:{}: bad quantity", path.display(), lineno + 1);
                }
            }
        }
        tracing::info!("ledger: loaded {} positions from {}", loaded, path.display());
        Ok(loaded)
    }

    /// Write the warm-start file back. Opportunistic side-file, not a
    /// transaction log.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let positions = self.positions.lock();
            let mut rows: Vec<_> = positions
                .iter()
                .map(|(s, p)| (s.clone(), *p))
                .collect();
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            rows
        };

        let mut file = fs::File::create(path)?;
        writeln!(file, "# symbol,ONLong,todayLong,ONShort,todayShort")?;
        for (symbol, p) in snapshot {
            writeln!(
                file,
                "{},{},{},{},{}",
                symbol, p.on_long, p.today_long, p.on_short, p.today_short
            )?;
        }
        Ok(())
    }
}
