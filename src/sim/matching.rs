//! Position and account engine - Chinese-futures accounting
//!
//! Positions are keyed `(symbol, LONG|SHORT)` and the engine honours the
//! trade's offset flag: `Open` opens even when the opposite side holds
//! volume. Callers that want net-position behavior leave the offset at
//! `Open` on the order and let `derive_offset_for` convert it to a close
//! against the opposite side before matching.

use std::collections::HashMap;

use crate::broker::{Direction, OffsetFlag, OrderRequest, TradeInfo};
use crate::broker::distinguishes_close_today;
use crate::sim::config::SimulatorConfig;

/// One side of a simulated position.
#[derive(Debug, Clone)]
pub struct SimPosition {
    pub symbol: String,
    pub exchange: String,
    pub direction: Direction,
    pub volume: u32,
    pub today_volume: u32,
    pub yesterday_volume: u32,
    pub avg_price: f64,
    pub total_cost: f64,
    pub total_volume_traded: f64,
    pub margin: f64,
    pub unrealized_pnl: f64,
}

impl SimPosition {
    fn new(symbol: &str, exchange: &str, direction: Direction) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            direction,
            volume: 0,
            today_volume: 0,
            yesterday_volume: 0,
            avg_price: 0.0,
            total_cost: 0.0,
            total_volume_traded: 0.0,
            margin: 0.0,
            unrealized_pnl: 0.0,
        }
    }
}

/// Simulated trading account. `recompute` keeps the derived fields
/// consistent: balance = initial + close_profit - commission,
/// available = balance - margin - commission.
#[derive(Debug, Clone)]
pub struct SimAccount {
    pub initial_balance: f64,
    pub balance: f64,
    pub available: f64,
    pub margin: f64,
    pub commission: f64,
    pub close_profit: f64,
    pub daily_pnl: f64,
}

impl SimAccount {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            available: initial_balance,
            margin: 0.0,
            commission: 0.0,
            close_profit: 0.0,
            daily_pnl: 0.0,
        }
    }
}

pub type PositionBook = HashMap<String, SimPosition>;

pub fn position_key(symbol: &str, direction: Direction) -> String {
    match direction {
        Direction::Buy => format!("{symbol}_LONG"),
        Direction::Sell => format!("{symbol}_SHORT"),
    }
}

/// Auto-set the offset for callers that left it at `Open`: when the
/// opposite side holds volume, the order becomes a close. On today-aware
/// exchanges the flag is CloseToday when the quantity fits today's
/// bucket, CloseYesterday when it fits yesterday's, and the generic
/// Close (today drained first at fill time) for mixed quantities.
/// Explicit close flags pass through untouched.
pub fn derive_offset_for(positions: &PositionBook, request: &OrderRequest) -> OffsetFlag {
    if request.offset != OffsetFlag::Open {
        return request.offset;
    }
    let opp_key = position_key(&request.symbol, request.direction.opposite());
    let Some(opp) = positions.get(&opp_key) else {
        return OffsetFlag::Open;
    };
    if opp.volume == 0 {
        return OffsetFlag::Open;
    }
    if distinguishes_close_today(&request.exchange) {
        if request.volume <= opp.today_volume {
            OffsetFlag::CloseToday
        } else if request.volume <= opp.yesterday_volume {
            OffsetFlag::CloseYesterday
        } else {
            OffsetFlag::Close
        }
    } else {
        OffsetFlag::Close
    }
}

/// Pre-trade risk check. Returns the rejection reason on failure.
pub fn check_risk(
    positions: &PositionBook,
    account: &SimAccount,
    request: &OrderRequest,
    config: &SimulatorConfig,
) -> Result<(), String> {
    match request.offset {
        OffsetFlag::Open => {
            let key = position_key(&request.symbol, request.direction);
            let current = positions.get(&key).map(|p| p.volume).unwrap_or(0);
            if current + request.volume > config.risk.max_position_per_symbol {
                return Err(format!(
                    "Exceeds max position per symbol: {}",
                    config.risk.max_position_per_symbol
                ));
            }
            let margin = request.price * request.volume as f64 * config.account.margin_rate;
            let commission =
                request.price * request.volume as f64 * config.account.commission_rate;
            if account.available < margin + commission {
                return Err(format!(
                    "Insufficient funds. Required: {:.2}, Available: {:.2}",
                    margin + commission,
                    account.available
                ));
            }
        }
        close => {
            let opp_key = position_key(&request.symbol, request.direction.opposite());
            let opp = positions.get(&opp_key);
            let (held, what) = match close {
                OffsetFlag::CloseToday => {
                    (opp.map(|p| p.today_volume).unwrap_or(0), "insufficient today position")
                }
                OffsetFlag::CloseYesterday => (
                    opp.map(|p| p.yesterday_volume).unwrap_or(0),
                    "insufficient yesterday position",
                ),
                _ => (opp.map(|p| p.volume).unwrap_or(0), "insufficient position"),
            };
            if held < request.volume {
                return Err(format!("{what}: have {held}, closing {}", request.volume));
            }
        }
    }

    if account.daily_pnl < -config.risk.max_daily_loss {
        return Err(format!(
            "Exceeds max daily loss: {}",
            config.risk.max_daily_loss
        ));
    }
    Ok(())
}

/// Book one fill into the position table and account P&L.
///
/// Caller holds the positions lock, then the account lock, for the whole
/// call (positions before account, always).
pub fn apply_trade(
    positions: &mut PositionBook,
    account: &mut SimAccount,
    trade: &TradeInfo,
    margin_rate: f64,
) {
    let qty = trade.volume;
    let price = trade.price;

    if trade.offset == OffsetFlag::Open {
        let key = position_key(&trade.symbol, trade.direction);
        let pos = positions
            .entry(key)
            .or_insert_with(|| SimPosition::new(&trade.symbol, &trade.exchange, trade.direction));

        let old_cost = pos.avg_price * pos.volume as f64;
        pos.total_cost = old_cost + price * qty as f64;
        pos.volume += qty;
        pos.today_volume += qty;
        pos.total_volume_traded += qty as f64;
        pos.avg_price = pos.total_cost / pos.total_volume_traded;
        pos.margin = price * pos.volume as f64 * margin_rate;

        tracing::debug!(
            "sim: open {:?} {} x{} @ {} avg={} volume={}",
            trade.direction,
            trade.symbol,
            qty,
            price,
            pos.avg_price,
            pos.volume
        );
        return;
    }

    // Close: the position being reduced sits on the opposite side.
    let close_direction = trade.direction.opposite();
    let key = position_key(&trade.symbol, close_direction);
    let Some(pos) = positions.get_mut(&key) else {
        tracing::warn!("sim: close with no position: {} {:?}", trade.symbol, close_direction);
        return;
    };
    if pos.volume == 0 {
        tracing::warn!("sim: close with zero position: {} {:?}", trade.symbol, close_direction);
        return;
    }

    let (closed, close_today, close_yesterday) = match trade.offset {
        OffsetFlag::CloseToday => {
            let c = qty.min(pos.today_volume);
            (c, c, 0)
        }
        OffsetFlag::CloseYesterday => {
            let c = qty.min(pos.yesterday_volume);
            (c, 0, c)
        }
        _ => {
            // Generic close drains today before overnight.
            let c = qty.min(pos.volume);
            let today = c.min(pos.today_volume);
            (c, today, c - today)
        }
    };

    let pnl = match close_direction {
        Direction::Buy => (price - pos.avg_price) * closed as f64,
        Direction::Sell => (pos.avg_price - price) * closed as f64,
    };
    account.close_profit += pnl;
    account.daily_pnl += pnl;

    // Saturating keeps the buckets non-negative even if a caller fed the
    // table an inconsistent split.
    pos.volume = pos.volume.saturating_sub(closed);
    pos.today_volume = pos.today_volume.saturating_sub(close_today);
    pos.yesterday_volume = pos.yesterday_volume.saturating_sub(close_yesterday);

    tracing::debug!(
        "sim: close {:?} {} x{} @ {} pnl={} remaining={}",
        close_direction,
        trade.symbol,
        closed,
        price,
        pnl,
        pos.volume
    );

    if pos.volume == 0 {
        positions.remove(&key);
    } else {
        pos.margin = price * pos.volume as f64 * margin_rate;
    }
}

/// Recompute the account's derived fields from the position table.
pub fn recompute_account(positions: &PositionBook, account: &mut SimAccount) {
    account.margin = positions.values().map(|p| p.margin).sum();
    account.balance = account.initial_balance + account.close_profit - account.commission;
    account.available = account.balance - account.margin - account.commission;
}

/// Daily settlement: today's volume becomes yesterday's. The counter
/// performs this at the session boundary.
pub fn roll_day(positions: &mut PositionBook) {
    for pos in positions.values_mut() {
        pos.yesterday_volume += pos.today_volume;
        pos.today_volume = 0;
    }
}
