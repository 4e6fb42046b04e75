//! Broker plugin contract - the uniform seam every counter adapter exposes
//!
//! Types here are counter-neutral: no wire records, no SHM. The bridge
//! translates wire requests into `OrderRequest` and plugin callbacks back
//! into wire responses. Callbacks fire on the plugin's own threads, exactly
//! once per status transition, ending at a terminal state; a plugin may
//! skip intermediate `Accepted` when the first observable state is already
//! `Filled`.

use crate::core::Result;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Wire side byte ('B'/'S').
    pub fn to_side_byte(self) -> u8 {
        match self {
            Self::Buy => b'B',
            Self::Sell => b'S',
        }
    }

    pub fn from_side_byte(b: u8) -> Option<Self> {
        match b {
            b'B' => Some(Self::Buy),
            b'S' => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Chinese-futures open/close flag. SHFE and INE are the only exchanges
/// that distinguish close-today from close-yesterday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetFlag {
    Open,
    Close,
    CloseToday,
    CloseYesterday,
}

impl OffsetFlag {
    pub fn is_close(self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// True for exchanges that require the today/yesterday distinction in
/// close orders.
pub fn distinguishes_close_today(exchange: &str) -> bool {
    matches!(exchange, "SHFE" | "INE")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceKind {
    Limit,
    Market,
    Best,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Unknown,
    Submitting,
    Submitted,
    Accepted,
    PartialFilled,
    Filled,
    Canceling,
    Canceled,
    Rejected,
    Error,
}

impl OrderStatus {
    /// Terminal states end the order's callback stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Submitting => "Submitting",
            Self::Submitted => "Submitted",
            Self::Accepted => "Accepted",
            Self::PartialFilled => "Partial Filled",
            Self::Filled => "Filled",
            Self::Canceling => "Canceling",
            Self::Canceled => "Canceled",
            Self::Rejected => "Rejected",
            Self::Error => "Error",
        }
    }
}

/// Counter-neutral order request.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub exchange: String,
    pub direction: Direction,
    pub offset: OffsetFlag,
    pub price_kind: PriceKind,
    pub price: f64,
    pub volume: u32,
    /// Caller-side tracking id; the bridge puts the decimal wire OrderID here.
    pub client_order_id: String,
}

/// Order state as reported by a counter.
#[derive(Debug, Clone)]
pub struct OrderInfo {
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub exchange: String,
    pub direction: Direction,
    pub offset: OffsetFlag,
    pub price_kind: PriceKind,
    pub price: f64,
    pub volume: u32,
    pub traded_volume: u32,
    pub status: OrderStatus,
    pub insert_time: i64,
    pub update_time: i64,
    pub status_msg: String,
}

/// One fill.
#[derive(Debug, Clone)]
pub struct TradeInfo {
    pub trade_id: String,
    pub order_id: String,
    pub symbol: String,
    pub exchange: String,
    pub direction: Direction,
    pub offset: OffsetFlag,
    pub price: f64,
    pub volume: u32,
    pub trade_time: i64,
}

/// One side of a position as reported by a counter.
#[derive(Debug, Clone)]
pub struct PositionInfo {
    pub symbol: String,
    pub exchange: String,
    pub direction: Direction,
    pub volume: u32,
    pub today_volume: u32,
    pub yesterday_volume: u32,
    pub avg_price: f64,
    pub position_profit: f64,
    pub margin: f64,
}

/// Trading account snapshot.
#[derive(Debug, Clone, Default)]
pub struct AccountInfo {
    pub account_id: String,
    pub balance: f64,
    pub available: f64,
    pub margin: f64,
    pub frozen_margin: f64,
    pub commission: f64,
    pub close_profit: f64,
    pub position_profit: f64,
}

pub type OrderCallback = Box<dyn Fn(&OrderInfo) + Send + Sync>;
pub type TradeCallback = Box<dyn Fn(&TradeInfo) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(i32, &str) + Send + Sync>;

/// The capability set every counter adapter implements.
pub trait TdPlugin: Send + Sync {
    /// Load configuration and prepare transport. Must not connect.
    fn initialize(&self, config_path: &str) -> Result<()>;

    /// Connect and authenticate. May block up to 30 seconds; returns when
    /// the plugin is ready to accept orders.
    fn login(&self) -> Result<()>;

    /// Disconnect cleanly. Idempotent.
    fn logout(&self);

    fn is_connected(&self) -> bool;
    fn is_logged_in(&self) -> bool;

    /// Submit an order. Returns the counter's opaque order id; the id may
    /// denote an already-rejected order (CTP assigns ids to rejects too).
    /// A synchronous failure returns `Err` and produces no callbacks.
    fn send_order(&self, request: &OrderRequest) -> Result<String>;

    /// Request cancellation. True when the cancel was applied.
    fn cancel_order(&self, order_id: &str) -> bool;

    // Synchronous queries; may block until the counter responds.
    fn query_account(&self) -> Result<AccountInfo>;
    fn query_positions(&self) -> Result<Vec<PositionInfo>>;
    fn query_orders(&self) -> Result<Vec<OrderInfo>>;
    fn query_trades(&self) -> Result<Vec<TradeInfo>>;

    /// Cache lookup only; never hits the counter.
    fn get_order(&self, order_id: &str) -> Option<OrderInfo>;

    fn register_order_callback(&self, callback: OrderCallback);
    fn register_trade_callback(&self, callback: TradeCallback);
    fn register_error_callback(&self, callback: ErrorCallback);

    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn available_fund(&self) -> f64;
    fn order_count(&self) -> u64;
    fn trade_count(&self) -> u64;
}
