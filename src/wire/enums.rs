//! Legacy enum discriminants carried inside the wire records
//!
//! The numeric values are the contract; the Rust enums exist so the rest
//! of the crate never touches a bare integer. Records carrying values
//! outside the enumerated sets are rejected at the bridge boundary.

// Exchange bytes in RequestMsg.exchange_type
pub const CHINA_SHFE: u8 = 57;
pub const CHINA_CFFEX: u8 = 58;
pub const CHINA_ZCE: u8 = 59;
pub const CHINA_DCE: u8 = 60;
pub const CHINA_GFEX: u8 = 61;

// Transaction_Type bytes
pub const SIDE_BUY: u8 = b'B';
pub const SIDE_SELL: u8 = b'S';

/// Map the wire exchange byte to the counter-facing exchange name.
/// Unknown bytes default to SHFE, matching the legacy gateway.
pub fn exchange_name(byte: u8) -> &'static str {
    match byte {
        CHINA_SHFE => "SHFE",
        CHINA_CFFEX => "CFFEX",
        CHINA_ZCE => "CZCE",
        CHINA_DCE => "DCE",
        CHINA_GFEX => "GFEX",
        _ => "SHFE",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RequestType {
    NewOrder = 0,
    ModifyOrder = 1,
    CancelOrder = 2,
    OrderStatus = 3,
    SessionMsg = 4,
    Heartbeat = 5,
    OptExec = 6,
    OptExecCancel = 7,
}

impl TryFrom<i32> for RequestType {
    type Error = i32;

    fn try_from(v: i32) -> Result<Self, i32> {
        Ok(match v {
            0 => Self::NewOrder,
            1 => Self::ModifyOrder,
            2 => Self::CancelOrder,
            3 => Self::OrderStatus,
            4 => Self::SessionMsg,
            5 => Self::Heartbeat,
            6 => Self::OptExec,
            7 => Self::OptExecCancel,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResponseType {
    NewOrderConfirm = 0,
    NewOrderFreeze = 1,
    ModifyOrderConfirm = 2,
    CancelOrderConfirm = 3,
    TradeConfirm = 4,
    OrderError = 5,
    ModifyOrderReject = 6,
    CancelOrderReject = 7,
    OrsReject = 8,
    RmsReject = 9,
    SimReject = 10,
    BusinessReject = 11,
    ModifyOrderPending = 12,
    CancelOrderPending = 13,
    OrdersPerDayLimitReject = 14,
    OrdersPerDayLimitWarning = 15,
    OrderExpired = 16,
    StopLossWarning = 17,
    NullResponse = 18,
}

impl TryFrom<i32> for ResponseType {
    type Error = i32;

    fn try_from(v: i32) -> Result<Self, i32> {
        Ok(match v {
            0 => Self::NewOrderConfirm,
            1 => Self::NewOrderFreeze,
            2 => Self::ModifyOrderConfirm,
            3 => Self::CancelOrderConfirm,
            4 => Self::TradeConfirm,
            5 => Self::OrderError,
            6 => Self::ModifyOrderReject,
            7 => Self::CancelOrderReject,
            8 => Self::OrsReject,
            9 => Self::RmsReject,
            10 => Self::SimReject,
            11 => Self::BusinessReject,
            12 => Self::ModifyOrderPending,
            13 => Self::CancelOrderPending,
            14 => Self::OrdersPerDayLimitReject,
            15 => Self::OrdersPerDayLimitWarning,
            16 => Self::OrderExpired,
            17 => Self::StopLossWarning,
            18 => Self::NullResponse,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SubResponseType {
    NullResponseMiddle = 0,
    OrderRejectMiddle = 1,
    ModifyRejectMiddle = 2,
    CancelOrderRejectMiddle = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OrderType {
    Limit = 1,
    Market = 2,
    WeightAvg = 3,
    CondLimit = 4,
    BestPrice = 5,
}

impl TryFrom<i32> for OrderType {
    type Error = i32;

    fn try_from(v: i32) -> Result<Self, i32> {
        Ok(match v {
            1 => Self::Limit,
            2 => Self::Market,
            3 => Self::WeightAvg,
            4 => Self::CondLimit,
            5 => Self::BestPrice,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OrderDuration {
    Day = 0,
    Ioc = 1,
    Fok = 2,
    Counter = 3,
    Fak = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PxType {
    Percentage = 1,
    PerUnit = 2,
    Yield = 9,
}

/// Advisory position direction in the request; the bridge always
/// overrides it from the live ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PositionDirection {
    Open = 10,
    Close = 11,
    CloseIntraday = 12,
    Error = 13,
}

/// Open/close marker in the response record (one byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum OpenCloseType {
    Null = 0,
    Open = 1,
    Close = 2,
    CloseToday = 3,
}

/// Exchange id in the response record (one byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum TsExchangeId {
    Null = 0,
    Shfe = 1,
    Ine = 2,
    Czce = 3,
    Dce = 4,
    Cffex = 5,
    Gfex = 6,
}

impl TsExchangeId {
    /// Response-side exchange id for a counter-facing exchange name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "SHFE" => Self::Shfe,
            "INE" => Self::Ine,
            "CZCE" | "ZCE" => Self::Czce,
            "DCE" => Self::Dce,
            "CFFEX" => Self::Cffex,
            "GFEX" => Self::Gfex,
            _ => Self::Null,
        }
    }
}
