//! The 816-byte market-data record: 96-byte header + 720-byte data part
//!
//! The legacy C++ built this from two base classes; the in-memory layout
//! is flat, so the struct here is flat with the same field order.

use crate::wire::{fixed_to_string, put_fixed};

pub const INTEREST_LEVELS: usize = 20;

// Feed type bytes
pub const FEED_TBT: u8 = b'X';
pub const FEED_SNAPSHOT: u8 = b'W';

// Side bytes in market updates
pub const MD_SIDE_BUY: u8 = b'B';
pub const MD_SIDE_SELL: u8 = b'S';
pub const MD_SIDE_NONE: u8 = b'N';

// Update type bytes
pub const MDUPD_ADD: u8 = b'A';
pub const MDUPD_NONE: u8 = b'N';
pub const MDUPD_TRADE_INFO: u8 = b'I';

/// One book level. 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BookElement {
    pub quantity: i32,
    pub order_count: i32,
    pub price: f64,
}

const _: () = assert!(std::mem::size_of::<BookElement>() == 16);

/// Tick update pushed through the market-data MWMR queue.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketUpdate {
    // --- header part (96 bytes) ---
    pub exch_ts: u64,             // offset 0
    pub timestamp: u64,           // offset 8
    pub seqnum: u64,              // offset 16
    pub rptseqnum: u64,           // offset 24
    pub token_id: u64,            // offset 32
    pub symbol: [u8; 48],         // offset 40
    pub symbol_id: u16,           // offset 88
    pub exchange_name: u8,        // offset 90
    pub(crate) _pad0: [u8; 5],    // offset 91

    // --- data part (720 bytes) ---
    pub new_price: f64,                              // offset 96
    pub old_price: f64,                              // offset 104
    pub last_traded_price: f64,                      // offset 112
    pub last_traded_time: u64,                       // offset 120
    pub total_traded_value: f64,                     // offset 128
    pub total_traded_quantity: i64,                  // offset 136
    pub yield_value: f64,                            // offset 144
    pub bid_updates: [BookElement; INTEREST_LEVELS], // offset 152
    pub ask_updates: [BookElement; INTEREST_LEVELS], // offset 472
    pub new_quant: i32,                              // offset 792
    pub old_quant: i32,                              // offset 796
    pub last_traded_quantity: i32,                   // offset 800
    pub valid_bids: i8,                              // offset 804
    pub valid_asks: i8,                              // offset 805
    pub update_level: i8,                            // offset 806
    pub end_pkt: u8,                                 // offset 807
    pub side: u8,                                    // offset 808
    pub update_type: u8,                             // offset 809
    pub feed_type: u8,                               // offset 810
    pub(crate) _pad1: [u8; 5],                       // offset 811
}

const _: () = assert!(std::mem::size_of::<MarketUpdate>() == 816);

impl MarketUpdate {
    pub fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }

    pub fn symbol(&self) -> String {
        fixed_to_string(&self.symbol)
    }

    pub fn set_symbol(&mut self, symbol: &str) {
        put_fixed(&mut self.symbol, symbol);
    }

    pub fn as_bytes(&self) -> &[u8; 816] {
        unsafe { &*(self as *const Self as *const [u8; 816]) }
    }

    pub fn from_bytes(buf: &[u8; 816]) -> Self {
        unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }
}

impl Default for MarketUpdate {
    fn default() -> Self {
        Self::zeroed()
    }
}
