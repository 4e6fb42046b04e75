//! The 176-byte order response record

use crate::wire::enums::{OpenCloseType, ResponseType, TsExchangeId};
use crate::wire::{fixed_to_string, put_fixed, MAX_SYMBOL_SIZE, MAX_TRADE_ID_SIZE};

/// Response as read by the strategy processes. The meaning of `quantity`
/// depends on `response_type`: traded volume on trade confirms, unfilled
/// remainder on cancels, ordered quantity on errors, zero on new-order
/// confirms.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResponseMsg {
    pub response_type: i32,                        // offset 0
    pub child_response: i32,                       // offset 4
    pub order_id: u32,                             // offset 8
    pub error_code: u32,                           // offset 12
    pub quantity: i32,                             // offset 16
    pub(crate) _pad0: [u8; 4],                     // offset 20
    pub price: f64,                                // offset 24, trade price
    pub timestamp: u64,                            // offset 32
    pub side: u8,                                  // offset 40, 'B' or 'S'
    pub symbol: [u8; MAX_SYMBOL_SIZE],             // offset 41
    pub account_id: [u8; 11],                      // offset 91
    pub(crate) _pad1: [u8; 2],                     // offset 102
    pub exchange_order_id: f64,                    // offset 104, opaque, ABI compat
    pub exchange_trade_id: [u8; MAX_TRADE_ID_SIZE], // offset 112
    pub open_close: i8,                            // offset 133
    pub exchange_id: i8,                           // offset 134
    pub product: [u8; 32],                         // offset 135
    pub(crate) _pad2: [u8; 1],                     // offset 167
    pub strategy_id: i32,                          // offset 168
    pub(crate) _pad3: [u8; 4],                     // offset 172, tail pad
}

const _: () = assert!(std::mem::size_of::<ResponseMsg>() == 176);

impl ResponseMsg {
    pub fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }

    pub fn response_type(&self) -> Option<ResponseType> {
        ResponseType::try_from(self.response_type).ok()
    }

    pub fn symbol(&self) -> String {
        fixed_to_string(&self.symbol)
    }

    pub fn set_symbol(&mut self, symbol: &str) {
        put_fixed(&mut self.symbol, symbol);
    }

    pub fn set_exchange_trade_id(&mut self, trade_id: &str) {
        put_fixed(&mut self.exchange_trade_id, trade_id);
    }

    pub fn set_open_close(&mut self, oc: OpenCloseType) {
        self.open_close = oc as i8;
    }

    pub fn set_exchange_id(&mut self, id: TsExchangeId) {
        self.exchange_id = id as i8;
    }

    pub fn as_bytes(&self) -> &[u8; 176] {
        unsafe { &*(self as *const Self as *const [u8; 176]) }
    }

    pub fn from_bytes(buf: &[u8; 176]) -> Self {
        unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }
}

impl Default for ResponseMsg {
    fn default() -> Self {
        Self::zeroed()
    }
}
