//! The 256-byte order request record (64-byte aligned)

use crate::wire::enums::{OrderType, PositionDirection, RequestType, SIDE_BUY, SIDE_SELL};
use crate::wire::{fixed_to_string, put_fixed, MAX_INSTRNAME_SIZE, MAX_SYMBOL_SIZE};

/// Instrument description nested at the front of every request. 96 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContractDescription {
    pub instrument_name: [u8; MAX_INSTRNAME_SIZE], // offset 0
    pub symbol: [u8; MAX_SYMBOL_SIZE],             // offset 32
    pub(crate) _pad0: [u8; 2],                     // offset 82
    pub expiry_date: i32,                          // offset 84
    pub strike_price: i32,                         // offset 88
    pub option_type: [u8; 2],                      // offset 92
    pub ca_level: i16,                             // offset 94
}

const _: () = assert!(std::mem::size_of::<ContractDescription>() == 96);

impl ContractDescription {
    pub fn symbol_str(&self) -> String {
        fixed_to_string(&self.symbol)
    }
}

/// Order request as written by the strategy processes. 256 bytes,
/// alignment 64; every pad field must be zero on produce.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequestMsg {
    pub contract: ContractDescription, // offset 0
    pub request_type: i32,             // offset 96
    pub ord_type: i32,                 // offset 100
    pub duration: i32,                 // offset 104
    pub px_type: i32,                  // offset 108
    pub pos_direction: i32,            // offset 112, advisory
    pub order_id: u32,                 // offset 116
    pub token: i32,                    // offset 120, reserved
    pub quantity: i32,                 // offset 124
    pub quantity_filled: i32,          // offset 128
    pub disclosed_qty: i32,            // offset 132, 0 = fully disclosed
    pub price: f64,                    // offset 136
    pub timestamp: u64,                // offset 144, nanos since epoch
    pub account_id: [u8; 11],          // offset 152
    pub transaction_type: u8,          // offset 163, 'B' or 'S'
    pub exchange_type: u8,             // offset 164
    pub padding: [u8; 20],             // offset 165
    pub product: [u8; 32],             // offset 185
    pub(crate) _pad0: [u8; 3],         // offset 217
    pub strategy_id: i32,              // offset 220
    pub(crate) _pad1: [u8; 32],        // offset 224, tail pad to 256
}

const _: () = assert!(std::mem::size_of::<RequestMsg>() == 256);
const _: () = assert!(std::mem::align_of::<RequestMsg>() == 64);

impl RequestMsg {
    /// All-zero record; every builder starts here so pads stay zeroed.
    pub fn zeroed() -> Self {
        // Safe: the record is plain integer/float data with no invalid
        // bit patterns.
        unsafe { std::mem::zeroed() }
    }

    /// Build a new-order request the way the strategy side does.
    #[allow(clippy::too_many_arguments)]
    pub fn new_order(
        symbol: &str,
        exchange_byte: u8,
        side: u8,
        quantity: i32,
        price: f64,
        order_id: u32,
        strategy_id: i32,
    ) -> Self {
        debug_assert!(side == SIDE_BUY || side == SIDE_SELL);
        let mut msg = Self::zeroed();
        put_fixed(&mut msg.contract.symbol, symbol);
        msg.request_type = RequestType::NewOrder as i32;
        msg.ord_type = OrderType::Limit as i32;
        msg.pos_direction = PositionDirection::Open as i32;
        msg.order_id = order_id;
        msg.quantity = quantity;
        msg.price = price;
        msg.transaction_type = side;
        msg.exchange_type = exchange_byte;
        msg.strategy_id = strategy_id;
        msg
    }

    pub fn symbol(&self) -> String {
        self.contract.symbol_str()
    }

    pub fn set_symbol(&mut self, symbol: &str) {
        put_fixed(&mut self.contract.symbol, symbol);
    }

    pub fn request_type(&self) -> Option<RequestType> {
        RequestType::try_from(self.request_type).ok()
    }

    pub fn is_buy(&self) -> bool {
        self.transaction_type == SIDE_BUY
    }

    /// Raw view for memcpy serialisation.
    pub fn as_bytes(&self) -> &[u8; 256] {
        unsafe { &*(self as *const Self as *const [u8; 256]) }
    }

    pub fn from_bytes(buf: &[u8; 256]) -> Self {
        unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }
}

impl Default for RequestMsg {
    fn default() -> Self {
        Self::zeroed()
    }
}
