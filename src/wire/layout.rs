//! Layout verification against the legacy ABI
//!
//! The expected numbers below are the contract (GCC x86-64, System V
//! ABI); `offset_of!`/`size_of` are what this build actually produced.
//! Everything is checked twice: at compile time via `const` assertions,
//! and again at process startup so a misbuilt binary refuses to touch
//! the shared segments.

use std::mem::{align_of, offset_of, size_of};

use crate::core::{Error, Result};
use crate::shm::QueueElem;
use crate::wire::market::{BookElement, MarketUpdate};
use crate::wire::request::{ContractDescription, RequestMsg};
use crate::wire::response::ResponseMsg;

macro_rules! offset_checks {
    ($ty:ty { $( $field:ident : $expected:expr ),+ $(,)? }) => {
        // Compile-time: a wrong layout does not build.
        const _: () = { $( assert!(offset_of!($ty, $field) == $expected); )+ };

        impl LayoutChecked for $ty {
            fn field_checks() -> Vec<(&'static str, usize, usize)> {
                vec![ $(
                    (
                        concat!(stringify!($ty), ".", stringify!($field)),
                        $expected,
                        offset_of!($ty, $field),
                    ),
                )+ ]
            }
        }
    };
}

trait LayoutChecked {
    fn field_checks() -> Vec<(&'static str, usize, usize)>;
}

offset_checks!(ContractDescription {
    instrument_name: 0,
    symbol: 32,
    expiry_date: 84,
    strike_price: 88,
    option_type: 92,
    ca_level: 94,
});

offset_checks!(RequestMsg {
    contract: 0,
    request_type: 96,
    ord_type: 100,
    duration: 104,
    px_type: 108,
    pos_direction: 112,
    order_id: 116,
    token: 120,
    quantity: 124,
    quantity_filled: 128,
    disclosed_qty: 132,
    price: 136,
    timestamp: 144,
    account_id: 152,
    transaction_type: 163,
    exchange_type: 164,
    padding: 165,
    product: 185,
    strategy_id: 220,
});

offset_checks!(ResponseMsg {
    response_type: 0,
    child_response: 4,
    order_id: 8,
    error_code: 12,
    quantity: 16,
    price: 24,
    timestamp: 32,
    side: 40,
    symbol: 41,
    account_id: 91,
    exchange_order_id: 104,
    exchange_trade_id: 112,
    open_close: 133,
    exchange_id: 134,
    product: 135,
    strategy_id: 168,
});

offset_checks!(MarketUpdate {
    exch_ts: 0,
    timestamp: 8,
    seqnum: 16,
    rptseqnum: 24,
    token_id: 32,
    symbol: 40,
    symbol_id: 88,
    exchange_name: 90,
    new_price: 96,
    old_price: 104,
    last_traded_price: 112,
    last_traded_time: 120,
    total_traded_value: 128,
    total_traded_quantity: 136,
    yield_value: 144,
    bid_updates: 152,
    ask_updates: 472,
    new_quant: 792,
    old_quant: 796,
    last_traded_quantity: 800,
    valid_bids: 804,
    valid_asks: 805,
    update_level: 806,
    end_pkt: 807,
    side: 808,
    update_type: 809,
    feed_type: 810,
});

// Sizes, alignment and queue-slot strides. The aligned(64) request record
// pads its ring slot from 264 to 320 bytes; every peer must agree.
const _: () = assert!(size_of::<ContractDescription>() == 96);
const _: () = assert!(size_of::<RequestMsg>() == 256 && align_of::<RequestMsg>() == 64);
const _: () = assert!(size_of::<ResponseMsg>() == 176);
const _: () = assert!(size_of::<BookElement>() == 16);
const _: () = assert!(size_of::<MarketUpdate>() == 816);
const _: () = assert!(size_of::<QueueElem<RequestMsg>>() == 320);
const _: () = assert!(size_of::<QueueElem<ResponseMsg>>() == 184);
const _: () = assert!(size_of::<QueueElem<MarketUpdate>>() == 824);

fn size_checks() -> Vec<(&'static str, usize, usize)> {
    vec![
        ("sizeof(ContractDescription)", 96, size_of::<ContractDescription>()),
        ("sizeof(RequestMsg)", 256, size_of::<RequestMsg>()),
        ("alignof(RequestMsg)", 64, align_of::<RequestMsg>()),
        ("sizeof(ResponseMsg)", 176, size_of::<ResponseMsg>()),
        ("sizeof(BookElement)", 16, size_of::<BookElement>()),
        ("sizeof(MarketUpdate)", 816, size_of::<MarketUpdate>()),
        ("sizeof(QueueElem<RequestMsg>)", 320, size_of::<QueueElem<RequestMsg>>()),
        ("sizeof(QueueElem<ResponseMsg>)", 184, size_of::<QueueElem<ResponseMsg>>()),
        ("sizeof(QueueElem<MarketUpdate>)", 824, size_of::<QueueElem<MarketUpdate>>()),
    ]
}

/// Startup self-check of every size and field offset. Any mismatch is a
/// fatal error: the process must not attach to the shared segments.
pub fn verify_layout() -> Result<()> {
    let mut checks = size_checks();
    checks.extend(ContractDescription::field_checks());
    checks.extend(RequestMsg::field_checks());
    checks.extend(ResponseMsg::field_checks());
    checks.extend(MarketUpdate::field_checks());

    let mut bad = 0;
    for (name, expected, actual) in &checks {
        if expected != actual {
            tracing::error!("layout: {} = {} (expected {})", name, actual, expected);
            bad += 1;
        }
    }
    if bad > 0 {
        return Err(Error::Layout(format!(
            "{bad} layout mismatches against the legacy ABI"
        )));
    }
    tracing::info!("layout: {} size/offset checks passed", checks.len());
    Ok(())
}
