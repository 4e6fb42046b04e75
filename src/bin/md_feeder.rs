//! md-feeder - synthetic market-data publisher
//!
//! Creates the market-data MWMR queue and pushes random-walk ticks for
//! the configured symbols at a fixed rate. Stands in for the vendor feed
//! during development; the strategy side reads the same queue either way.

use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;

use counter_bridge::core::ShmConfig;
use counter_bridge::shm::MwmrQueue;
use counter_bridge::wire::{
    self, market, BookElement, MarketUpdate, CHINA_CFFEX, CHINA_DCE, CHINA_GFEX, CHINA_SHFE,
    CHINA_ZCE, INTEREST_LEVELS,
};

#[derive(Parser)]
#[command(
    name = "md-feeder",
    about = "Synthetic MarketUpdate publisher onto the SysV MWMR market-data queue"
)]
struct Args {
    /// Symbols to publish, e.g. ag2506 cu2507
    #[arg(required = true)]
    symbols: Vec<String>,

    /// Updates per second per symbol
    #[arg(long, default_value_t = 2.0)]
    rate: f64,

    /// Stop after this many updates in total (default: run forever)
    #[arg(long)]
    count: Option<u64>,

    /// Starting mid price for the random walk
    #[arg(long, default_value_t = 5000.0)]
    base_price: f64,
}

/// Exchange byte from the product prefix. Good enough for synthetic data;
/// real deployments carry the exchange in the instrument config.
fn guess_exchange(symbol: &str) -> u8 {
    let product: String = symbol.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    match product.as_str() {
        "IF" | "IH" | "IC" | "IM" | "T" | "TF" | "TS" | "TL" => CHINA_CFFEX,
        "m" | "y" | "a" | "b" | "p" | "c" | "cs" | "l" | "v" | "pp" | "j" | "jm" | "jd" | "i"
        | "eg" | "eb" | "pg" | "rr" | "lh" => CHINA_DCE,
        "MA" | "TA" | "SR" | "CF" | "FG" | "SA" | "RM" | "OI" | "AP" | "UR" | "PF" | "SF"
        | "SM" | "PK" => CHINA_ZCE,
        "si" | "lc" | "ps" => CHINA_GFEX,
        _ => CHINA_SHFE,
    }
}

struct SymbolWalk {
    symbol: String,
    exchange: u8,
    mid: f64,
}

fn now_nanos() -> u64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64
}

fn make_update(walk: &mut SymbolWalk, seqnum: u64, rng: &mut impl Rng) -> MarketUpdate {
    // One-tick random walk, floored away from zero.
    walk.mid += rng.gen_range(-1i32..=1) as f64;
    if walk.mid < 10.0 {
        walk.mid = 10.0;
    }

    let mut md = MarketUpdate::zeroed();
    md.exch_ts = now_nanos();
    md.timestamp = md.exch_ts;
    md.seqnum = seqnum;
    md.rptseqnum = seqnum;
    md.set_symbol(&walk.symbol);
    md.exchange_name = walk.exchange;

    let levels = 5usize;
    for i in 0..levels {
        md.bid_updates[i] = BookElement {
            quantity: rng.gen_range(1..200),
            order_count: rng.gen_range(1..20),
            price: walk.mid - 1.0 - i as f64,
        };
        md.ask_updates[i] = BookElement {
            quantity: rng.gen_range(1..200),
            order_count: rng.gen_range(1..20),
            price: walk.mid + 1.0 + i as f64,
        };
    }
    md.valid_bids = levels as i8;
    md.valid_asks = levels as i8;

    md.last_traded_price = walk.mid;
    md.last_traded_quantity = rng.gen_range(1..50);
    md.last_traded_time = md.exch_ts;
    md.new_price = walk.mid;
    md.new_quant = md.last_traded_quantity;
    md.total_traded_quantity += md.last_traded_quantity as i64;
    md.end_pkt = 1;
    md.side = market::MD_SIDE_NONE;
    md.update_type = market::MDUPD_TRADE_INFO;
    md.feed_type = market::FEED_SNAPSHOT;
    md
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    wire::verify_layout()?;

    let shm_cfg = ShmConfig::default();
    let queue = MwmrQueue::<MarketUpdate>::create(shm_cfg.md_key, shm_cfg.md_size)?;
    tracing::info!(
        "md-feeder: queue ready key=0x{:x} capacity={} ({} levels per side on the wire)",
        shm_cfg.md_key,
        shm_cfg.md_size,
        INTEREST_LEVELS
    );

    let mut walks: Vec<SymbolWalk> = args
        .symbols
        .iter()
        .map(|s| SymbolWalk {
            symbol: s.clone(),
            exchange: guess_exchange(s),
            mid: args.base_price,
        })
        .collect();

    let interval = Duration::from_secs_f64(1.0 / args.rate.max(0.001));
    let mut rng = rand::thread_rng();
    let mut seqnum = 0u64;
    let mut published = 0u64;
    let started = Instant::now();

    loop {
        for walk in &mut walks {
            seqnum += 1;
            let md = make_update(walk, seqnum, &mut rng);
            queue.enqueue(&md);
            published += 1;

            if published % 1000 == 0 {
                let rate = published as f64 / started.elapsed().as_secs_f64();
                tracing::info!("md-feeder: published {} updates ({:.1}/s)", published, rate);
            }
            if let Some(limit) = args.count {
                if published >= limit {
                    tracing::info!("md-feeder: done, {} updates", published);
                    return Ok(());
                }
            }
        }
        std::thread::sleep(interval);
    }
}
