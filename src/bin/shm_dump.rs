//! shm-dump - print records arriving on the request/response queues
//!
//! Attaches read-only cursors to the live rings (each reader carries its
//! own tail, so the gateway's consumer is unaffected) and prints every
//! record published after the attach. History is skipped by design.

use clap::Parser;

use counter_bridge::core::ShmConfig;
use counter_bridge::shm::MwmrQueue;
use counter_bridge::wire::{self, RequestMsg, ResponseMsg};

#[derive(Parser)]
#[command(name = "shm-dump", about = "Dump order traffic on the MWMR queues")]
struct Args {
    /// Skip the request queue
    #[arg(long)]
    no_requests: bool,

    /// Skip the response queue
    #[arg(long)]
    no_responses: bool,

    /// Exit after this many records
    #[arg(long)]
    count: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    wire::verify_layout()?;

    let shm_cfg = ShmConfig::default();
    let mut req_queue = if args.no_requests {
        None
    } else {
        Some(MwmrQueue::<RequestMsg>::open(shm_cfg.request_key, shm_cfg.request_size)?)
    };
    let mut resp_queue = if args.no_responses {
        None
    } else {
        Some(MwmrQueue::<ResponseMsg>::open(shm_cfg.response_key, shm_cfg.response_size)?)
    };
    println!("attached; waiting for records (Ctrl+C to stop)...");

    let mut seen = 0u64;
    loop {
        let mut idle = true;

        if let Some(q) = req_queue.as_mut() {
            while let Some(req) = q.dequeue() {
                idle = false;
                seen += 1;
                println!(
                    "REQ  OID={} strat={} {} {} x{} @ {} type={} exch={} pos_dir={}",
                    req.order_id,
                    req.strategy_id,
                    req.symbol(),
                    req.transaction_type as char,
                    req.quantity,
                    req.price,
                    req.request_type,
                    req.exchange_type,
                    req.pos_direction,
                );
            }
        }
        if let Some(q) = resp_queue.as_mut() {
            while let Some(resp) = q.dequeue() {
                idle = false;
                seen += 1;
                println!(
                    "RESP OID={} strat={} {} type={:?} qty={} price={} err={} oc={}",
                    resp.order_id,
                    resp.strategy_id,
                    resp.symbol(),
                    resp.response_type(),
                    resp.quantity,
                    resp.price,
                    resp.error_code,
                    resp.open_close,
                );
            }
        }

        if let Some(limit) = args.count {
            if seen >= limit {
                return Ok(());
            }
        }
        if idle {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}
