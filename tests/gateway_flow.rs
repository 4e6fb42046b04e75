//! End-to-end gateway scenarios over real SysV queues: a strategy-side
//! handle enqueues wire requests, the bridge drains them on its own
//! thread, dispatches to the matching simulator, and the strategy-side
//! consumer observes the wire responses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use counter_bridge::bridge::Bridge;
use counter_bridge::broker::TdPlugin;
use counter_bridge::ledger::PositionLedger;
use counter_bridge::shm::MwmrQueue;
use counter_bridge::sim::{SimulatorConfig, SimulatorPlugin};
use counter_bridge::wire::{
    RequestMsg, ResponseMsg, ResponseType, CHINA_SHFE, SIDE_BUY, SIDE_SELL,
};

// Integration tests get their own key range.
const KEY_BASE: i32 = 0x7E5400;

struct Gateway {
    bridge: Bridge,
    ledger: Arc<PositionLedger>,
    strategy_req: MwmrQueue<RequestMsg>,
    strategy_resp: MwmrQueue<ResponseMsg>,
    processor: Option<std::thread::JoinHandle<()>>,
}

impl Gateway {
    /// Bring up queues and the drain thread; `with_sim` controls whether a
    /// simulator broker is connected.
    fn start(req_key: i32, resp_key: i32, with_sim: bool) -> Self {
        let mut bridge_req = MwmrQueue::<RequestMsg>::create(req_key, 16).unwrap();
        let bridge_resp = MwmrQueue::<ResponseMsg>::create(resp_key, 16).unwrap();
        let strategy_req = MwmrQueue::<RequestMsg>::open(req_key, 16).unwrap();
        let strategy_resp = MwmrQueue::<ResponseMsg>::open(resp_key, 16).unwrap();

        let ledger = Arc::new(PositionLedger::new());
        let bridge = Bridge::new(bridge_resp, Arc::clone(&ledger));

        if with_sim {
            let mut cfg = SimulatorConfig::default();
            cfg.matching.accept_delay_ms = 5;
            cfg.matching.fill_delay_ms = 5;
            let sim = Arc::new(SimulatorPlugin::with_config(cfg).unwrap());
            bridge.connect_broker("simulator", sim).unwrap();
        }

        let drain = bridge.clone();
        let processor = std::thread::spawn(move || drain.run(&mut bridge_req));

        Self {
            bridge,
            ledger,
            strategy_req,
            strategy_resp,
            processor: Some(processor),
        }
    }

    fn expect_responses(&mut self, count: usize) -> Vec<ResponseMsg> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.len() < count && Instant::now() < deadline {
            match self.strategy_resp.dequeue() {
                Some(r) => out.push(r),
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        assert_eq!(out.len(), count, "timed out waiting for responses");
        out
    }

    fn shutdown(mut self) {
        self.bridge.stop();
        self.processor.take().unwrap().join().unwrap();
        self.bridge.shutdown_brokers();
        // Remove the segments so reruns start clean.
        self.strategy_req.destroy().unwrap();
        self.strategy_resp.destroy().unwrap();
    }
}

#[test]
fn test_open_then_auto_offset_close() {
    let mut gw = Gateway::start(KEY_BASE, KEY_BASE + 1, true);

    // Open: buy 3 ag2506 @ 7800 limit.
    let open = RequestMsg::new_order("ag2506", CHINA_SHFE, SIDE_BUY, 3, 7800.0, 1, 7);
    gw.strategy_req.enqueue(&open);

    let got = gw.expect_responses(2);
    assert_eq!(got[0].response_type(), Some(ResponseType::NewOrderConfirm));
    assert_eq!(got[0].order_id, 1);
    assert_eq!(got[0].strategy_id, 7);
    assert_eq!(got[0].quantity, 0);

    assert_eq!(got[1].response_type(), Some(ResponseType::TradeConfirm));
    assert_eq!(got[1].order_id, 1);
    assert_eq!(got[1].quantity, 3);
    assert_eq!(got[1].price, 7801.0); // 1-tick slippage against the buy
    assert_eq!(got[1].symbol(), "ag2506");
    assert_eq!(got[1].side, SIDE_BUY);

    assert_eq!(gw.ledger.get("ag2506").today_long, 3);

    // Sell 2 with the offset left advisory: the bridge derives CloseToday
    // and freezes the bucket before dispatch.
    let close = RequestMsg::new_order("ag2506", CHINA_SHFE, SIDE_SELL, 2, 7810.0, 2, 7);
    gw.strategy_req.enqueue(&close);

    let got = gw.expect_responses(2);
    assert_eq!(got[0].response_type(), Some(ResponseType::NewOrderConfirm));
    assert_eq!(got[0].order_id, 2);
    assert_eq!(got[1].response_type(), Some(ResponseType::TradeConfirm));
    assert_eq!(got[1].quantity, 2);
    assert_eq!(got[1].price, 7809.0);

    let pos = gw.ledger.get("ag2506");
    assert_eq!(pos.today_long, 1);
    assert_eq!(pos.today_short, 0);

    // The simulator booked the realized P&L: (7809 - 7801) * 2. The
    // account settles just after the trade confirm, so poll briefly.
    let sim = gw.bridge.broker("simulator").unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    let account = loop {
        let account = sim.query_account().unwrap();
        if (account.close_profit - 16.0).abs() < 1e-9 || Instant::now() >= deadline {
            break account;
        }
        std::thread::sleep(Duration::from_millis(1));
    };
    assert!((account.close_profit - 16.0).abs() < 1e-9);
    assert!(
        (account.balance - (1_000_000.0 + account.close_profit - account.commission)).abs() < 1e-9
    );

    gw.shutdown();
}

#[test]
fn test_no_broker_gets_ors_reject() {
    let mut gw = Gateway::start(KEY_BASE + 2, KEY_BASE + 3, false);
    gw.bridge.add_route("ag2506", "ctp");

    let req = RequestMsg::new_order("ag2506", CHINA_SHFE, SIDE_BUY, 5, 7800.0, 11, 3);
    gw.strategy_req.enqueue(&req);

    let got = gw.expect_responses(1);
    assert_eq!(got[0].response_type(), Some(ResponseType::OrsReject));
    assert_eq!(got[0].order_id, 11);
    assert_eq!(got[0].error_code, 1);
    assert_eq!(got[0].quantity, 5);
    assert_eq!(got[0].side, SIDE_BUY);
    assert_eq!(got[0].symbol(), "ag2506");
    assert_eq!(got[0].strategy_id, 3);

    assert_eq!(gw.ledger.get("ag2506"), Default::default());
    gw.shutdown();
}

#[test]
fn test_warm_start_close_rejected_by_counter_unfreezes_ledger() {
    let mut gw = Gateway::start(KEY_BASE + 6, KEY_BASE + 7, true);

    // Warm-start the ledger with 3 overnight long lots. The simulator's
    // own position table starts empty, so the derived close will bounce.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("positions.csv");
    std::fs::write(&path, "# warm start\nag2506,3,0,0,0\n").unwrap();
    assert_eq!(gw.ledger.load_snapshot(&path).unwrap(), 1);

    let req = RequestMsg::new_order("ag2506", CHINA_SHFE, SIDE_SELL, 2, 7810.0, 31, 5);
    gw.strategy_req.enqueue(&req);

    // The bridge froze the overnight bucket at send time and the counter
    // rejected the close; the unfreeze must restore it.
    let got = gw.expect_responses(1);
    assert_eq!(got[0].response_type(), Some(ResponseType::OrderError));
    assert_eq!(got[0].order_id, 31);
    assert_eq!(got[0].quantity, 2);

    let deadline = Instant::now() + Duration::from_secs(2);
    while gw.ledger.get("ag2506").on_long != 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(gw.ledger.get("ag2506").on_long, 3);

    // Round-trip the restored state back to disk.
    gw.ledger.save_snapshot(&path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("ag2506,3,0,0,0"));

    gw.shutdown();
}

#[test]
fn test_responses_preserve_per_order_lifecycle() {
    let mut gw = Gateway::start(KEY_BASE + 4, KEY_BASE + 5, true);

    // Several independent orders; every order's confirm precedes its
    // trade, whatever the interleaving across orders.
    for oid in 1..=4u32 {
        let req = RequestMsg::new_order("cu2507", CHINA_SHFE, SIDE_BUY, 1, 61000.0, oid, 9);
        gw.strategy_req.enqueue(&req);
    }

    let got = gw.expect_responses(8);
    for oid in 1..=4u32 {
        let states: Vec<ResponseType> = got
            .iter()
            .filter(|r| r.order_id == oid)
            .map(|r| r.response_type().unwrap())
            .collect();
        assert_eq!(
            states,
            vec![ResponseType::NewOrderConfirm, ResponseType::TradeConfirm],
            "order {oid}"
        );
    }
    assert_eq!(gw.ledger.get("cu2507").today_long, 4);

    gw.shutdown();
}
