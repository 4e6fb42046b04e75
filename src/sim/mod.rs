//! Matching simulator - a software counter behind the plugin contract
//!
//! Immediate-matching mode: every accepted order fills in full after the
//! configured accept and fill delays, with slippage against the order
//! direction. Positions, orders, trades and the account live behind four
//! independent mutexes; acquisition order is orders -> positions ->
//! account, and no lock is held across a delay or a callback.

pub mod config;
pub mod matching;

pub use config::SimulatorConfig;
pub use matching::{SimAccount, SimPosition};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::broker::{
    AccountInfo, Direction, ErrorCallback, OffsetFlag, OrderCallback, OrderInfo, OrderRequest,
    OrderStatus, PositionInfo, TdPlugin, TradeCallback, TradeInfo,
};
use crate::core::{Error, Result};
use crate::sim::matching::PositionBook;

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
}

#[derive(Debug, Clone)]
struct SimOrder {
    order_id: String,
    request: OrderRequest,
    status: OrderStatus,
    traded_volume: u32,
    insert_time: i64,
    update_time: i64,
    status_msg: String,
}

impl SimOrder {
    fn to_info(&self) -> OrderInfo {
        OrderInfo {
            order_id: self.order_id.clone(),
            client_order_id: self.request.client_order_id.clone(),
            symbol: self.request.symbol.clone(),
            exchange: self.request.exchange.clone(),
            direction: self.request.direction,
            offset: self.request.offset,
            price_kind: self.request.price_kind,
            price: self.request.price,
            volume: self.request.volume,
            traded_volume: self.traded_volume,
            status: self.status,
            insert_time: self.insert_time,
            update_time: self.update_time,
            status_msg: if self.status_msg.is_empty() {
                self.status.as_str().to_string()
            } else {
                self.status_msg.clone()
            },
        }
    }
}

#[derive(Default)]
struct Callbacks {
    order: RwLock<Option<OrderCallback>>,
    trade: RwLock<Option<TradeCallback>>,
    error: RwLock<Option<ErrorCallback>>,
}

impl Callbacks {
    fn fire_order(&self, info: &OrderInfo) {
        if let Some(cb) = self.order.read().as_ref() {
            cb(info);
        }
    }

    fn fire_trade(&self, trade: &TradeInfo) {
        if let Some(cb) = self.trade.read().as_ref() {
            cb(trade);
        }
    }

    fn fire_error(&self, code: i32, msg: &str) {
        if let Some(cb) = self.error.read().as_ref() {
            cb(code, msg);
        }
    }
}

struct SimCore {
    config: RwLock<SimulatorConfig>,
    connected: AtomicBool,
    logged_in: AtomicBool,
    order_count: AtomicU64,
    trade_count: AtomicU64,
    order_ref: AtomicU64,
    orders: Mutex<HashMap<String, SimOrder>>,
    positions: Mutex<PositionBook>,
    trades: Mutex<Vec<TradeInfo>>,
    account: Mutex<SimAccount>,
    callbacks: Callbacks,
}

/// The simulator counter. Cheap to clone handles into lifecycle threads.
pub struct SimulatorPlugin {
    core: Arc<SimCore>,
}

impl Default for SimulatorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorPlugin {
    pub fn new() -> Self {
        let config = SimulatorConfig::default();
        let account = SimAccount::new(config.account.initial_balance);
        Self {
            core: Arc::new(SimCore {
                config: RwLock::new(config),
                connected: AtomicBool::new(false),
                logged_in: AtomicBool::new(false),
                order_count: AtomicU64::new(0),
                trade_count: AtomicU64::new(0),
                order_ref: AtomicU64::new(1),
                orders: Mutex::new(HashMap::new()),
                positions: Mutex::new(PositionBook::new()),
                trades: Mutex::new(Vec::new()),
                account: Mutex::new(account),
                callbacks: Callbacks::default(),
            }),
        }
    }

    /// Build a simulator with an in-memory config (tests, embedded use).
    pub fn with_config(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        let sim = Self::new();
        *sim.core.account.lock() = SimAccount::new(config.account.initial_balance);
        *sim.core.config.write() = config;
        Ok(sim)
    }

    /// Daily settlement: move today's volume into the yesterday bucket.
    pub fn settle_day(&self) {
        matching::roll_day(&mut self.core.positions.lock());
    }

    fn generate_order_id(&self) -> String {
        let seq = self.core.order_ref.fetch_add(1, Ordering::AcqRel);
        format!("SIM_{}_{}", now_nanos(), seq)
    }
}

impl SimCore {
    /// Asynchronous order lifecycle, one thread per accepted order.
    /// Every callback fires from this thread, starting with Submitting;
    /// cancellation is observed at each sleep boundary.
    fn run_lifecycle(self: Arc<Self>, order_id: String, request: OrderRequest) {
        let (accept_delay, fill_delay, slippage) = {
            let cfg = self.config.read();
            (
                cfg.matching.accept_delay_ms,
                cfg.matching.fill_delay_ms,
                cfg.matching.slippage_ticks,
            )
        };

        let info = {
            let orders = self.orders.lock();
            let Some(order) = orders.get(&order_id) else {
                return;
            };
            order.to_info()
        };
        if info.status == OrderStatus::Submitting {
            self.callbacks.fire_order(&info);
        }

        if accept_delay > 0 {
            std::thread::sleep(Duration::from_millis(accept_delay));
        }

        // Accept, unless the order was cancelled (or cleared by logout)
        // during the delay.
        let info = {
            let mut orders = self.orders.lock();
            let Some(order) = orders.get_mut(&order_id) else {
                return;
            };
            if order.status == OrderStatus::Canceled {
                return;
            }
            order.status = OrderStatus::Accepted;
            order.update_time = now_nanos();
            order.to_info()
        };
        self.callbacks.fire_order(&info);

        if fill_delay > 0 {
            std::thread::sleep(Duration::from_millis(fill_delay));
        }

        // Fill price: market orders, and any order with slippage
        // configured, move against the direction.
        let mut fill_price = request.price;
        if request.price_kind == crate::broker::PriceKind::Market || slippage > 0.0 {
            match request.direction {
                Direction::Buy => fill_price += slippage,
                Direction::Sell => fill_price -= slippage,
            }
        }

        // The cancel check and the transition to Filled happen under one
        // lock so a late cancel cannot be overwritten.
        let info = {
            let mut orders = self.orders.lock();
            let Some(order) = orders.get_mut(&order_id) else {
                return;
            };
            if order.status == OrderStatus::Canceled {
                return;
            }
            order.status = OrderStatus::Filled;
            order.traded_volume = request.volume;
            order.update_time = now_nanos();
            order.to_info()
        };

        let trade = TradeInfo {
            trade_id: format!(
                "TRD_{}_{}",
                now_nanos(),
                self.trade_count.load(Ordering::Acquire)
            ),
            order_id: order_id.clone(),
            symbol: request.symbol.clone(),
            exchange: request.exchange.clone(),
            direction: request.direction,
            offset: request.offset,
            price: fill_price,
            volume: request.volume,
            trade_time: now_nanos(),
        };

        self.callbacks.fire_order(&info);

        self.trades.lock().push(trade.clone());
        self.trade_count.fetch_add(1, Ordering::AcqRel);

        tracing::info!(
            "sim: trade {} {} x{} @ {}",
            trade.trade_id,
            trade.symbol,
            trade.volume,
            trade.price
        );

        // Positions before account, always.
        {
            let (margin_rate, commission_rate) = {
                let cfg = self.config.read();
                (cfg.account.margin_rate, cfg.account.commission_rate)
            };
            let mut positions = self.positions.lock();
            let mut account = self.account.lock();
            matching::apply_trade(&mut positions, &mut account, &trade, margin_rate);
            account.commission += trade.price * trade.volume as f64 * commission_rate;
            matching::recompute_account(&positions, &mut account);
        }

        self.callbacks.fire_trade(&trade);
    }
}

impl TdPlugin for SimulatorPlugin {
    fn initialize(&self, config_path: &str) -> Result<()> {
        let config = SimulatorConfig::load(std::path::Path::new(config_path))?;
        tracing::info!(
            "sim: initialized, mode={} initial_balance={}",
            config.mode,
            config.account.initial_balance
        );
        *self.core.account.lock() = SimAccount::new(config.account.initial_balance);
        *self.core.config.write() = config;
        Ok(())
    }

    fn login(&self) -> Result<()> {
        if self.core.logged_in.load(Ordering::Acquire) {
            return Ok(());
        }
        self.core.connected.store(true, Ordering::Release);
        self.core.logged_in.store(true, Ordering::Release);
        self.core.order_count.store(0, Ordering::Release);
        self.core.trade_count.store(0, Ordering::Release);
        self.core.order_ref.store(1, Ordering::Release);

        let initial = self.core.config.read().account.initial_balance;
        *self.core.account.lock() = SimAccount::new(initial);

        tracing::info!("sim: login successful, available={}", initial);
        Ok(())
    }

    fn logout(&self) {
        if !self.core.logged_in.load(Ordering::Acquire) {
            return;
        }
        self.core.orders.lock().clear();
        self.core.trades.lock().clear();
        self.core.positions.lock().clear();
        self.core.logged_in.store(false, Ordering::Release);
        self.core.connected.store(false, Ordering::Release);
        tracing::info!("sim: logged out");
    }

    fn is_connected(&self) -> bool {
        self.core.connected.load(Ordering::Acquire)
    }

    fn is_logged_in(&self) -> bool {
        self.core.logged_in.load(Ordering::Acquire)
    }

    fn send_order(&self, request: &OrderRequest) -> Result<String> {
        if !self.is_logged_in() {
            self.core.callbacks.fire_error(-1, "Not logged in");
            return Err(Error::Broker("simulator: not logged in".into()));
        }

        // Implicit offsets get the net-position treatment; explicit close
        // flags pass through.
        let mut request = request.clone();
        request.offset = {
            let positions = self.core.positions.lock();
            matching::derive_offset_for(&positions, &request)
        };

        let order_id = self.generate_order_id();
        let now = now_nanos();

        // Risk pre-check. A rejected order still gets an id and a stored
        // record, matching counter behavior.
        let risk = {
            let cfg = self.core.config.read();
            let positions = self.core.positions.lock();
            let account = self.core.account.lock();
            matching::check_risk(&positions, &account, &request, &cfg)
        };

        let (order, rejected_reason) = match risk {
            Err(reason) => (
                SimOrder {
                    order_id: order_id.clone(),
                    request: request.clone(),
                    status: OrderStatus::Rejected,
                    traded_volume: 0,
                    insert_time: now,
                    update_time: now,
                    status_msg: reason.clone(),
                },
                Some(reason),
            ),
            Ok(()) => (
                SimOrder {
                    order_id: order_id.clone(),
                    request: request.clone(),
                    status: OrderStatus::Submitting,
                    traded_volume: 0,
                    insert_time: now,
                    update_time: now,
                    status_msg: String::new(),
                },
                None,
            ),
        };

        let info = order.to_info();
        self.core.orders.lock().insert(order_id.clone(), order);
        self.core.order_count.fetch_add(1, Ordering::AcqRel);

        // Callbacks belong to the plugin's own threads, never the caller's.
        // Rejects take the accept delay like any counter round-trip.
        if let Some(reason) = rejected_reason {
            tracing::warn!("sim: order {} rejected: {}", order_id, reason);
            let core = Arc::clone(&self.core);
            let accept_delay = self.core.config.read().matching.accept_delay_ms;
            std::thread::spawn(move || {
                if accept_delay > 0 {
                    std::thread::sleep(Duration::from_millis(accept_delay));
                }
                core.callbacks.fire_order(&info);
                core.callbacks.fire_error(-2, &reason);
            });
            return Ok(order_id);
        }

        tracing::info!(
            "sim: order {} submitted: {} {:?} {:?} x{} @ {}",
            order_id,
            request.symbol,
            request.direction,
            request.offset,
            request.volume,
            request.price
        );
        let core = Arc::clone(&self.core);
        let id = order_id.clone();
        std::thread::spawn(move || core.run_lifecycle(id, request));

        Ok(order_id)
    }

    fn cancel_order(&self, order_id: &str) -> bool {
        if !self.is_logged_in() {
            return false;
        }
        let info = {
            let mut orders = self.core.orders.lock();
            let Some(order) = orders.get_mut(order_id) else {
                tracing::warn!("sim: cancel of unknown order {}", order_id);
                return false;
            };
            if !matches!(
                order.status,
                OrderStatus::Submitting | OrderStatus::Accepted | OrderStatus::PartialFilled
            ) {
                tracing::warn!(
                    "sim: cannot cancel order {} in state {:?}",
                    order_id,
                    order.status
                );
                return false;
            }
            order.status = OrderStatus::Canceled;
            order.update_time = now_nanos();
            order.to_info()
        };
        tracing::info!("sim: order {} canceled", order_id);
        self.core.callbacks.fire_order(&info);
        true
    }

    fn query_account(&self) -> Result<AccountInfo> {
        if !self.is_logged_in() {
            return Err(Error::Broker("simulator: not logged in".into()));
        }
        let account = self.core.account.lock();
        Ok(AccountInfo {
            account_id: "SIMULATOR".to_string(),
            balance: account.balance,
            available: account.available,
            margin: account.margin,
            frozen_margin: 0.0,
            commission: account.commission,
            close_profit: account.close_profit,
            position_profit: 0.0,
        })
    }

    fn query_positions(&self) -> Result<Vec<PositionInfo>> {
        if !self.is_logged_in() {
            return Err(Error::Broker("simulator: not logged in".into()));
        }
        let positions = self.core.positions.lock();
        Ok(positions
            .values()
            .map(|p| PositionInfo {
                symbol: p.symbol.clone(),
                exchange: p.exchange.clone(),
                direction: p.direction,
                volume: p.volume,
                today_volume: p.today_volume,
                yesterday_volume: p.yesterday_volume,
                avg_price: p.avg_price,
                position_profit: p.unrealized_pnl,
                margin: p.margin,
            })
            .collect())
    }

    fn query_orders(&self) -> Result<Vec<OrderInfo>> {
        if !self.is_logged_in() {
            return Err(Error::Broker("simulator: not logged in".into()));
        }
        Ok(self.core.orders.lock().values().map(SimOrder::to_info).collect())
    }

    fn query_trades(&self) -> Result<Vec<TradeInfo>> {
        if !self.is_logged_in() {
            return Err(Error::Broker("simulator: not logged in".into()));
        }
        Ok(self.core.trades.lock().clone())
    }

    fn get_order(&self, order_id: &str) -> Option<OrderInfo> {
        self.core.orders.lock().get(order_id).map(SimOrder::to_info)
    }

    fn register_order_callback(&self, callback: OrderCallback) {
        *self.core.callbacks.order.write() = Some(callback);
    }

    fn register_trade_callback(&self, callback: TradeCallback) {
        *self.core.callbacks.trade.write() = Some(callback);
    }

    fn register_error_callback(&self, callback: ErrorCallback) {
        *self.core.callbacks.error.write() = Some(callback);
    }

    fn name(&self) -> &'static str {
        "SimulatorPlugin"
    }

    fn available_fund(&self) -> f64 {
        self.core.account.lock().available
    }

    fn order_count(&self) -> u64 {
        self.core.order_count.load(Ordering::Acquire)
    }

    fn trade_count(&self) -> u64 {
        self.core.trade_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PriceKind;
    use std::sync::mpsc;
    use std::time::Duration;

    fn fast_sim() -> SimulatorPlugin {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 5;
        cfg.matching.fill_delay_ms = 5;
        cfg.matching.slippage_ticks = 1.0;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();
        sim
    }

    fn buy_open(symbol: &str, price: f64, volume: u32) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            exchange: "SHFE".to_string(),
            direction: Direction::Buy,
            offset: OffsetFlag::Open,
            price_kind: PriceKind::Limit,
            price,
            volume,
            client_order_id: "1".to_string(),
        }
    }

    fn collect_statuses(sim: &SimulatorPlugin) -> mpsc::Receiver<OrderStatus> {
        let (tx, rx) = mpsc::channel();
        sim.register_order_callback(Box::new(move |info| {
            let _ = tx.send(info.status);
        }));
        rx
    }

    #[test]
    fn test_lifecycle_submitting_accepted_filled() {
        let sim = fast_sim();
        let rx = collect_statuses(&sim);

        let id = sim.send_order(&buy_open("ag2506", 7800.0, 3)).unwrap();
        assert!(id.starts_with("SIM_"));

        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), OrderStatus::Submitting);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), OrderStatus::Accepted);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), OrderStatus::Filled);

        let order = sim.get_order(&id).unwrap();
        assert_eq!(order.traded_volume, 3);
        assert_eq!(sim.order_count(), 1);
        assert_eq!(sim.trade_count(), 1);

        // 1-tick slippage against a buy.
        let trades = sim.query_trades().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 7801.0);
        assert!(trades[0].trade_id.starts_with("TRD_"));

        let positions = sim.query_positions().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].volume, 3);
        assert_eq!(positions[0].today_volume, 3);
    }

    #[test]
    fn test_open_then_auto_close_books_profit() {
        let sim = fast_sim();
        let (tx, rx) = mpsc::channel();
        sim.register_trade_callback(Box::new(move |trade| {
            let _ = tx.send(trade.clone());
        }));

        sim.send_order(&buy_open("ag2506", 7800.0, 3)).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // Sell with offset left implicit: the simulator derives CloseToday.
        let sell = OrderRequest {
            direction: Direction::Sell,
            price: 7810.0,
            volume: 2,
            ..buy_open("ag2506", 7810.0, 2)
        };
        sim.send_order(&sell).unwrap();
        let close_trade = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(close_trade.offset, OffsetFlag::CloseToday);
        assert_eq!(close_trade.price, 7809.0); // slippage against the sell

        let account = sim.query_account().unwrap();
        // (7809 - 7801) * 2
        assert!((account.close_profit - 16.0).abs() < 1e-9);
        assert!(
            (account.balance
                - (1_000_000.0 + account.close_profit - account.commission))
                .abs()
                < 1e-9
        );

        let positions = sim.query_positions().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].volume, 1);
    }

    #[test]
    fn test_risk_reject_fires_callbacks_and_returns_id() {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 1;
        cfg.matching.fill_delay_ms = 1;
        cfg.risk.max_position_per_symbol = 5;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();

        let (err_tx, err_rx) = mpsc::channel();
        sim.register_error_callback(Box::new(move |code, msg| {
            let _ = err_tx.send((code, msg.to_string()));
        }));
        let rx = collect_statuses(&sim);

        let id = sim.send_order(&buy_open("ag2506", 7800.0, 6)).unwrap();
        assert!(!id.is_empty());

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            OrderStatus::Rejected
        );
        let (code, msg) = err_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(code, -2);
        assert!(msg.contains("Exceeds max position per symbol"));

        let order = sim.get_order(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(order.status_msg.contains("Exceeds max position"));

        // No trade, no position.
        std::thread::sleep(Duration::from_millis(20));
        assert!(sim.query_trades().unwrap().is_empty());
        assert!(sim.query_positions().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_during_accept_delay() {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 100;
        cfg.matching.fill_delay_ms = 100;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();

        let rx = collect_statuses(&sim);
        let (trade_tx, trade_rx) = mpsc::channel();
        sim.register_trade_callback(Box::new(move |trade| {
            let _ = trade_tx.send(trade.clone());
        }));

        let id = sim.send_order(&buy_open("ag2506", 7800.0, 1)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(sim.cancel_order(&id));

        let timeout = Duration::from_secs(1);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), OrderStatus::Submitting);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), OrderStatus::Canceled);
        // No further order states, no trade.
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert!(trade_rx.try_recv().is_err());
        assert!(sim.query_positions().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_of_filled_order_fails() {
        let sim = fast_sim();
        let rx = collect_statuses(&sim);
        let id = sim.send_order(&buy_open("ag2506", 7800.0, 1)).unwrap();
        // Drain to Filled.
        let timeout = Duration::from_secs(2);
        while rx.recv_timeout(timeout).unwrap() != OrderStatus::Filled {}
        assert!(!sim.cancel_order(&id));
    }

    #[test]
    fn test_send_order_requires_login() {
        let sim = SimulatorPlugin::new();
        assert!(sim.send_order(&buy_open("ag2506", 7800.0, 1)).is_err());
    }

    #[test]
    fn test_logout_clears_state() {
        let sim = fast_sim();
        let rx = collect_statuses(&sim);
        sim.send_order(&buy_open("ag2506", 7800.0, 1)).unwrap();
        let timeout = Duration::from_secs(2);
        while rx.recv_timeout(timeout).unwrap() != OrderStatus::Filled {}

        sim.logout();
        assert!(!sim.is_logged_in());
        assert!(!sim.is_connected());

        sim.login().unwrap();
        assert!(sim.query_orders().unwrap().is_empty());
        assert!(sim.query_positions().unwrap().is_empty());
        assert_eq!(sim.query_account().unwrap().balance, 1_000_000.0);
    }

    #[test]
    fn test_market_order_slippage() {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 5;
        cfg.matching.fill_delay_ms = 5;
        cfg.matching.slippage_ticks = 2.0;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();

        let (tx, rx) = mpsc::channel();
        sim.register_trade_callback(Box::new(move |trade| {
            let _ = tx.send(trade.clone());
        }));

        let mut req = buy_open("ag2506", 7800.0, 1);
        req.price_kind = PriceKind::Market;
        sim.send_order(&req).unwrap();
        let t = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(t.price, 7802.0);

        let mut req = buy_open("ag2506", 7800.0, 1);
        req.direction = Direction::Sell;
        req.offset = OffsetFlag::CloseToday;
        sim.send_order(&req).unwrap();
        let t = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(t.price, 7798.0);
    }

    #[test]
    fn test_limit_without_slippage_fills_at_limit() {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 5;
        cfg.matching.fill_delay_ms = 5;
        cfg.matching.slippage_ticks = 0.0;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();

        let (tx, rx) = mpsc::channel();
        sim.register_trade_callback(Box::new(move |trade| {
            let _ = tx.send(trade.clone());
        }));
        sim.send_order(&buy_open("ag2506", 7800.0, 1)).unwrap();
        let t = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(t.price, 7800.0);
    }

    #[test]
    fn test_cancel_during_fill_delay() {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 10;
        cfg.matching.fill_delay_ms = 300;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();

        let rx = collect_statuses(&sim);
        let id = sim.send_order(&buy_open("ag2506", 7800.0, 1)).unwrap();

        let timeout = Duration::from_secs(1);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), OrderStatus::Submitting);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), OrderStatus::Accepted);

        assert!(sim.cancel_order(&id));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), OrderStatus::Canceled);
        // The fill wake-up observes the cancel and emits nothing more.
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
        assert!(sim.query_trades().unwrap().is_empty());
    }

    #[test]
    fn test_insufficient_funds_reject() {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 1;
        cfg.matching.fill_delay_ms = 1;
        cfg.account.initial_balance = 1_000.0;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();

        let rx = collect_statuses(&sim);
        let id = sim.send_order(&buy_open("cu2507", 61_000.0, 1)).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            OrderStatus::Rejected
        );
        let order = sim.get_order(&id).unwrap();
        assert!(order.status_msg.contains("Insufficient funds"));
    }

    #[test]
    fn test_daily_loss_breach_blocks_new_orders() {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 2;
        cfg.matching.fill_delay_ms = 2;
        cfg.matching.slippage_ticks = 1.0;
        cfg.risk.max_daily_loss = 5.0;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();

        let (tx, rx) = mpsc::channel();
        sim.register_trade_callback(Box::new(move |trade| {
            let _ = tx.send(trade.clone());
        }));

        // Open at 101 (slippage), close back at 89: realized -12 breaches
        // the 5.0 daily-loss cap.
        sim.send_order(&buy_open("ag2506", 100.0, 1)).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let sell = OrderRequest {
            direction: Direction::Sell,
            price: 90.0,
            volume: 1,
            ..buy_open("ag2506", 90.0, 1)
        };
        sim.send_order(&sell).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(sim.query_account().unwrap().close_profit < -5.0);

        let status_rx = collect_statuses(&sim);
        let id = sim.send_order(&buy_open("ag2506", 100.0, 1)).unwrap();
        assert_eq!(
            status_rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            OrderStatus::Rejected
        );
        assert!(sim
            .get_order(&id)
            .unwrap()
            .status_msg
            .contains("Exceeds max daily loss"));
    }

    #[test]
    fn test_short_average_price_over_multiple_opens() {
        let mut cfg = SimulatorConfig::default();
        cfg.matching.accept_delay_ms = 2;
        cfg.matching.fill_delay_ms = 2;
        cfg.matching.slippage_ticks = 0.0;
        let sim = SimulatorPlugin::with_config(cfg).unwrap();
        sim.login().unwrap();

        let (tx, rx) = mpsc::channel();
        sim.register_trade_callback(Box::new(move |trade| {
            let _ = tx.send(trade.clone());
        }));

        for (price, volume) in [(7800.0, 2), (7850.0, 1)] {
            let req = OrderRequest {
                direction: Direction::Sell,
                price,
                volume,
                ..buy_open("ag2506", price, volume)
            };
            sim.send_order(&req).unwrap();
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }

        let positions = sim.query_positions().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].direction, Direction::Sell);
        assert_eq!(positions[0].volume, 3);
        // (7800*2 + 7850*1) / 3
        assert!((positions[0].avg_price - 7816.6666666).abs() < 1e-4);
    }

    #[test]
    fn test_shfe_mixed_close_drains_today_then_yesterday() {
        let sim = fast_sim();
        let (tx, rx) = mpsc::channel();
        sim.register_trade_callback(Box::new(move |trade| {
            let _ = tx.send(trade.clone());
        }));

        // Day 1: open 3, roll to yesterday. Day 2: open 2 more.
        sim.send_order(&buy_open("ag2506", 7800.0, 3)).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        sim.settle_day();
        sim.send_order(&buy_open("ag2506", 7800.0, 2)).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // Auto-offset sell of 4 fits neither bucket alone: generic close,
        // today drained first.
        let sell = OrderRequest {
            direction: Direction::Sell,
            price: 7810.0,
            volume: 4,
            ..buy_open("ag2506", 7810.0, 4)
        };
        sim.send_order(&sell).unwrap();
        let t = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(t.offset, OffsetFlag::Close);

        let positions = sim.query_positions().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].volume, 1);
        assert_eq!(positions[0].today_volume, 0);
        assert_eq!(positions[0].yesterday_volume, 1);
    }
}
