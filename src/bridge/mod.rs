//! Counter Bridge - request drain, broker dispatch, response assembly
//!
//! One dedicated thread drains the request ring; broker callbacks arrive
//! on the plugins' own threads and are turned into wire responses here.
//! The handler acquires only the cached-order lock and the ledger lock,
//! never nested, and neither is held across the response enqueue (which
//! is lock-free) or a broker call.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::broker::{
    distinguishes_close_today, Direction, OffsetFlag, OrderInfo, OrderRequest, OrderStatus,
    PriceKind, TdPlugin,
};
use crate::core::Result;
use crate::ledger::PositionLedger;
use crate::shm::MwmrQueue;
use crate::wire::{
    exchange_name, OpenCloseType, OrderType, RequestMsg, RequestType, ResponseMsg, ResponseType,
    TsExchangeId,
};

/// Gateway counters, exported on the monitor endpoint and logged
/// periodically.
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub total_orders: AtomicU64,
    pub success_orders: AtomicU64,
    pub failed_orders: AtomicU64,
    pub filled_orders: AtomicU64,
    pub rejected_orders: AtomicU64,
}

impl BridgeStats {
    pub fn log(&self) {
        tracing::info!(
            "stats: total={} success={} failed={} filled={} rejected={}",
            self.total_orders.load(Ordering::Relaxed),
            self.success_orders.load(Ordering::Relaxed),
            self.failed_orders.load(Ordering::Relaxed),
            self.filled_orders.load(Ordering::Relaxed),
            self.rejected_orders.load(Ordering::Relaxed),
        );
    }
}

/// In-flight order identity, keyed by the broker's opaque order id.
/// Created when `send_order` succeeds, consulted on every callback,
/// removed once a terminal response has been enqueued.
#[derive(Debug, Clone)]
struct CachedOrder {
    order_id: u32,
    strategy_id: i32,
    symbol: String,
    exchange: String,
    side: Direction,
    offset: OffsetFlag,
}

struct BridgeCore {
    ledger: Arc<PositionLedger>,
    orders: Mutex<HashMap<String, CachedOrder>>,
    // BTreeMap so "first logged-in broker" is deterministic.
    brokers: RwLock<BTreeMap<String, Arc<dyn TdPlugin>>>,
    routes: RwLock<HashMap<String, String>>,
    response_queue: MwmrQueue<ResponseMsg>,
    stats: BridgeStats,
    running: AtomicBool,
}

/// The gateway. Clones share one core; the drain loop, plugin callbacks,
/// the monitor and the signal handler all hold one.
#[derive(Clone)]
pub struct Bridge {
    core: Arc<BridgeCore>,
}

impl Bridge {
    pub fn new(response_queue: MwmrQueue<ResponseMsg>, ledger: Arc<PositionLedger>) -> Self {
        Self {
            core: Arc::new(BridgeCore {
                ledger,
                orders: Mutex::new(HashMap::new()),
                brokers: RwLock::new(BTreeMap::new()),
                routes: RwLock::new(HashMap::new()),
                response_queue,
                stats: BridgeStats::default(),
                running: AtomicBool::new(true),
            }),
        }
    }

    /// Wire the plugin's callbacks into this bridge, log it in, and add it
    /// to the registry. Matches the counter's bring-up order: callbacks
    /// must be in place before login so nothing fired during login is lost.
    pub fn connect_broker(&self, name: &str, plugin: Arc<dyn TdPlugin>) -> Result<()> {
        let core = Arc::clone(&self.core);
        plugin.register_order_callback(Box::new(move |info| {
            BridgeCore::on_broker_order(&core, info);
        }));
        plugin.register_trade_callback(Box::new(|trade| {
            tracing::info!(
                "bridge: trade {} {} x{} @ {}",
                trade.order_id,
                trade.symbol,
                trade.volume,
                trade.price
            );
        }));
        plugin.register_error_callback(Box::new(|code, msg| {
            tracing::error!("bridge: broker error [{}] {}", code, msg);
        }));

        plugin.login()?;
        tracing::info!("bridge: broker '{}' ({}) logged in", name, plugin.name());
        self.core.brokers.write().insert(name.to_string(), plugin);
        Ok(())
    }

    /// Route a symbol to a named broker. Symbols without a route fall back
    /// to the first logged-in broker; there is no further sharding.
    pub fn add_route(&self, symbol: &str, broker_name: &str) {
        self.core
            .routes
            .write()
            .insert(symbol.to_string(), broker_name.to_string());
    }

    pub fn broker(&self, name: &str) -> Option<Arc<dyn TdPlugin>> {
        self.core.brokers.read().get(name).cloned()
    }

    pub fn broker_count(&self) -> usize {
        self.core.brokers.read().len()
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.core.stats
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.core.ledger
    }

    pub fn stop(&self) {
        self.core.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Log out every broker, plugins first. Called once on shutdown.
    pub fn shutdown_brokers(&self) {
        for (name, plugin) in self.core.brokers.read().iter() {
            tracing::info!("bridge: logging out '{}'", name);
            plugin.logout();
        }
        self.core.brokers.write().clear();
    }

    /// Request drain loop. Runs on its own thread until `stop`.
    pub fn run(&self, request_queue: &mut MwmrQueue<RequestMsg>) {
        tracing::info!("bridge: request processor started");
        while self.is_running() {
            match request_queue.dequeue() {
                Some(req) => self.core.process_request(&req),
                None => std::thread::sleep(Duration::from_micros(100)),
            }
        }
        tracing::info!("bridge: request processor stopped");
        self.core.stats.log();
    }
}

impl BridgeCore {
    fn process_request(&self, req: &RequestMsg) {
        let total = self.stats.total_orders.fetch_add(1, Ordering::Relaxed) + 1;
        if total % 10 == 0 {
            self.stats.log();
        }

        let symbol = req.symbol();

        // Heartbeats and session records carry no order.
        match req.request_type() {
            Some(RequestType::NewOrder) => {}
            Some(RequestType::Heartbeat) | Some(RequestType::SessionMsg) => return,
            _ => {
                // Out-of-set or unsupported request kinds are answered,
                // never dispatched.
                tracing::warn!(
                    "bridge: unsupported request type {} (OID={})",
                    req.request_type,
                    req.order_id
                );
                self.stats.failed_orders.fetch_add(1, Ordering::Relaxed);
                self.enqueue_reject(req, ResponseType::OrderError);
                return;
            }
        }

        // Validation failures make no ledger mutation and no broker call.
        let Some(side) = Direction::from_side_byte(req.transaction_type) else {
            tracing::warn!("bridge: bad side byte {} (OID={})", req.transaction_type, req.order_id);
            self.stats.failed_orders.fetch_add(1, Ordering::Relaxed);
            self.enqueue_reject(req, ResponseType::OrderError);
            return;
        };
        if symbol.is_empty() || req.quantity <= 0 {
            tracing::warn!(
                "bridge: invalid order OID={} symbol='{}' qty={}",
                req.order_id,
                symbol,
                req.quantity
            );
            self.stats.failed_orders.fetch_add(1, Ordering::Relaxed);
            self.enqueue_reject(req, ResponseType::OrderError);
            return;
        }

        let Some(broker) = self.broker_for_symbol(&symbol) else {
            tracing::warn!("bridge: no broker for {}", symbol);
            self.stats.failed_orders.fetch_add(1, Ordering::Relaxed);
            self.enqueue_reject(req, ResponseType::OrsReject);
            return;
        };

        // Open/close is decided by the live ledger, not the request; the
        // chosen bucket is frozen in the same step.
        let exchange = exchange_name(req.exchange_type);
        let offset = self.ledger.derive_offset(
            &symbol,
            side,
            req.quantity as u32,
            distinguishes_close_today(exchange),
        );

        let unified = OrderRequest {
            symbol: symbol.clone(),
            exchange: exchange.to_string(),
            direction: side,
            offset,
            price_kind: if req.ord_type == OrderType::Market as i32 {
                PriceKind::Market
            } else {
                PriceKind::Limit
            },
            price: req.price,
            volume: req.quantity as u32,
            client_order_id: req.order_id.to_string(),
        };

        tracing::info!(
            "bridge: {} {} {:?} {:?} x{} @ {} (OID={})",
            broker.name(),
            symbol,
            side,
            offset,
            req.quantity,
            req.price,
            req.order_id
        );

        match broker.send_order(&unified) {
            Ok(broker_order_id) if !broker_order_id.is_empty() => {
                self.stats.success_orders.fetch_add(1, Ordering::Relaxed);
                self.orders.lock().insert(
                    broker_order_id,
                    CachedOrder {
                        order_id: req.order_id,
                        strategy_id: req.strategy_id,
                        symbol,
                        exchange: exchange.to_string(),
                        side,
                        offset,
                    },
                );
            }
            other => {
                if let Err(e) = other {
                    tracing::error!("bridge: send_order failed (OID={}): {}", req.order_id, e);
                } else {
                    tracing::error!("bridge: empty broker order id (OID={})", req.order_id);
                }
                self.stats.failed_orders.fetch_add(1, Ordering::Relaxed);

                // The freeze from derive_offset must be reversed.
                self.ledger.apply_response(
                    ResponseType::OrderError,
                    side,
                    offset,
                    req.quantity as u32,
                    &symbol,
                );
                self.enqueue_reject(req, ResponseType::OrderError);
            }
        }
    }

    /// Immediate reject/error response built straight from the request.
    fn enqueue_reject(&self, req: &RequestMsg, response_type: ResponseType) {
        let mut resp = ResponseMsg::zeroed();
        resp.response_type = response_type as i32;
        resp.order_id = req.order_id;
        resp.error_code = 1;
        resp.quantity = req.quantity;
        resp.side = req.transaction_type;
        resp.strategy_id = req.strategy_id;
        resp.set_symbol(&req.symbol());
        resp.timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64;
        self.response_queue.enqueue(&resp);
    }

    fn broker_for_symbol(&self, symbol: &str) -> Option<Arc<dyn TdPlugin>> {
        if let Some(name) = self.routes.read().get(symbol) {
            if let Some(broker) = self.brokers.read().get(name) {
                return Some(Arc::clone(broker));
            }
        }
        self.brokers
            .read()
            .values()
            .find(|b| b.is_logged_in())
            .cloned()
    }

    /// Order callback from any broker plugin. Runs on the plugin's thread.
    fn on_broker_order(core: &Arc<Self>, info: &OrderInfo) {
        // Submitting/Canceling/Unknown are internal transitions; the
        // strategy side only sees confirmed states.
        if matches!(
            info.status,
            OrderStatus::Submitting | OrderStatus::Canceling | OrderStatus::Unknown
        ) {
            return;
        }

        let Some(cached) = core.orders.lock().get(&info.order_id).cloned() else {
            tracing::warn!("bridge: order not in cache: {}", info.order_id);
            return;
        };

        let mut resp = ResponseMsg::zeroed();
        resp.order_id = cached.order_id;
        resp.strategy_id = cached.strategy_id;
        resp.side = cached.side.to_side_byte();
        resp.set_symbol(&cached.symbol);
        resp.set_open_close(match cached.offset {
            OffsetFlag::Open => OpenCloseType::Open,
            OffsetFlag::CloseToday => OpenCloseType::CloseToday,
            OffsetFlag::Close | OffsetFlag::CloseYesterday => OpenCloseType::Close,
        });
        resp.set_exchange_id(TsExchangeId::from_name(&cached.exchange));
        resp.timestamp = info.update_time as u64;

        let response_type = match info.status {
            OrderStatus::Accepted | OrderStatus::Submitted => ResponseType::NewOrderConfirm,
            OrderStatus::PartialFilled | OrderStatus::Filled => {
                resp.quantity = info.traded_volume as i32;
                resp.price = info.price;
                if info.status == OrderStatus::Filled {
                    core.stats.filled_orders.fetch_add(1, Ordering::Relaxed);
                }
                ResponseType::TradeConfirm
            }
            OrderStatus::Canceled => {
                resp.quantity = (info.volume - info.traded_volume) as i32;
                ResponseType::CancelOrderConfirm
            }
            OrderStatus::Rejected | OrderStatus::Error => {
                resp.error_code = 1;
                resp.quantity = info.volume as i32;
                core.stats.rejected_orders.fetch_add(1, Ordering::Relaxed);
                ResponseType::OrderError
            }
            _ => return,
        };
        resp.response_type = response_type as i32;

        core.ledger.apply_response(
            response_type,
            cached.side,
            cached.offset,
            resp.quantity.max(0) as u32,
            &cached.symbol,
        );

        core.response_queue.enqueue(&resp);
        tracing::info!(
            "bridge: response OID={} type={:?} qty={} price={}",
            resp.order_id,
            response_type,
            resp.quantity,
            resp.price
        );

        if info.status.is_terminal() {
            core.orders.lock().remove(&info.order_id);
        }
    }
}
