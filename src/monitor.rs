//! HTTP monitor - liveness probe and simulator introspection
//!
//! Peripheral by design: handlers only touch the bridge through its
//! public stats and plugin query calls, never the ledger lock directly.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::bridge::Bridge;
use crate::core::{Error, Result};

pub fn router(bridge: Bridge) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/simulator/stats", get(simulator_stats))
        .route("/simulator/account", get(simulator_account))
        .with_state(bridge)
}

/// Serve until the process exits. Liveness only; does not reflect broker
/// state.
pub async fn serve(bridge: Bridge, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| Error::Config(format!("monitor: bind port {port}: {e}")))?;
    tracing::info!("monitor: listening on http://0.0.0.0:{}", port);
    axum::serve(listener, router(bridge))
        .await
        .map_err(|e| Error::Config(format!("monitor: serve: {e}")))?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "mode": "mwmr"}))
}

async fn stats(State(bridge): State<Bridge>) -> Json<Value> {
    let s = bridge.stats();
    Json(json!({
        "total_orders": s.total_orders.load(Ordering::Relaxed),
        "success_orders": s.success_orders.load(Ordering::Relaxed),
        "failed_orders": s.failed_orders.load(Ordering::Relaxed),
        "filled_orders": s.filled_orders.load(Ordering::Relaxed),
        "rejected_orders": s.rejected_orders.load(Ordering::Relaxed),
        "brokers": bridge.broker_count(),
    }))
}

async fn simulator_stats(State(bridge): State<Bridge>) -> Json<Value> {
    let Some(sim) = bridge.broker("simulator") else {
        return Json(json!({"success": false, "error": "Simulator not found"}));
    };
    Json(json!({
        "success": true,
        "plugin_name": sim.name(),
        "plugin_version": sim.version(),
        "order_count": sim.order_count(),
        "trade_count": sim.trade_count(),
        "is_connected": sim.is_connected(),
        "is_logged_in": sim.is_logged_in(),
    }))
}

async fn simulator_account(State(bridge): State<Bridge>) -> Json<Value> {
    let Some(sim) = bridge.broker("simulator") else {
        return Json(json!({"success": false, "error": "Simulator not found"}));
    };
    match sim.query_account() {
        Ok(account) => Json(json!({
            "success": true,
            "account_id": account.account_id,
            "balance": account.balance,
            "available": account.available,
            "margin": account.margin,
            "frozen_margin": account.frozen_margin,
            "commission": account.commission,
            "close_profit": account.close_profit,
            "position_profit": account.position_profit,
        })),
        Err(e) => Json(json!({"success": false, "error": e.to_string()})),
    }
}
