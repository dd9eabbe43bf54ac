//! Placeholder documents seeded into freshly created workspaces.
//!
//! CRUD may leave these partially empty; validation only enforces them when a
//! launch is attempted.

use crate::layer::RunMode;
use serde_json::{json, Map, Value};

/// Account document scaffold. Credentials may stay empty while in dry-run.
pub fn account_placeholder() -> Map<String, Value> {
    json!({
        "exchange": {
            "name": "binance",
            "key": "",
            "secret": "",
            "password": "",
            "sandbox": false
        }
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// Meta document scaffold.
pub fn meta_placeholder() -> Map<String, Value> {
    json!({
        "strategy_paths": ["./strategies"],
        "decision_log": {"enable": true, "path": null},
        "strategies": {}
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// Bot document scaffold. The strategy name must be set explicitly before a
/// launch can validate.
pub fn bot_placeholder() -> Map<String, Value> {
    json!({
        "dry_run": true,
        "stake_currency": "USDT",
        "stake_amount": 10.0,
        "max_open_trades": 3,
        "pair_whitelist": ["BTC/USDT", "ETH/USDT"],
        "trading_mode": "spot",
        "unfilledtimeout": {"entry": 10, "exit": 10},
        "entry_pricing": {
            "price_side": "same",
            "price_last_balance": 0.0,
            "use_order_book": false,
            "order_book_top": 1
        },
        "exit_pricing": {
            "price_side": "same",
            "price_last_balance": 0.0,
            "use_order_book": false,
            "order_book_top": 1
        },
        "strategy": "__SET_YOUR_STRATEGY__"
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// Mode overlay scaffolds seeded per bot.
pub fn mode_overlay_placeholder(mode: RunMode) -> Map<String, Value> {
    let doc = match mode {
        RunMode::Live => json!({
            "dry_run": false,
            "exchange": {"key": "__REQUIRED__", "secret": "__REQUIRED__"}
        }),
        RunMode::DryRun => json!({"dry_run": true}),
        RunMode::Backstage => json!({"dry_run": true, "backstage": true}),
    };
    doc.as_object().cloned().unwrap_or_default()
}

/// System defaults, the lowest-precedence layer of every composition.
pub fn system_defaults() -> Map<String, Value> {
    json!({
        "dry_run": true,
        "timeframe": "1m",
        "stake_currency": "USDT",
        "entry_pricing": {
            "price_side": "ask",
            "use_order_book": false,
            "order_book_top": 1,
            "price_last_balance": 0.0
        },
        "exit_pricing": {
            "price_side": "bid",
            "use_order_book": false,
            "order_book_top": 1,
            "price_last_balance": 0.0
        },
        // Bots should auto-start their trading loop unless overridden.
        "initial_state": "running"
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}
