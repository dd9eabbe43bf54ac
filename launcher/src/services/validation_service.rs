//! Structural and semantic validation of account and bot documents.
//!
//! A pure reporting function: every check runs, one error per defect, and the
//! full list comes back at once so callers can show every problem in a single
//! round trip. A bot is launch-ready iff the list is empty.

use serde_json::{Map, Value};
use shared::{dig, RunMode, TradingMode, ValidationError};

const PRICE_SIDES: &[&str] = &["ask", "bid", "same", "other"];

/// Validate the raw account and bot documents for the given run mode.
/// The trading mode is read from the bot document itself (default: spot).
pub fn validate(
    account: &Map<String, Value>,
    bot: &Map<String, Value>,
    run_mode: Option<RunMode>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    structural_account(account, &mut errors);
    structural_bot(bot, &mut errors);
    semantic(account, bot, run_mode, &mut errors);
    errors
}

fn require(
    doc: &Map<String, Value>,
    path: &str,
    message: &str,
    pred: impl Fn(&Value) -> bool,
    errors: &mut Vec<ValidationError>,
) {
    match dig(doc, path) {
        None => errors.push(ValidationError::structural(path, "required key is missing")),
        Some(value) if !pred(value) => errors.push(ValidationError::structural(path, message)),
        Some(_) => {}
    }
}

fn is_string(v: &Value) -> bool {
    v.is_string()
}

fn is_non_empty_string(v: &Value) -> bool {
    v.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

fn structural_account(account: &Map<String, Value>, errors: &mut Vec<ValidationError>) {
    require(
        account,
        "exchange.name",
        "must be a non-empty string",
        is_non_empty_string,
        errors,
    );
    // Credentials must exist structurally; emptiness is a live-mode semantic
    // concern, so CRUD can leave them blank until launch.
    require(account, "exchange.key", "must be a string", is_string, errors);
    require(
        account,
        "exchange.secret",
        "must be a string",
        is_string,
        errors,
    );
}

fn structural_bot(bot: &Map<String, Value>, errors: &mut Vec<ValidationError>) {
    require(
        bot,
        "pair_whitelist",
        "must be a non-empty list",
        |v| matches!(v, Value::Array(items) if !items.is_empty()),
        errors,
    );
    require(
        bot,
        "stake_currency",
        "must be a non-empty string",
        is_non_empty_string,
        errors,
    );
    require(
        bot,
        "stake_amount",
        "must be a positive number or 'unlimited'",
        |v| {
            v.as_f64().map(|n| n > 0.0).unwrap_or(false) || v.as_str() == Some("unlimited")
        },
        errors,
    );
    require(
        bot,
        "max_open_trades",
        "must be an integer (or -1 for unlimited)",
        |v| v.as_i64().is_some(),
        errors,
    );
    require(
        bot,
        "dry_run",
        "must be a boolean",
        Value::is_boolean,
        errors,
    );
    require(
        bot,
        "unfilledtimeout.entry",
        "must be an integer",
        |v| v.as_i64().is_some(),
        errors,
    );
    require(
        bot,
        "unfilledtimeout.exit",
        "must be an integer",
        |v| v.as_i64().is_some(),
        errors,
    );
    require(
        bot,
        "entry_pricing.price_last_balance",
        "must be a number",
        Value::is_number,
        errors,
    );
    for path in ["entry_pricing.price_side", "exit_pricing.price_side"] {
        require(
            bot,
            path,
            "must be one of: ask, bid, same, other",
            |v| v.as_str().map(|s| PRICE_SIDES.contains(&s)).unwrap_or(false),
            errors,
        );
    }
    require(
        bot,
        "strategy",
        "must be a non-empty strategy class name",
        is_non_empty_string,
        errors,
    );
    require(
        bot,
        "trading_mode",
        "must be 'spot' or 'futures'",
        |v| v.as_str().and_then(TradingMode::parse).is_some(),
        errors,
    );
}

fn semantic(
    account: &Map<String, Value>,
    bot: &Map<String, Value>,
    run_mode: Option<RunMode>,
    errors: &mut Vec<ValidationError>,
) {
    match run_mode {
        Some(RunMode::Live) => {
            for path in ["exchange.key", "exchange.secret"] {
                if dig(account, path)
                    .and_then(Value::as_str)
                    .map(|s| s.trim().is_empty())
                    .unwrap_or(false)
                {
                    errors.push(ValidationError::semantic(
                        path,
                        "live mode requires non-empty credentials",
                    ));
                }
            }
            if dig(bot, "dry_run") == Some(&Value::Bool(true)) {
                errors.push(ValidationError::semantic(
                    "dry_run",
                    "live mode requires dry_run to be false",
                ));
            }
        }
        Some(mode @ (RunMode::DryRun | RunMode::Backstage)) => {
            if dig(bot, "dry_run") == Some(&Value::Bool(false)) {
                errors.push(ValidationError::semantic(
                    "dry_run",
                    format!("{} mode requires dry_run to be true", mode.as_str()),
                ));
            }
        }
        None => {}
    }

    // Futures-only keys must be present and valid under futures. Under spot
    // their presence is not an error here: the composer strips them upstream.
    let trading_mode = dig(bot, "trading_mode")
        .and_then(Value::as_str)
        .and_then(TradingMode::parse)
        .unwrap_or(TradingMode::Spot);
    if trading_mode == TradingMode::Futures {
        match dig(bot, "margin_mode") {
            None => errors.push(ValidationError::semantic(
                "margin_mode",
                "futures mode requires margin_mode",
            )),
            Some(v) if !v.is_string() => errors.push(ValidationError::semantic(
                "margin_mode",
                "must be a string",
            )),
            Some(_) => {}
        }
        match dig(bot, "liquidation_buffer") {
            None => errors.push(ValidationError::semantic(
                "liquidation_buffer",
                "futures mode requires liquidation_buffer",
            )),
            Some(v) if !v.is_number() => errors.push(ValidationError::semantic(
                "liquidation_buffer",
                "must be a number",
            )),
            Some(_) => {}
        }
    }
}
