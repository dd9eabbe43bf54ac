//! Layer composition.
//!
//! A pure left-to-right fold over the pre-sorted layer stack. Each layer
//! overrides the keys it defines; nested non-atomic blocks merge
//! field-by-field, while designated atomic blocks are replaced wholesale so a
//! lower-precedence layer can never leak a stale sibling field into a block a
//! higher layer redefined. Missing required keys are the validator's concern,
//! never raised here.

use serde_json::{json, Map, Value};
use shared::{deep_merge, EffectiveConfig, Layer};

/// Blocks replaced in full by the last layer that sets any field within them.
pub const ATOMIC_BLOCKS: &[&str] = &["entry_pricing", "exit_pricing", "unfilledtimeout"];

/// Keys owned by the strategy once a strategy-parameters channel exists,
/// stripped from the effective config to avoid duplication.
pub const STRATEGY_OWNED_KEYS: &[&str] = &[
    "timeframe",
    "minimal_roi",
    "stoploss",
    "trailing_stop",
    "trailing_stop_positive",
    "trailing_stop_positive_offset",
    "trailing_only_offset_is_reached",
    "unfilledtimeout",
];

/// Keys meaningful only under futures. Deleted, not merely ignored, when the
/// effective trading mode is spot.
pub const FUTURES_ONLY_KEYS: &[&str] = &["margin_mode", "liquidation_buffer", "futures_funding_rate"];

/// Per-key merge behavior. An explicit table rather than a generic recursive
/// deep-merge keeps the atomic-block guarantee auditable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergePolicy {
    Override,
    ReplaceBlock,
}

fn policy_for(key: &str) -> MergePolicy {
    if ATOMIC_BLOCKS.contains(&key) {
        MergePolicy::ReplaceBlock
    } else {
        MergePolicy::Override
    }
}

/// Compose the ordered layer set into one effective configuration.
///
/// Deterministic and side-effect-free: the same layer set always yields the
/// same result.
pub fn compose(layers: &[Layer]) -> EffectiveConfig {
    debug_assert!(
        layers.windows(2).all(|w| w[0].rank <= w[1].rank),
        "layers must be pre-sorted by precedence"
    );

    let mut out = Map::new();
    for layer in layers {
        merge_layer(&mut out, &layer.doc);
    }

    strip_strategy_owned(&mut out);
    strip_cross_mode(&mut out);
    inject_pair_aliases(&mut out);

    EffectiveConfig::new(out)
}

fn merge_layer(out: &mut Map<String, Value>, doc: &Map<String, Value>) {
    for (key, value) in doc {
        match policy_for(key) {
            MergePolicy::ReplaceBlock => {
                out.insert(key.clone(), value.clone());
            }
            MergePolicy::Override => match (out.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    deep_merge(existing, incoming);
                }
                _ => {
                    out.insert(key.clone(), value.clone());
                }
            },
        }
    }
}

fn strip_strategy_owned(out: &mut Map<String, Value>) {
    if !matches!(out.get("strategy_parameters"), Some(Value::Object(_))) {
        return;
    }
    for key in STRATEGY_OWNED_KEYS {
        out.remove(*key);
    }
}

/// Spot configs must never carry futures-only keys downstream, even when a
/// lower layer contributed them under `trading_mode = futures`.
fn strip_cross_mode(out: &mut Map<String, Value>) {
    let is_futures = out
        .get("trading_mode")
        .and_then(|v| v.as_str())
        .map(|m| m == "futures")
        .unwrap_or(false);
    if is_futures {
        return;
    }
    for key in FUTURES_ONLY_KEYS {
        out.remove(*key);
    }
}

/// Alias the static whitelist into the pairlist channels the external
/// launcher expects, without overriding explicit settings.
fn inject_pair_aliases(out: &mut Map<String, Value>) {
    let Some(whitelist) = out.get("pair_whitelist").cloned() else {
        return;
    };
    if !out.contains_key("pairlists") {
        out.insert(
            "pairlists".to_string(),
            json!([{"method": "StaticPairList"}]),
        );
    }
    if !out.contains_key("pairs") {
        out.insert("pairs".to_string(), whitelist);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::LayerRank;

    fn layer(name: &str, rank: LayerRank, doc: Value) -> Layer {
        Layer::new(name, rank, doc.as_object().cloned().unwrap())
    }

    #[test]
    fn test_higher_precedence_wins_per_key() {
        let layers = vec![
            layer(
                "defaults",
                LayerRank::SystemDefaults,
                json!({"stake_currency": "USDT", "dry_run": true}),
            ),
            layer("bot", LayerRank::Bot, json!({"stake_currency": "BTC"})),
        ];
        let effective = compose(&layers);

        assert_eq!(effective.get("stake_currency"), Some(&json!("BTC")));
        assert_eq!(effective.get("dry_run"), Some(&json!(true)));
    }

    #[test]
    fn test_compose_is_idempotent() {
        let layers = vec![
            layer(
                "defaults",
                LayerRank::SystemDefaults,
                json!({"entry_pricing": {"price_side": "ask"}, "dry_run": true}),
            ),
            layer(
                "bot",
                LayerRank::Bot,
                json!({"pair_whitelist": ["BTC/USDT"], "stake_amount": 10.0}),
            ),
        ];
        let first = compose(&layers);
        let second = compose(&layers);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(first.doc()).unwrap(),
            serde_json::to_vec(second.doc()).unwrap()
        );
    }

    #[test]
    fn test_atomic_block_replaced_wholesale() {
        let layers = vec![
            layer(
                "defaults",
                LayerRank::SystemDefaults,
                json!({"entry_pricing": {
                    "price_side": "ask",
                    "use_order_book": true,
                    "order_book_top": 5
                }}),
            ),
            layer(
                "bot",
                LayerRank::Bot,
                json!({"entry_pricing": {"price_side": "same"}}),
            ),
        ];
        let effective = compose(&layers);

        // The whole block is the bot's block; no field-wise union with the
        // stale defaults.
        assert_eq!(
            effective.get("entry_pricing"),
            Some(&json!({"price_side": "same"}))
        );
        assert_eq!(effective.get("entry_pricing.use_order_book"), None);
    }

    #[test]
    fn test_non_atomic_blocks_merge_field_level() {
        let layers = vec![
            layer(
                "account",
                LayerRank::Account,
                json!({"exchange": {"name": "binance", "key": "", "secret": ""}}),
            ),
            layer(
                "mode:live",
                LayerRank::ModeOverlay,
                json!({"exchange": {"key": "k", "secret": "s"}}),
            ),
        ];
        let effective = compose(&layers);

        assert_eq!(effective.get("exchange.name"), Some(&json!("binance")));
        assert_eq!(effective.get("exchange.key"), Some(&json!("k")));
    }

    #[test]
    fn test_spot_mode_strips_futures_only_keys() {
        let layers = vec![
            layer(
                "user:futures.json",
                LayerRank::UserDefaults,
                json!({
                    "trading_mode": "futures",
                    "margin_mode": "isolated",
                    "liquidation_buffer": 0.05,
                    "futures_funding_rate": 0.0
                }),
            ),
            layer("bot", LayerRank::Bot, json!({"trading_mode": "spot"})),
        ];
        let effective = compose(&layers);

        assert_eq!(effective.get("trading_mode"), Some(&json!("spot")));
        assert_eq!(effective.get("margin_mode"), None);
        assert_eq!(effective.get("liquidation_buffer"), None);
        assert_eq!(effective.get("futures_funding_rate"), None);
    }

    #[test]
    fn test_futures_mode_keeps_futures_keys() {
        let layers = vec![layer(
            "bot",
            LayerRank::Bot,
            json!({
                "trading_mode": "futures",
                "margin_mode": "isolated",
                "liquidation_buffer": 0.05
            }),
        )];
        let effective = compose(&layers);
        assert_eq!(effective.get("margin_mode"), Some(&json!("isolated")));
    }

    #[test]
    fn test_strategy_owned_keys_stripped_when_channel_exists() {
        let layers = vec![
            layer(
                "bot",
                LayerRank::Bot,
                json!({
                    "timeframe": "5m",
                    "stoploss": -0.1,
                    "unfilledtimeout": {"entry": 10, "exit": 10},
                    "stake_amount": 10.0
                }),
            ),
            layer(
                "meta",
                LayerRank::Meta,
                json!({"strategy_parameters": {"meta": {}}}),
            ),
        ];
        // Note: meta rank is below bot; keep input sorted.
        let mut layers = layers;
        layers.sort_by_key(|l| l.rank);
        let effective = compose(&layers);

        assert_eq!(effective.get("timeframe"), None);
        assert_eq!(effective.get("stoploss"), None);
        assert_eq!(effective.get("unfilledtimeout"), None);
        assert_eq!(effective.get("stake_amount"), Some(&json!(10.0)));
    }

    #[test]
    fn test_strategy_owned_keys_kept_without_channel() {
        let layers = vec![layer(
            "bot",
            LayerRank::Bot,
            json!({"timeframe": "5m", "stoploss": -0.1}),
        )];
        let effective = compose(&layers);
        assert_eq!(effective.get("timeframe"), Some(&json!("5m")));
    }

    #[test]
    fn test_pair_aliases_injected_but_not_overridden() {
        let layers = vec![layer(
            "bot",
            LayerRank::Bot,
            json!({"pair_whitelist": ["BTC/USDT", "ETH/USDT"]}),
        )];
        let effective = compose(&layers);
        assert_eq!(
            effective.get("pairlists"),
            Some(&json!([{"method": "StaticPairList"}]))
        );
        assert_eq!(
            effective.get("pairs"),
            Some(&json!(["BTC/USDT", "ETH/USDT"]))
        );

        let layers = vec![layer(
            "bot",
            LayerRank::Bot,
            json!({
                "pair_whitelist": ["BTC/USDT"],
                "pairlists": [{"method": "VolumePairList"}]
            }),
        )];
        let effective = compose(&layers);
        assert_eq!(
            effective.get("pairlists"),
            Some(&json!([{"method": "VolumePairList"}]))
        );
    }
}
