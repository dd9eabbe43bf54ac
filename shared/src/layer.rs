//! Configuration layers and the modes that govern their interpretation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Fixed, total precedence order of configuration layers.
///
/// A key defined by a later (higher) rank always wins over the same key from
/// an earlier rank. The order is part of the external contract and must not
/// be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LayerRank {
    SystemDefaults,
    UserDefaults,
    Account,
    Meta,
    Bot,
    ModeOverlay,
    Runtime,
}

/// One named configuration document contributing to a bot's effective config.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub rank: LayerRank,
    pub doc: Map<String, Value>,
    /// Originating file, when the layer was read from disk. Used only for the
    /// optional sources manifest.
    pub source: Option<PathBuf>,
}

impl Layer {
    pub fn new(name: impl Into<String>, rank: LayerRank, doc: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            rank,
            doc,
            source: None,
        }
    }

    pub fn from_file(
        name: impl Into<String>,
        rank: LayerRank,
        doc: Map<String, Value>,
        source: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            rank,
            doc,
            source: Some(source),
        }
    }
}

/// How a bot is being launched. Governs credential and dry-run rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    DryRun,
    Backstage,
}

impl RunMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Some(RunMode::Live),
            "dryrun" => Some(RunMode::DryRun),
            "backstage" => Some(RunMode::Backstage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Live => "live",
            RunMode::DryRun => "dryrun",
            RunMode::Backstage => "backstage",
        }
    }

    /// Filename of the per-bot mode overlay document.
    pub fn overlay_file_name(&self) -> &'static str {
        match self {
            RunMode::Live => "live.json",
            RunMode::DryRun => "dryrun.json",
            RunMode::Backstage => "backstage.json",
        }
    }
}

/// Spot vs futures. Governs which configuration keys are legal or required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Spot,
    Futures,
}

impl TradingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spot" => Some(TradingMode::Spot),
            "futures" => Some(TradingMode::Futures),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Spot => "spot",
            TradingMode::Futures => "futures",
        }
    }
}

/// The single document produced by composing all layers present for a bot.
///
/// Ephemeral: recomputed per launch attempt, never cached across layer
/// mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig(Map<String, Value>);

impl EffectiveConfig {
    pub fn new(doc: Map<String, Value>) -> Self {
        Self(doc)
    }

    pub fn doc(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn doc_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Dotted-path lookup, e.g. `effective.get("entry_pricing.price_side")`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        dig(&self.0, path)
    }
}

/// Recursive field-level merge of `b` into `a`. Nested objects merge
/// field-by-field; everything else is replaced by `b`'s value.
///
/// Atomic-block replacement is a composer concern and deliberately not
/// handled here.
pub fn deep_merge(a: &mut Map<String, Value>, b: &Map<String, Value>) {
    for (key, value) in b {
        match (a.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                a.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Look up a dotted key path (e.g. `entry_pricing.price_side`) in a document.
pub fn dig<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut current: Option<&Value> = None;
    for part in path.split('.') {
        current = match current {
            None => doc.get(part),
            Some(Value::Object(obj)) => obj.get(part),
            Some(_) => None,
        };
        current?;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rank_order_is_total() {
        let ranks = [
            LayerRank::SystemDefaults,
            LayerRank::UserDefaults,
            LayerRank::Account,
            LayerRank::Meta,
            LayerRank::Bot,
            LayerRank::ModeOverlay,
            LayerRank::Runtime,
        ];
        for pair in ranks.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_dig_nested_paths() {
        let doc = json!({
            "entry_pricing": {"price_side": "ask", "price_last_balance": 0.0},
            "stake_currency": "USDT"
        });
        let doc = doc.as_object().unwrap();

        assert_eq!(
            dig(doc, "entry_pricing.price_side"),
            Some(&json!("ask"))
        );
        assert_eq!(dig(doc, "stake_currency"), Some(&json!("USDT")));
        assert_eq!(dig(doc, "entry_pricing.missing"), None);
        assert_eq!(dig(doc, "stake_currency.nested"), None);
        assert_eq!(dig(doc, "nope"), None);
    }

    #[test]
    fn test_deep_merge_is_field_level() {
        let mut a = json!({"exchange": {"name": "binance", "key": ""}, "dry_run": true})
            .as_object()
            .cloned()
            .unwrap();
        let b = json!({"exchange": {"key": "k"}, "dry_run": false})
            .as_object()
            .cloned()
            .unwrap();
        deep_merge(&mut a, &b);

        assert_eq!(dig(&a, "exchange.name"), Some(&json!("binance")));
        assert_eq!(dig(&a, "exchange.key"), Some(&json!("k")));
        assert_eq!(dig(&a, "dry_run"), Some(&json!(false)));
    }

    #[test]
    fn test_run_mode_parsing() {
        assert_eq!(RunMode::parse("LIVE"), Some(RunMode::Live));
        assert_eq!(RunMode::parse("dryrun"), Some(RunMode::DryRun));
        assert_eq!(RunMode::parse("backstage"), Some(RunMode::Backstage));
        assert_eq!(RunMode::parse("paper"), None);
        assert_eq!(RunMode::DryRun.overlay_file_name(), "dryrun.json");
    }
}
