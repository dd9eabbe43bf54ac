//! End-to-end launch sequencing against real workspace trees.

use launcher::{
    ActiveStrategyRef, BotService, LaunchFailure, LaunchHandler, LaunchOutcome, ReadyBundle,
};
use serde_json::{json, Value};
use shared::workspace::{create_bot_workspace, create_workspace};
use shared::{
    BotWorkspace, Config, DiscoveryError, ErrorKind, LayerStore, PathError, RunMode, UserWorkspace,
};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// Scaffold a workspace with one bot wired to a discoverable strategy.
async fn setup() -> (tempfile::TempDir, UserWorkspace, BotWorkspace) {
    let tmp = tempfile::tempdir().unwrap();
    let user = create_workspace(tmp.path(), "alice").unwrap();
    let bot = create_bot_workspace(&user, "scalper").unwrap();

    let store = LayerStore::new(user.clone(), bot.clone());
    let patch = json!({"strategy": "TrendStrategy"}).as_object().cloned().unwrap();
    store.update_bot(&patch).await.unwrap();

    write_unit(
        &bot.local_strategies_root(),
        "trend.json",
        &json!({"name": "TrendStrategy", "base": "MainStrategy"}),
    );

    (tmp, user, bot)
}

fn write_unit(dir: &Path, file: &str, body: &Value) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(file), serde_json::to_string_pretty(body).unwrap()).unwrap();
}

fn service() -> BotService {
    BotService::new(Config::default())
}

#[tokio::test]
async fn test_prepare_launch_reaches_ready() {
    let (_tmp, user, bot) = setup().await;

    let outcome = service()
        .prepare_launch(&user, &bot, Some(RunMode::DryRun), None)
        .await
        .unwrap();

    let LaunchOutcome::Ready(bundle) = outcome else {
        panic!("expected Ready, got {outcome:?}");
    };
    assert_eq!(bundle.strategy.name, "TrendStrategy");
    assert_eq!(bundle.strategy.root_rank, 0);

    // The composed config reaches the launcher with pair aliases injected
    // and strategy-owned keys stripped.
    assert_eq!(bundle.effective.get("pairs"), Some(&json!(["BTC/USDT", "ETH/USDT"])));
    assert_eq!(bundle.effective.get("dry_run"), Some(&json!(true)));
    assert_eq!(bundle.effective.get("unfilledtimeout"), None);
    assert_eq!(bundle.effective.get("timeframe"), None);

    let written: Value =
        serde_json::from_str(&fs::read_to_string(&bundle.generated_config).unwrap()).unwrap();
    assert_eq!(written["stake_currency"], "USDT");
}

#[tokio::test]
async fn test_validation_failure_short_circuits_before_compose() {
    let (_tmp, user, bot) = setup().await;
    // Drop two required keys: both must be reported, and nothing composed.
    let doc: Value =
        serde_json::from_str(&fs::read_to_string(bot.bot_config_path()).unwrap()).unwrap();
    let mut doc = doc.as_object().cloned().unwrap();
    doc.remove("pair_whitelist");
    doc.remove("stake_currency");
    fs::write(
        bot.bot_config_path(),
        serde_json::to_string_pretty(&Value::Object(doc)).unwrap(),
    )
    .unwrap();

    let outcome = service()
        .prepare_launch(&user, &bot, Some(RunMode::DryRun), None)
        .await
        .unwrap();

    let LaunchOutcome::Failed(LaunchFailure::Validation(errors)) = outcome else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.len(), 2);
    assert!(!bot.generated_config_path().exists());
}

#[tokio::test]
async fn test_live_mode_with_empty_credentials_fails_with_two_semantic_errors() {
    let (_tmp, user, bot) = setup().await;
    let store = LayerStore::new(user.clone(), bot.clone());
    let patch = json!({"dry_run": false}).as_object().cloned().unwrap();
    store.update_bot(&patch).await.unwrap();

    let outcome = service()
        .prepare_launch(&user, &bot, Some(RunMode::Live), None)
        .await
        .unwrap();

    let LaunchOutcome::Failed(LaunchFailure::Validation(errors)) = outcome else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.kind == ErrorKind::Semantic));
    assert!(errors.iter().any(|e| e.field == "exchange.key"));
    assert!(errors.iter().any(|e| e.field == "exchange.secret"));
}

#[tokio::test]
async fn test_unknown_strategy_name_is_a_discovery_failure() {
    let (_tmp, user, bot) = setup().await;
    let outcome = service()
        .prepare_launch(
            &user,
            &bot,
            Some(RunMode::DryRun),
            Some(&json!({"name": "MomentumPullbackStrategy"})),
        )
        .await
        .unwrap();

    let LaunchOutcome::Failed(LaunchFailure::Discovery(err)) = outcome else {
        panic!("expected discovery failure");
    };
    assert_eq!(
        err,
        DiscoveryError::UnknownName("MomentumPullbackStrategy".to_string())
    );
    assert!(!bot.generated_config_path().exists());
}

#[tokio::test]
async fn test_bot_local_root_outranks_shared_root() {
    let (_tmp, user, bot) = setup().await;
    // Same name in the shared root, accepted through the other capability.
    write_unit(
        &user.shared_strategies_root(),
        "trend.json",
        &json!({
            "name": "TrendStrategy",
            "entry_signal": "ema_fast > ema_slow",
            "exit_signal": "ema_fast < ema_slow"
        }),
    );

    let outcome = service()
        .prepare_launch(&user, &bot, Some(RunMode::DryRun), None)
        .await
        .unwrap();

    let LaunchOutcome::Ready(bundle) = outcome else {
        panic!("expected Ready");
    };
    assert_eq!(bundle.strategy.root_rank, 0);
    assert_eq!(bundle.strategy.acceptance, launcher::Acceptance::Subclass);
}

#[tokio::test]
async fn test_active_strategy_locator_bypasses_discovery() {
    let (_tmp, user, bot) = setup().await;
    let unit = user.shared_strategies_root().join("_private.json");
    write_unit(
        &user.shared_strategies_root(),
        "_private.json",
        &json!({"name": "PrivateStrategy", "base": "MainStrategy"}),
    );

    let locator = format!("{}:PrivateStrategy", unit.display());
    let outcome = service()
        .prepare_launch(
            &user,
            &bot,
            Some(RunMode::DryRun),
            Some(&json!({"class": locator})),
        )
        .await
        .unwrap();

    let LaunchOutcome::Ready(bundle) = outcome else {
        panic!("expected Ready");
    };
    assert_eq!(bundle.strategy.name, "PrivateStrategy");
}

#[tokio::test]
async fn test_missing_data_root_is_fatal() {
    let (tmp, user, _bot) = setup().await;
    let ghost = BotWorkspace::new(tmp.path().join("nowhere").join("user_data"));

    let err = service()
        .prepare_launch(&user, &ghost, Some(RunMode::DryRun), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PathError>(),
        Some(PathError::Missing(_))
    ));
}

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<ReadyBundle>>,
}

impl LaunchHandler for RecordingHandler {
    fn handle(&self, bundle: &ReadyBundle) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(bundle.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_launch_hands_ready_bundle_to_handler() {
    let (_tmp, user, bot) = setup().await;
    let handler = RecordingHandler::default();

    let outcome = service()
        .launch(&user, &bot, Some(RunMode::DryRun), None, &handler)
        .await
        .unwrap();

    assert!(matches!(outcome, LaunchOutcome::Ready(_)));
    let seen = handler.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].strategy.name, "TrendStrategy");
}

#[tokio::test]
async fn test_failed_attempt_never_reaches_handler() {
    let (_tmp, user, bot) = setup().await;
    let handler = RecordingHandler::default();

    let outcome = service()
        .launch(
            &user,
            &bot,
            Some(RunMode::DryRun),
            Some(&json!({"name": "NoSuchStrategy"})),
            &handler,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, LaunchOutcome::Failed(_)));
    assert!(handler.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_meta_active_strategy_name_governs_resolution() {
    let (_tmp, user, bot) = setup().await;
    write_unit(
        &bot.local_strategies_root(),
        "dip.json",
        &json!({
            "name": "DipBuyer",
            "entry_signal": {"indicator": "rsi", "below": 30},
            "exit_signal": {"indicator": "rsi", "above": 70}
        }),
    );
    let meta = json!({"active_strategy": {"name": "DipBuyer"}, "strategy_paths": []})
        .as_object()
        .cloned()
        .unwrap();
    let store = LayerStore::new(user.clone(), bot.clone());
    store.save_meta(&meta).await.unwrap();

    let outcome = service()
        .prepare_launch(&user, &bot, Some(RunMode::DryRun), None)
        .await
        .unwrap();

    let LaunchOutcome::Ready(bundle) = outcome else {
        panic!("expected Ready");
    };
    assert_eq!(bundle.strategy.name, "DipBuyer");
    assert_eq!(bundle.strategy.acceptance, launcher::Acceptance::DuckTyped);
}

#[tokio::test]
async fn test_active_ref_prefers_class_locator_over_name() {
    let meta = json!({
        "active_strategy": {"name": "ByName", "class": "units/custom.json:ByClass"}
    })
    .as_object()
    .cloned()
    .unwrap();
    let bot = json!({"strategy": "Fallback"}).as_object().cloned().unwrap();

    assert_eq!(
        ActiveStrategyRef::from_config(&meta, &bot),
        Some(ActiveStrategyRef::Locator(
            "units/custom.json:ByClass".to_string()
        ))
    );

    let empty_meta = serde_json::Map::new();
    assert_eq!(
        ActiveStrategyRef::from_config(&empty_meta, &bot),
        Some(ActiveStrategyRef::Name("Fallback".to_string()))
    );
}
