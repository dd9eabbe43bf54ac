//! Start sequencing.
//!
//! One launch attempt drives Validate → Compose → Resolve and only then hands
//! the ready bundle to the external launcher. Any non-empty validation list
//! short-circuits the attempt; compose and resolve are never run against a
//! defective document set. There is no retry loop here and no partial or
//! degraded launch mode.

use crate::services::config_service::compose;
use crate::services::strategy_registry::{
    build_search_roots, ActiveStrategyRef, StrategyCandidate, StrategyRegistry,
};
use crate::services::validation_service::validate;
use anyhow::{Context, Result};
use serde_json::Value;
use shared::workspace::ensure_bot_data_root;
use shared::{
    BotWorkspace, Config, DiscoveryError, EffectiveConfig, LayerStore, RunMode, UserWorkspace,
    ValidationError,
};
use std::path::PathBuf;
use uuid::Uuid;

/// Sequencer states. Transitions are one-shot per launch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Idle,
    Validating,
    Composed,
    Resolving,
    Ready,
    Failed,
    HandedOff,
}

/// Why an attempt ended in `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchFailure {
    Validation(Vec<ValidationError>),
    Discovery(DiscoveryError),
}

/// Everything the external launcher needs to spawn the bot.
#[derive(Debug, Clone)]
pub struct ReadyBundle {
    pub attempt_id: Uuid,
    pub effective: EffectiveConfig,
    pub strategy: StrategyCandidate,
    pub generated_config: PathBuf,
}

/// Result of one launch attempt. `Failed` carries the complete defect list
/// (or the discovery error); the workspace is left untouched.
#[derive(Debug, Clone)]
pub enum LaunchOutcome {
    Ready(ReadyBundle),
    Failed(LaunchFailure),
}

/// Seam to the external process launcher. Spawning, supervision and timeouts
/// are its concern, not ours.
pub trait LaunchHandler {
    fn handle(&self, bundle: &ReadyBundle) -> Result<()>;
}

/// The per-attempt state machine.
pub struct StartSequencer<'a> {
    store: &'a LayerStore,
    config: &'a Config,
    attempt_id: Uuid,
    state: LaunchState,
}

impl<'a> StartSequencer<'a> {
    pub fn new(store: &'a LayerStore, config: &'a Config) -> Self {
        Self {
            store,
            config,
            attempt_id: Uuid::new_v4(),
            state: LaunchState::Idle,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    /// Run the attempt to `Ready` or `Failed`. A missing or malformed data
    /// root is returned as a hard error: it signals caller misconfiguration,
    /// never a validation defect.
    pub async fn run(
        &mut self,
        mode: Option<RunMode>,
        active_strategy: Option<&Value>,
    ) -> Result<LaunchOutcome> {
        anyhow::ensure!(
            self.state == LaunchState::Idle,
            "launch attempt {} already ran",
            self.attempt_id
        );

        ensure_bot_data_root(self.store.bot().root())?;

        self.state = LaunchState::Validating;
        let account = self.store.load_account().await?;
        let bot_doc = self.store.load_bot().await?;
        let mode = mode.or_else(|| {
            bot_doc
                .get("mode")
                .and_then(Value::as_str)
                .and_then(RunMode::parse)
        });

        let errors = validate(&account, &bot_doc, mode);
        if !errors.is_empty() {
            tracing::warn!(
                attempt = %self.attempt_id,
                defects = errors.len(),
                "configuration validation failed; bot not started"
            );
            self.state = LaunchState::Failed;
            return Ok(LaunchOutcome::Failed(LaunchFailure::Validation(errors)));
        }

        let layers = self
            .store
            .collect_layers(mode, active_strategy)
            .await
            .context("failed to collect configuration layers")?;
        let effective = compose(&layers);
        self.state = LaunchState::Composed;

        self.state = LaunchState::Resolving;
        let mut meta = self.store.load_meta().await?;
        if let Some(active) = active_strategy {
            meta.insert("active_strategy".to_string(), active.clone());
        }
        let refr = ActiveStrategyRef::from_config(&meta, &bot_doc)
            .context("no active strategy reference after validation")?;

        let roots = build_search_roots(self.store.user(), self.store.bot(), &meta);
        let registry = StrategyRegistry::discover(roots)?;
        match registry.resolve(&refr) {
            Ok(strategy) => {
                let generated = self
                    .store
                    .write_generated(&effective, &layers, self.config.config_debug)
                    .await?;
                self.state = LaunchState::Ready;
                tracing::info!(
                    attempt = %self.attempt_id,
                    strategy = %strategy.name,
                    config = %generated.display(),
                    "launch bundle ready"
                );
                Ok(LaunchOutcome::Ready(ReadyBundle {
                    attempt_id: self.attempt_id,
                    effective,
                    strategy,
                    generated_config: generated,
                }))
            }
            Err(e) => {
                tracing::warn!(attempt = %self.attempt_id, error = %e, "strategy resolution failed");
                self.state = LaunchState::Failed;
                Ok(LaunchOutcome::Failed(LaunchFailure::Discovery(e)))
            }
        }
    }

    /// Hand a ready bundle to the external launcher. Only legal from `Ready`.
    pub fn hand_off(&mut self, bundle: &ReadyBundle, handler: &dyn LaunchHandler) -> Result<()> {
        anyhow::ensure!(
            self.state == LaunchState::Ready,
            "hand-off requires a ready attempt (state: {:?})",
            self.state
        );
        handler.handle(bundle)?;
        self.state = LaunchState::HandedOff;
        Ok(())
    }
}

/// Facade over the sequencer for callers that hold workspaces rather than
/// stores.
pub struct BotService {
    config: Config,
}

impl BotService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Validate, compose and resolve; never spawns anything.
    pub async fn prepare_launch(
        &self,
        user: &UserWorkspace,
        bot: &BotWorkspace,
        mode: Option<RunMode>,
        active_strategy: Option<&Value>,
    ) -> Result<LaunchOutcome> {
        let store = LayerStore::new(user.clone(), bot.clone());
        let mut sequencer = StartSequencer::new(&store, &self.config);
        sequencer.run(mode, active_strategy).await
    }

    /// Full flow: prepare, then hand a ready bundle to the launcher.
    pub async fn launch(
        &self,
        user: &UserWorkspace,
        bot: &BotWorkspace,
        mode: Option<RunMode>,
        active_strategy: Option<&Value>,
        handler: &dyn LaunchHandler,
    ) -> Result<LaunchOutcome> {
        let store = LayerStore::new(user.clone(), bot.clone());
        let mut sequencer = StartSequencer::new(&store, &self.config);
        let outcome = sequencer.run(mode, active_strategy).await?;
        if let LaunchOutcome::Ready(bundle) = &outcome {
            sequencer.hand_off(bundle, handler)?;
        }
        Ok(outcome)
    }
}

/// Removed user-level start. Kept so stale callers fail loudly instead of
/// launching with a default path; nothing may downgrade this to a warning.
pub fn start_user_level_bot(_user: &UserWorkspace) -> Result<LaunchOutcome, DiscoveryError> {
    Err(DiscoveryError::LegacyEntryPoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_entry_point_always_errors() {
        let user = UserWorkspace::new("/tmp/ws/alice/user");
        assert_eq!(
            start_user_level_bot(&user).unwrap_err(),
            DiscoveryError::LegacyEntryPoint
        );
    }
}
