//! Launch core for workspace-managed bots.
//!
//! Decides, for a given bot, exactly which settings and which strategy
//! definition govern a launch:
//!
//! - **Composer**: merges the ordered layer stack into one effective config.
//! - **Validator**: reports every structural and semantic defect at once.
//! - **Strategy registry**: discovers candidate strategy units across ranked
//!   search roots and resolves the active reference to exactly one of them.
//! - **Start sequencer**: Validate → Compose → Resolve → hand-off, failing
//!   loudly instead of falling back.
//!
//! HTTP routing, indicator math, decision-log persistence and process
//! supervision live elsewhere; this crate stops at the ready-to-launch
//! bundle.

pub mod services;

pub use services::bot_service::{
    start_user_level_bot, BotService, LaunchFailure, LaunchHandler, LaunchOutcome, LaunchState,
    ReadyBundle, StartSequencer,
};
pub use services::config_service::compose;
pub use services::strategy_registry::{
    build_search_roots, loader_paths_snapshot, Acceptance, ActiveStrategyRef, SearchRoot,
    StrategyCandidate, StrategyRegistry,
};
pub use services::validation_service::validate;
