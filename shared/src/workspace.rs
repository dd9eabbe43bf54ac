//! Workspace filesystem layout and scaffolding.
//!
//! A user workspace is an authoring layer, not a runnable bot:
//!
//! ```text
//! <base>/<name>/user/            user root
//!   configs/account.json
//!   configs/meta.json
//!   configs/user/                optional layered defaults
//!   strategies/
//!   shared/strategies/           repository-wide strategy units
//! <base>/<name>/bots/<bot>/user_data/   bot data root
//!   configs/bot.json
//!   configs/live.json | dryrun.json | backstage.json
//!   strategies/_strategies/
//!   logs/  data/
//! ```

use crate::error::PathError;
use crate::layer::RunMode;
use crate::placeholders;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A user's workspace root (the `user/` directory).
#[derive(Debug, Clone)]
pub struct UserWorkspace {
    root: PathBuf,
}

impl UserWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.root.join("configs")
    }

    pub fn account_path(&self) -> PathBuf {
        self.configs_dir().join("account.json")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.configs_dir().join("meta.json")
    }

    /// Directory of optional user-level default documents, merged in sorted
    /// filename order.
    pub fn user_defaults_dir(&self) -> PathBuf {
        self.configs_dir().join("user")
    }

    /// Repository-wide strategy root shared by every bot in the workspace.
    pub fn shared_strategies_root(&self) -> PathBuf {
        self.root.join("shared").join("strategies")
    }

    /// Resolve a meta `strategy_paths` entry against this workspace.
    pub fn resolve_strategy_path(&self, entry: &str) -> PathBuf {
        let p = Path::new(entry);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

/// A single bot's data root (the `user_data/` directory).
#[derive(Debug, Clone)]
pub struct BotWorkspace {
    root: PathBuf,
}

impl BotWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.root.join("configs")
    }

    pub fn bot_config_path(&self) -> PathBuf {
        self.configs_dir().join("bot.json")
    }

    pub fn mode_overlay_path(&self, mode: RunMode) -> PathBuf {
        self.configs_dir().join(mode.overlay_file_name())
    }

    pub fn generated_config_path(&self) -> PathBuf {
        self.configs_dir().join("config.generated.json")
    }

    pub fn sources_manifest_path(&self) -> PathBuf {
        self.configs_dir().join("config.generated.sources.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Bot-local strategy root, the highest-precedence search root.
    pub fn local_strategies_root(&self) -> PathBuf {
        self.root.join("strategies").join("_strategies")
    }
}

/// Check that a bot data root literally exists and is the expected kind of
/// directory. A failure here is a caller misconfiguration, never recoverable
/// by falling back to a default path.
pub fn ensure_bot_data_root(root: &Path) -> Result<(), PathError> {
    if !root.exists() {
        return Err(PathError::Missing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(PathError::NotADirectory(root.to_path_buf()));
    }
    if root.file_name().and_then(|n| n.to_str()) != Some("user_data") {
        return Err(PathError::WrongKind(root.to_path_buf()));
    }
    Ok(())
}

fn seed_if_missing(path: &Path, doc: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let body = serde_json::to_string_pretty(&serde_json::Value::Object(doc.clone()))?;
    fs::write(path, body).with_context(|| format!("failed to seed {}", path.display()))?;
    Ok(())
}

/// Create (or complete) a user workspace under `base/name`, seeding the
/// account and meta documents when absent. Returns the user root.
pub fn create_workspace(base: &Path, name: &str) -> Result<UserWorkspace> {
    let user = UserWorkspace::new(base.join(name).join("user"));
    fs::create_dir_all(user.user_defaults_dir())
        .with_context(|| format!("failed to create workspace '{name}'"))?;
    fs::create_dir_all(user.root().join("strategies"))?;
    fs::create_dir_all(user.shared_strategies_root())?;

    seed_if_missing(&user.account_path(), &placeholders::account_placeholder())?;
    seed_if_missing(&user.meta_path(), &placeholders::meta_placeholder())?;

    tracing::info!(workspace = name, root = %user.root().display(), "workspace ready");
    Ok(user)
}

/// Create (or complete) a bot runtime workspace next to the user root,
/// seeding bot.json and the mode overlay templates when absent.
pub fn create_bot_workspace(user: &UserWorkspace, bot_name: &str) -> Result<BotWorkspace> {
    let parent = user
        .root()
        .parent()
        .context("user root has no parent directory")?;
    let bot = BotWorkspace::new(parent.join("bots").join(bot_name).join("user_data"));

    fs::create_dir_all(bot.configs_dir())
        .with_context(|| format!("failed to create bot workspace '{bot_name}'"))?;
    fs::create_dir_all(bot.logs_dir())?;
    fs::create_dir_all(bot.root().join("data"))?;
    fs::create_dir_all(bot.local_strategies_root())?;

    seed_if_missing(&bot.bot_config_path(), &placeholders::bot_placeholder())?;
    for mode in [RunMode::Live, RunMode::DryRun, RunMode::Backstage] {
        seed_if_missing(
            &bot.mode_overlay_path(mode),
            &placeholders::mode_overlay_placeholder(mode),
        )?;
    }

    tracing::info!(bot = bot_name, root = %bot.root().display(), "bot workspace ready");
    Ok(bot)
}
