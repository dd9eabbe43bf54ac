//! File-backed layer store.
//!
//! Reads the named JSON documents that contribute to a bot's effective
//! configuration, always fresh from disk: composition must see the layer set
//! as it is now, never a cached view. A missing document is an empty layer
//! (the validator reports missing keys); a malformed document is an error.

use crate::layer::{deep_merge, EffectiveConfig, Layer, LayerRank, RunMode};
use crate::placeholders;
use crate::workspace::{BotWorkspace, UserWorkspace};
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Read access to one bot's layer documents plus CRUD on the editable ones.
pub struct LayerStore {
    user: UserWorkspace,
    bot: BotWorkspace,
}

impl LayerStore {
    pub fn new(user: UserWorkspace, bot: BotWorkspace) -> Self {
        Self { user, bot }
    }

    pub fn user(&self) -> &UserWorkspace {
        &self.user
    }

    pub fn bot(&self) -> &BotWorkspace {
        &self.bot
    }

    async fn read_doc(path: &Path) -> Result<Option<Map<String, Value>>> {
        match fs::read_to_string(path).await {
            Ok(body) => {
                let value: Value = serde_json::from_str(&body)
                    .with_context(|| format!("malformed JSON document: {}", path.display()))?;
                match value {
                    Value::Object(map) => Ok(Some(map)),
                    Value::Null => Ok(Some(Map::new())),
                    _ => anyhow::bail!("document is not a JSON object: {}", path.display()),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        }
    }

    async fn write_doc(path: &Path, doc: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(&Value::Object(doc.clone()))?;
        fs::write(path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub async fn load_account(&self) -> Result<Map<String, Value>> {
        Ok(Self::read_doc(&self.user.account_path())
            .await?
            .unwrap_or_default())
    }

    /// Meta document merged over its defaults, so consumers can rely on the
    /// recognized keys being present.
    pub async fn load_meta(&self) -> Result<Map<String, Value>> {
        let mut merged = json!({
            "decision_log": {"enable": true, "path": null},
            "strategy_paths": [],
            "strategies": {}
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        if let Some(meta) = Self::read_doc(&self.user.meta_path()).await? {
            deep_merge(&mut merged, &meta);
        }
        Ok(merged)
    }

    pub async fn load_bot(&self) -> Result<Map<String, Value>> {
        Ok(Self::read_doc(&self.bot.bot_config_path())
            .await?
            .unwrap_or_default())
    }

    /// Collect every layer present for this bot, pre-sorted by precedence:
    /// system defaults, user defaults (sorted filename order), account, meta,
    /// bot, mode overlay, then optional runtime injections.
    pub async fn collect_layers(
        &self,
        mode: Option<RunMode>,
        active_strategy: Option<&Value>,
    ) -> Result<Vec<Layer>> {
        let mut layers = vec![Layer::new(
            "defaults",
            LayerRank::SystemDefaults,
            placeholders::system_defaults(),
        )];

        let defaults_dir = self.user.user_defaults_dir();
        if defaults_dir.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&defaults_dir)
                .with_context(|| format!("failed to list {}", defaults_dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect();
            files.sort();
            for file in files {
                if let Some(doc) = Self::read_doc(&file).await? {
                    let label = file
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("user")
                        .to_string();
                    layers.push(Layer::from_file(
                        format!("user:{label}"),
                        LayerRank::UserDefaults,
                        doc,
                        file,
                    ));
                }
            }
        }

        let account = self.load_account().await?;
        if !account.is_empty() {
            // Only the exchange block of the account document feeds the bot
            // config; the rest is account bookkeeping.
            let mut doc = Map::new();
            doc.insert(
                "exchange".to_string(),
                account.get("exchange").cloned().unwrap_or(json!({})),
            );
            layers.push(Layer::from_file(
                "account",
                LayerRank::Account,
                doc,
                self.user.account_path(),
            ));
        }

        let meta = self.load_meta().await?;
        layers.push(Layer::from_file(
            "meta",
            LayerRank::Meta,
            meta_injection(&meta),
            self.user.meta_path(),
        ));

        if let Some(doc) = Self::read_doc(&self.bot.bot_config_path()).await? {
            layers.push(Layer::from_file(
                "bot",
                LayerRank::Bot,
                doc,
                self.bot.bot_config_path(),
            ));
        }

        if let Some(mode) = mode {
            let overlay_path = self.bot.mode_overlay_path(mode);
            if let Some(doc) = Self::read_doc(&overlay_path).await? {
                layers.push(Layer::from_file(
                    format!("mode:{}", mode.as_str()),
                    LayerRank::ModeOverlay,
                    doc,
                    overlay_path,
                ));
            }
        }

        if let Some(active) = active_strategy {
            let mut meta_patch = Map::new();
            meta_patch.insert("active_strategy".to_string(), active.clone());
            layers.push(Layer::new(
                "runtime",
                LayerRank::Runtime,
                meta_injection(&meta_patch),
            ));
        }

        Ok(layers)
    }

    /// Shallow patch with one-level nested-map merge, matching the update
    /// semantics of the config CRUD endpoints.
    fn apply_patch(current: &mut Map<String, Value>, patch: &Map<String, Value>) {
        for (key, value) in patch {
            match (current.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    for (k, v) in incoming {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    current.insert(key.clone(), value.clone());
                }
            }
        }
    }

    pub async fn update_account(&self, patch: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut current = self.load_account().await?;
        Self::apply_patch(&mut current, patch);
        Self::write_doc(&self.user.account_path(), &current).await?;
        Ok(current)
    }

    pub async fn reset_account(&self) -> Result<Map<String, Value>> {
        let doc = placeholders::account_placeholder();
        Self::write_doc(&self.user.account_path(), &doc).await?;
        Ok(doc)
    }

    pub async fn update_bot(&self, patch: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut current = self.load_bot().await?;
        Self::apply_patch(&mut current, patch);
        Self::write_doc(&self.bot.bot_config_path(), &current).await?;
        Ok(current)
    }

    /// Reset the bot document to its placeholder, keeping a customized
    /// pair_whitelist if one exists.
    pub async fn reset_bot(&self) -> Result<Map<String, Value>> {
        let existing = self.load_bot().await?;
        let mut doc = placeholders::bot_placeholder();
        if let Some(whitelist @ Value::Array(items)) = existing.get("pair_whitelist") {
            if !items.is_empty() {
                doc.insert("pair_whitelist".to_string(), whitelist.clone());
            }
        }
        Self::write_doc(&self.bot.bot_config_path(), &doc).await?;
        Ok(doc)
    }

    pub async fn save_meta(&self, meta: &Map<String, Value>) -> Result<Map<String, Value>> {
        Self::write_doc(&self.user.meta_path(), meta).await?;
        self.load_meta().await
    }

    /// Persist the composed config under the bot root for the external
    /// launcher, plus an optional sources manifest for debugging.
    pub async fn write_generated(
        &self,
        effective: &EffectiveConfig,
        layers: &[Layer],
        debug_manifest: bool,
    ) -> Result<PathBuf> {
        let out = self.bot.generated_config_path();
        Self::write_doc(&out, effective.doc()).await?;

        if debug_manifest {
            let mut sources = Map::new();
            for layer in layers {
                if let Some(source) = &layer.source {
                    sources.insert(
                        layer.name.clone(),
                        Value::String(source.display().to_string()),
                    );
                }
            }
            let mut manifest = Map::new();
            manifest.insert(
                "generated_at".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
            manifest.insert("sources".to_string(), Value::Object(sources));
            Self::write_doc(&self.bot.sources_manifest_path(), &manifest).await?;
        }

        tracing::debug!(path = %out.display(), "generated config written");
        Ok(out)
    }
}

/// Mirror a meta document into the channels strategies read it from.
fn meta_injection(meta: &Map<String, Value>) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("meta".to_string(), Value::Object(meta.clone()));
    doc.insert(
        "custom_info".to_string(),
        json!({ "meta": Value::Object(meta.clone()) }),
    );
    doc.insert(
        "strategy_parameters".to_string(),
        json!({ "meta": Value::Object(meta.clone()) }),
    );
    doc
}
