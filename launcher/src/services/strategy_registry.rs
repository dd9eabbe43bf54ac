//! Strategy discovery and resolution.
//!
//! Search roots are visited in precedence order: the bot-local strategies
//! root, then each meta-configured extra path, then the workspace's shared
//! root. Within the scan, roots are temporarily injected into a process-wide
//! loader-path cell; the cell is mutex-guarded, so concurrent discovery calls
//! serialize, and the prior path set is restored on every exit path.
//!
//! Names are claimed first-occurrence-wins at the root level: once a
//! higher-precedence root owns a name, same-named units in later roots are
//! ignored. Resolution never falls back to a default strategy.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use shared::{dig, BotWorkspace, DiscoveryError, UserWorkspace};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Names of the designated base abstraction. Units may subclass these but the
/// bases themselves are never candidates.
const BASE_ABSTRACTIONS: &[&str] = &["BaseStrategy", "MainStrategy", "IStrategy"];

/// How a unit earned its place in the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Declares one of the designated base abstractions as its base.
    Subclass,
    /// Exposes both an entry-signal and an exit-signal member.
    DuckTyped,
}

/// A strategy unit accepted during discovery, eligible for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCandidate {
    pub name: String,
    /// Fully-qualified locator, `<unit file>:<class name>`.
    pub locator: String,
    pub acceptance: Acceptance,
    /// Rank of the search root that claimed the name (0 = highest precedence).
    pub root_rank: usize,
}

/// Reference to the strategy that should govern a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveStrategyRef {
    /// Bare name, resolved against the discovered candidate set.
    Name(String),
    /// `<file>:<ClassName>` locator, resolved directly and bypassing the
    /// candidate table.
    Locator(String),
}

impl ActiveStrategyRef {
    /// Derive the active reference from the meta document
    /// (`active_strategy.class` wins over `active_strategy.name`), falling
    /// back to the bot document's `strategy` key.
    pub fn from_config(meta: &Map<String, Value>, bot: &Map<String, Value>) -> Option<Self> {
        if let Some(class) = dig(meta, "active_strategy.class").and_then(Value::as_str) {
            if !class.is_empty() {
                return Some(ActiveStrategyRef::Locator(class.to_string()));
            }
        }
        if let Some(name) = dig(meta, "active_strategy.name").and_then(Value::as_str) {
            if !name.is_empty() {
                return Some(ActiveStrategyRef::Name(name.to_string()));
            }
        }
        bot.get("strategy")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(|s| ActiveStrategyRef::Name(s.to_string()))
    }
}

/// A filesystem location scanned for strategy units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    pub path: PathBuf,
    pub rank: usize,
}

/// Assemble the ordered search roots for one bot. Non-existent roots are
/// dropped (never substituted); duplicates keep their first occurrence.
pub fn build_search_roots(
    user: &UserWorkspace,
    bot: &BotWorkspace,
    meta: &Map<String, Value>,
) -> Vec<SearchRoot> {
    let mut ordered: Vec<PathBuf> = vec![bot.local_strategies_root()];
    if let Some(extras) = meta.get("strategy_paths").and_then(Value::as_array) {
        for entry in extras.iter().filter_map(Value::as_str) {
            ordered.push(user.resolve_strategy_path(entry));
        }
    }
    ordered.push(user.shared_strategies_root());

    let mut roots: Vec<SearchRoot> = Vec::new();
    for path in ordered {
        let Ok(canonical) = path.canonicalize() else {
            tracing::debug!(path = %path.display(), "dropping non-existent search root");
            continue;
        };
        if !canonical.is_dir() {
            continue;
        }
        if roots.iter().any(|r| r.path == canonical) {
            continue;
        }
        roots.push(SearchRoot {
            path: canonical,
            rank: roots.len(),
        });
    }
    roots
}

static LOADER_PATHS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// Current contents of the process-wide loader-path cell.
pub fn loader_paths_snapshot() -> Vec<PathBuf> {
    LOADER_PATHS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Scoped injection into the loader-path cell. Holding the guard is the
/// critical section that serializes concurrent discovery; dropping it
/// restores the prior path set on every exit path, unwinding included.
struct ScopedLoaderPaths {
    guard: MutexGuard<'static, Vec<PathBuf>>,
    saved: Vec<PathBuf>,
}

impl ScopedLoaderPaths {
    fn inject(roots: &[SearchRoot]) -> Self {
        let mut guard = LOADER_PATHS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let injected = roots.iter().map(|r| r.path.clone()).collect();
        let saved = std::mem::replace(&mut *guard, injected);
        Self { guard, saved }
    }
}

impl Drop for ScopedLoaderPaths {
    fn drop(&mut self) {
        *self.guard = std::mem::take(&mut self.saved);
    }
}

/// The discovered candidate table for one launch attempt.
pub struct StrategyRegistry {
    roots: Vec<SearchRoot>,
    candidates: Vec<StrategyCandidate>,
}

impl StrategyRegistry {
    /// Scan the given roots and build the candidate table.
    pub fn discover(roots: Vec<SearchRoot>) -> Result<Self> {
        let _scope = ScopedLoaderPaths::inject(&roots);

        let mut candidates: Vec<StrategyCandidate> = Vec::new();
        for root in &roots {
            for file in unit_files(&root.path)? {
                let defs = match read_unit(&file) {
                    Ok(defs) => defs,
                    Err(e) => {
                        tracing::debug!(file = %file.display(), error = %e, "skipping unreadable unit");
                        continue;
                    }
                };
                for (name, acceptance) in defs {
                    if candidates.iter().any(|c| c.name == name) {
                        tracing::debug!(
                            name,
                            file = %file.display(),
                            "name already claimed by a higher-precedence root"
                        );
                        continue;
                    }
                    candidates.push(StrategyCandidate {
                        locator: format!("{}:{}", file.display(), name),
                        name,
                        acceptance,
                        root_rank: root.rank,
                    });
                }
            }
        }

        tracing::debug!(
            roots = roots.len(),
            candidates = candidates.len(),
            "strategy discovery complete"
        );
        Ok(Self { roots, candidates })
    }

    pub fn candidates(&self) -> &[StrategyCandidate] {
        &self.candidates
    }

    pub fn roots(&self) -> &[SearchRoot] {
        &self.roots
    }

    /// Bind the active reference to exactly one candidate.
    pub fn resolve(&self, refr: &ActiveStrategyRef) -> Result<StrategyCandidate, DiscoveryError> {
        match refr {
            ActiveStrategyRef::Name(name) => self
                .candidates
                .iter()
                .find(|c| &c.name == name)
                .cloned()
                .ok_or_else(|| DiscoveryError::UnknownName(name.clone())),
            ActiveStrategyRef::Locator(locator) => self.resolve_locator(locator),
        }
    }

    fn resolve_locator(&self, locator: &str) -> Result<StrategyCandidate, DiscoveryError> {
        let Some((file, class)) = locator.rsplit_once(':') else {
            return Err(DiscoveryError::InvalidLocator(locator.to_string()));
        };
        if file.is_empty() || class.is_empty() {
            return Err(DiscoveryError::InvalidLocator(locator.to_string()));
        }

        let path = self.locate_unit_file(Path::new(file)).ok_or_else(|| {
            DiscoveryError::UnitUnreadable {
                path: PathBuf::from(file),
                reason: "file not found in any search root".to_string(),
            }
        })?;

        let defs = read_unit(&path).map_err(|e| DiscoveryError::UnitUnreadable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        defs.into_iter()
            .find(|(name, _)| name == class)
            .map(|(name, acceptance)| StrategyCandidate {
                locator: format!("{}:{}", path.display(), name),
                name,
                acceptance,
                // Direct resolution bypasses the root ranking.
                root_rank: usize::MAX,
            })
            .ok_or_else(|| DiscoveryError::NotACandidate {
                path,
                name: class.to_string(),
            })
    }

    fn locate_unit_file(&self, file: &Path) -> Option<PathBuf> {
        if file.is_absolute() {
            return file.is_file().then(|| file.to_path_buf());
        }
        self.roots
            .iter()
            .map(|root| root.path.join(file))
            .find(|p| p.is_file())
    }
}

/// Recursively list unit files under a root, sorted for stable precedence
/// within the root. Files with a leading underscore are helper material, not
/// units.
fn unit_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to scan search root {}", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to scan search root {}", dir.display()))?
                .path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('_'))
                .unwrap_or(true);
            if path.is_dir() {
                pending.push(path);
            } else if !hidden && path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Parse a unit file into its acceptable strategy definitions. A unit may
/// hold a single definition object or an array of them; definitions that
/// satisfy neither capability are excluded, not errors.
fn read_unit(path: &Path) -> Result<Vec<(String, Acceptance)>> {
    let body = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&body)?;
    let defs = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(defs.iter().filter_map(classify).collect())
}

/// Capability check: a definition is a candidate if it names a designated
/// base abstraction as its base, or exposes both signal members. The base
/// abstractions themselves are excluded.
fn classify(def: &Value) -> Option<(String, Acceptance)> {
    let obj = def.as_object()?;
    let name = obj.get("name")?.as_str()?.to_string();
    if BASE_ABSTRACTIONS.contains(&name.as_str()) {
        return None;
    }

    if let Some(base) = obj.get("base").and_then(Value::as_str) {
        if BASE_ABSTRACTIONS.contains(&base) {
            return Some((name, Acceptance::Subclass));
        }
    }

    let entry = obj.get("entry_signal").map(is_signal_member).unwrap_or(false);
    let exit = obj.get("exit_signal").map(is_signal_member).unwrap_or(false);
    if entry && exit {
        return Some((name, Acceptance::DuckTyped));
    }
    None
}

/// A signal member describes how to compute a signal from a market-data
/// table: either a rule object or a non-empty expression string.
fn is_signal_member(v: &Value) -> bool {
    match v {
        Value::Object(_) => true,
        Value::String(s) => !s.trim().is_empty(),
        _ => false,
    }
}
