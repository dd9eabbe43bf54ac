//! Error taxonomy for the launch core.
//!
//! Structural/semantic defects are collected into `Vec<ValidationError>` and
//! returned in full so callers can display every problem at once. `PathError`
//! and `DiscoveryError` abort a launch attempt immediately: they mean the
//! attempt cannot proceed under any interpretation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Whether a validation defect is a missing/mistyped key or a mode rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    Semantic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Structural => write!(f, "structural"),
            ErrorKind::Semantic => write!(f, "semantic"),
        }
    }
}

/// One defect found while validating a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error at '{field}': {message}")]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn structural(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Structural,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn semantic(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Semantic,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The bot data root is missing or malformed. Always fatal: a bad root means
/// the caller misconfigured the workspace, not that the bot needs fixing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("bot data root does not exist: {}", .0.display())]
    Missing(PathBuf),
    #[error("bot data root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("bot data root must be a 'user_data' directory (got '{}')", .0.display())]
    WrongKind(PathBuf),
}

/// A strategy reference could not be bound to exactly one discovered unit.
/// Never downgraded to a default strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("no discovered strategy is named '{0}'")]
    UnknownName(String),
    #[error("invalid strategy locator '{0}' (expected '<file>:<ClassName>')")]
    InvalidLocator(String),
    #[error("strategy unit '{}' could not be loaded: {reason}", path.display())]
    UnitUnreadable { path: PathBuf, reason: String },
    #[error("unit '{}' does not define an acceptable strategy named '{name}'", path.display())]
    NotACandidate { path: PathBuf, name: String },
    #[error("user-level bot start was removed; start bots individually")]
    LegacyEntryPoint,
}
