//! Engine configuration (`scenedoc.toml`).
//!
//! Typed configuration for hosts embedding the engine: store history depth,
//! merge tuning, and per-code strategy overrides. Missing file → all
//! defaults (no error). Unknown fields are rejected with line-level detail.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::merge::{DiffOptions, MergeOptions, Strategy, StrategySet};
use crate::model::conflict::ConflictCode;
use crate::store::StoreConfig;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
///
/// ```toml
/// [store]
/// max_undo_depth = 200
///
/// [merge]
/// yield_every = 1000
/// max_operations = 100000
/// max_auto_resolve_confidence = 0.7
/// fail_on_unresolved = false
///
/// [merge.strategies]
/// "S-ORDER" = "merge"
/// "M-NAME" = "prefer-local"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Document store settings.
    #[serde(default)]
    pub store: StoreSection,

    /// Merge engine settings.
    #[serde(default)]
    pub merge: MergeSection,
}

// ---------------------------------------------------------------------------
// StoreSection
// ---------------------------------------------------------------------------

/// Document store settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Bound on the undo stack (default 200).
    #[serde(default = "default_max_undo_depth")]
    pub max_undo_depth: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_undo_depth: default_max_undo_depth(),
        }
    }
}

const fn default_max_undo_depth() -> usize {
    crate::store::DEFAULT_MAX_UNDO_DEPTH
}

// ---------------------------------------------------------------------------
// MergeSection
// ---------------------------------------------------------------------------

/// Merge engine settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeSection {
    /// Cancellation-check interval in node visits (default 1000).
    #[serde(default = "default_yield_every")]
    pub yield_every: usize,

    /// Safety cap on diff operations (default 100000).
    #[serde(default = "default_max_operations")]
    pub max_operations: usize,

    /// Minimum confidence for automatic resolution (default 0.7).
    #[serde(default = "default_auto_resolve_confidence")]
    pub max_auto_resolve_confidence: f64,

    /// When true, a merge with unresolved conflicts reports failure.
    #[serde(default)]
    pub fail_on_unresolved: bool,

    /// Per-code strategy overrides, keyed by wire code (`"S-ORDER"`) with
    /// wire strategy values (`"prefer-local"`). Validated after parse.
    #[serde(default)]
    pub strategies: BTreeMap<String, String>,
}

impl Default for MergeSection {
    fn default() -> Self {
        Self {
            yield_every: default_yield_every(),
            max_operations: default_max_operations(),
            max_auto_resolve_confidence: default_auto_resolve_confidence(),
            fail_on_unresolved: false,
            strategies: BTreeMap::new(),
        }
    }
}

const fn default_yield_every() -> usize {
    crate::merge::diff::DEFAULT_YIELD_EVERY
}

const fn default_max_operations() -> usize {
    crate::merge::diff::DEFAULT_MAX_OPERATIONS
}

const fn default_auto_resolve_confidence() -> f64 {
    crate::merge::types::DEFAULT_AUTO_RESOLVE_CONFIDENCE
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error loading an engine configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML, unknown fields, or
    ///   invalid strategy entries, returns a [`ConfigError`].
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse
    /// errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields, or invalid
    /// strategy entries.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })?;
        // Surface bad strategy entries at load time, not at first merge.
        config.strategy_set().map(|_| config)
    }

    /// The validated strategy table (defaults plus overrides).
    ///
    /// # Errors
    /// Returns `ConfigError` for an unknown conflict code or strategy name.
    pub fn strategy_set(&self) -> Result<StrategySet, ConfigError> {
        let mut set = StrategySet::default();
        for (code_raw, strategy_raw) in &self.merge.strategies {
            let code: ConflictCode = code_raw.parse().map_err(|e: String| ConfigError {
                path: None,
                message: format!("[merge.strategies]: {e}"),
            })?;
            let strategy: Strategy = strategy_raw.parse().map_err(|e: String| ConfigError {
                path: None,
                message: format!("[merge.strategies] {code_raw}: {e}"),
            })?;
            set.set(code, strategy);
        }
        Ok(set)
    }

    /// Store configuration derived from this file.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_undo_depth: self.store.max_undo_depth,
            persistence_path: None,
        }
    }

    /// Merge options derived from this file.
    ///
    /// # Errors
    /// Returns `ConfigError` for invalid strategy entries.
    pub fn merge_options(&self) -> Result<MergeOptions, ConfigError> {
        Ok(MergeOptions {
            strategies: self.strategy_set()?,
            max_auto_resolve_confidence: Some(self.merge.max_auto_resolve_confidence),
            fail_on_unresolved: self.merge.fail_on_unresolved,
            diff: DiffOptions {
                max_operations: self.merge.max_operations,
                yield_every: self.merge.yield_every,
                ..DiffOptions::default()
            },
            timeout: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
