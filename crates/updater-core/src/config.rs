//! Updater configuration
//!
//! The updater reads only its own `update.*` keys from the host's settings
//! store. `update.source` and `update.local_root` are required; everything
//! else has a default.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use updater_fs::SettingsStore;

use crate::diff::PathFilter;
use crate::source::SourceRef;
use crate::{Error, Result};

pub const KEY_SOURCE: &str = "update.source";
pub const KEY_LOCAL_ROOT: &str = "update.local_root";
pub const KEY_REQUIRE_CONFIRMATION: &str = "update.require_confirmation";
pub const KEY_TIMEOUT_SECS: &str = "update.timeout_secs";
pub const KEY_ALLOW_LIST: &str = "update.allow_list";
pub const KEY_EXCLUDE: &str = "update.exclude";

/// Fetch timeout used when the store does not set one
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Scratch directory some installations keep inside the tree
const DEFAULT_EXCLUDE: &str = "update_temp";

/// Everything one orchestrator needs to run a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    pub source: SourceRef,
    pub local_root: PathBuf,
    #[serde(default)]
    pub require_confirmation: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub allow_list: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_exclude() -> Vec<String> {
    vec![DEFAULT_EXCLUDE.to_string()]
}

impl UpdaterConfig {
    pub fn new(source: SourceRef, local_root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            local_root: local_root.into(),
            require_confirmation: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            allow_list: Vec::new(),
            exclude: default_exclude(),
        }
    }

    pub fn with_confirmation(mut self, required: bool) -> Self {
        self.require_confirmation = required;
        self
    }

    /// Read the `update.*` keys from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required key is missing or any key
    /// has the wrong type, and [`Error::InvalidSource`] for a malformed
    /// source reference.
    pub fn from_settings(store: &dyn SettingsStore) -> Result<Self> {
        let source: SourceRef = required_str(store, KEY_SOURCE)?.parse()?;
        let local_root = PathBuf::from(required_str(store, KEY_LOCAL_ROOT)?);

        let require_confirmation = match store.get(KEY_REQUIRE_CONFIRMATION) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            Some(other) => return Err(wrong_type(KEY_REQUIRE_CONFIRMATION, "a boolean", &other)),
        };

        let timeout_secs = match store.get(KEY_TIMEOUT_SECS) {
            None | Some(Value::Null) => DEFAULT_TIMEOUT_SECS,
            Some(value) => match value.as_u64() {
                Some(0) => return Err(Error::config(format!("{KEY_TIMEOUT_SECS} must be positive"))),
                Some(secs) => secs,
                None => return Err(wrong_type(KEY_TIMEOUT_SECS, "a positive integer", &value)),
            },
        };

        let config = Self {
            source,
            local_root,
            require_confirmation,
            timeout_secs,
            allow_list: string_list(store, KEY_ALLOW_LIST)?.unwrap_or_default(),
            exclude: string_list(store, KEY_EXCLUDE)?.unwrap_or_else(default_exclude),
        };
        // Surface bad filter prefixes at load time, not mid-cycle.
        config.path_filter()?;

        tracing::debug!(
            source = %config.source,
            local_root = %config.local_root.display(),
            "Loaded updater configuration"
        );
        Ok(config)
    }

    /// Write every `update.*` key into `store`. Does not persist.
    pub fn write_to(&self, store: &mut dyn SettingsStore) {
        store.set(KEY_SOURCE, Value::String(self.source.to_string()));
        store.set(
            KEY_LOCAL_ROOT,
            Value::String(self.local_root.display().to_string()),
        );
        store.set(
            KEY_REQUIRE_CONFIRMATION,
            Value::Bool(self.require_confirmation),
        );
        store.set(KEY_TIMEOUT_SECS, Value::from(self.timeout_secs));
        store.set(KEY_ALLOW_LIST, Value::from(self.allow_list.clone()));
        store.set(KEY_EXCLUDE, Value::from(self.exclude.clone()));
    }

    /// Settings written into a freshly created store.
    pub fn defaults(source: &SourceRef, local_root: &std::path::Path) -> Map<String, Value> {
        let mut store = updater_fs::MemorySettingsStore::new();
        Self::new(source.clone(), local_root).write_to(&mut store);
        store.into_map()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::from_patterns(&self.allow_list, &self.exclude)
    }
}

fn required_str(store: &dyn SettingsStore, key: &str) -> Result<String> {
    match store.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        None | Some(Value::Null) => Err(Error::config(format!("missing required key {key}"))),
        Some(Value::String(_)) => Err(Error::config(format!("{key} must not be empty"))),
        Some(other) => Err(wrong_type(key, "a string", &other)),
    }
}

fn string_list(store: &dyn SettingsStore, key: &str) -> Result<Option<Vec<String>>> {
    match store.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(wrong_type(key, "a list of strings", &other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(other) => Err(wrong_type(key, "a list of strings", &other)),
    }
}

fn wrong_type(key: &str, expected: &str, found: &Value) -> Error {
    Error::config(format!("{key} must be {expected}, found {found}"))
}
