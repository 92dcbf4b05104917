//! Key-value settings store
//!
//! The host keeps its settings in a small JSON (or TOML) file. The updater
//! only needs `get`, `set` and `persist` over it, so values are exposed as
//! JSON regardless of the on-disk format.
//!
//! Keys are dotted (`update.source`). A key matches either a literal entry
//! of that name or the same path through nested tables, so both
//! `{"update.source": ..}` in JSON and `[update] source = ..` in TOML work.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::io::{self, WriteOptions};
use crate::{Error, Result};

/// Narrow settings boundary consumed by the updater.
pub trait SettingsStore: Send + Sync {
    /// Read a value, `None` when the key is absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// Set a value in memory. Call [`SettingsStore::persist`] to save it.
    fn set(&mut self, key: &str, value: Value);

    /// Write the current values to the backing storage.
    fn persist(&self) -> Result<()>;
}

/// On-disk settings formats, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Json,
    Toml,
}

impl SettingsFormat {
    /// Detect the format of a settings file:
    /// - `.json` -> JSON
    /// - `.toml` -> TOML
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            _ => Err(Error::UnsupportedFormat { extension }),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Toml => "TOML",
        }
    }
}

/// Settings persisted to a JSON or TOML file.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    format: SettingsFormat,
    values: Map<String, Value>,
    options: WriteOptions,
}

impl FileSettingsStore {
    /// Load settings from `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = SettingsFormat::from_path(&path)?;

        let values = match fs::read_to_string(&path) {
            Ok(content) => parse(format, &content, &path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(Error::io(&path, e)),
        };

        Ok(Self {
            path,
            format,
            values,
            options: WriteOptions::default(),
        })
    }

    /// Load settings from `path`, first writing `defaults` to it when the
    /// file does not exist yet.
    pub fn open_or_init(path: impl Into<PathBuf>, defaults: Map<String, Value>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            return Self::open(path);
        }

        tracing::debug!(path = %path.display(), "Settings file missing, writing defaults");
        let mut store = Self {
            format: SettingsFormat::from_path(&path)?,
            path,
            values: Map::new(),
            options: WriteOptions::default(),
        };
        for (key, value) in defaults {
            store.set(&key, value);
        }
        store.persist()?;
        Ok(store)
    }

    /// Override the durability settings used by [`SettingsStore::persist`].
    pub fn with_write_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All values currently held.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    fn render(&self) -> Result<String> {
        let rendered = match self.format {
            SettingsFormat::Json => {
                serde_json::to_string_pretty(&self.values).map_err(|e| e.to_string())
            }
            SettingsFormat::Toml => toml::to_string_pretty(&self.values).map_err(|e| e.to_string()),
        };

        rendered.map_err(|message| Error::SettingsSerialize {
            path: self.path.clone(),
            format: self.format.name().into(),
            message,
        })
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.values, key).cloned()
    }

    /// Replaces the value wherever `get` finds it. New keys are nested
    /// tables in TOML and literal dotted keys in JSON.
    fn set(&mut self, key: &str, value: Value) {
        let nest = self.format == SettingsFormat::Toml;
        assign(&mut self.values, key, value, nest);
    }

    fn persist(&self) -> Result<()> {
        let content = self.render()?;
        io::write_atomic(&self.path, content.as_bytes(), self.options)
    }
}

fn lookup<'a>(values: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = values.get(key) {
        return Some(value);
    }

    let (head, rest) = key.split_once('.')?;
    match values.get(head)? {
        Value::Object(nested) => lookup(nested, rest),
        _ => None,
    }
}

fn assign(values: &mut Map<String, Value>, key: &str, value: Value, nest: bool) {
    if !values.contains_key(key) {
        if let Some((head, rest)) = key.split_once('.') {
            let descend = match values.get(head) {
                Some(Value::Object(_)) => true,
                Some(_) => false,
                None => nest,
            };
            if descend {
                let entry = values
                    .entry(head)
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(nested) = entry {
                    assign(nested, rest, value, nest);
                    return;
                }
            }
        }
    }

    values.insert(key.to_string(), value);
}

fn parse(format: SettingsFormat, content: &str, path: &Path) -> Result<Map<String, Value>> {
    let parse_error = |message: String| Error::SettingsParse {
        path: path.to_path_buf(),
        format: format.name().into(),
        message,
    };

    let value = match format {
        SettingsFormat::Json => {
            serde_json::from_str::<Value>(content).map_err(|e| parse_error(e.to_string()))?
        }
        SettingsFormat::Toml => {
            let table: toml::Table =
                toml::from_str(content).map_err(|e| parse_error(e.to_string()))?;
            serde_json::to_value(table).map_err(|e| parse_error(e.to_string()))?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(parse_error(format!("expected a top-level object, found {other}"))),
    }
}

/// Settings held in memory only; `persist` is a no-op.
#[derive(Debug, Default, Clone)]
pub struct MemorySettingsStore {
    values: BTreeMap<String, Value>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the store, returning its values as a JSON object map.
    pub fn into_map(self) -> Map<String, Value> {
        self.values.into_iter().collect()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn persist(&self) -> Result<()> {
        Ok(())
    }
}
