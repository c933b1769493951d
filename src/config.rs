//! Configuration store and per-guard configuration resolution.
//!
//! Guards are configured under `<namespace>.<guard>` with the default guard
//! name stored at `<namespace>.default`:
//!
//! ```toml
//! [permission]
//! default = "api"
//!
//! [permission.api]
//! adapter = "database"
//!
//! [permission.api.model]
//! config_type = "file"
//! config_file_path = "config/rbac_model.conf"
//!
//! [permission.api.log]
//! logger = "app"
//! enable = true
//! ```

use crate::error::{Error, Result};
use crate::types::{AdapterName, GuardName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "permission";

const DEFAULT_KEY: &str = "default";

/// Shared key/value configuration tree addressed by dotted keys.
///
/// Clones share the same underlying tree, so a value written through one
/// handle is visible through every other.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<Value>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Creates a store from an existing JSON tree.
    pub fn from_value(value: Value) -> Self {
        let root = if value.is_object() {
            value
        } else {
            Value::Object(Map::new())
        };
        Self {
            inner: Arc::new(RwLock::new(root)),
        }
    }

    /// Parses a TOML document into a new store.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        parse_toml(text, "<string>").map(Self::from_value)
    }

    /// Reads and parses a TOML file into a new store.
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|err| Error::ConfigLoad {
            path: origin.clone(),
            message: err.to_string(),
        })?;
        parse_toml(&text, &origin).map(Self::from_value)
    }

    /// Returns a copy of the value stored at `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let guard = self.inner.read().expect("poisoned lock");
        key.split('.')
            .try_fold(&*guard, |node, segment| node.as_object()?.get(segment))
            .cloned()
    }

    /// Returns the string stored at `key`, if it is a string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true when a non-null value is stored at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| !value.is_null())
    }

    /// Stores `value` at `key`, creating intermediate tables.
    ///
    /// Non-table values along the path are replaced by tables.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let mut guard = self.inner.write().expect("poisoned lock");
        let mut segments = key.split('.').peekable();
        let mut node = &mut *guard;
        while let Some(segment) = segments.next() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                return;
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value.into());
                return;
            }
            node = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }
}

fn parse_toml(text: &str, origin: &str) -> Result<Value> {
    let load_error = |message: String| Error::ConfigLoad {
        path: origin.to_string(),
        message,
    };
    let document: toml::Value = toml::from_str(text).map_err(|err| load_error(err.to_string()))?;
    serde_json::to_value(document).map_err(|err| load_error(err.to_string()))
}

/// Where a guard's policy model definition comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModelSource {
    /// No model configured; the engine starts with an empty model.
    #[default]
    None,
    /// Model definition file on disk.
    File(PathBuf),
    /// Model definition held inline in configuration.
    Text(String),
}

impl ModelSource {
    /// Short label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File(_) => "file",
            Self::Text(_) => "text",
        }
    }
}

/// Resolved configuration for one guard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardConfig {
    /// Model definition source.
    pub model_source: ModelSource,
    /// Persistence adapter to construct when none has been injected.
    pub adapter: Option<AdapterName>,
    /// Logger to bridge into the engine log sink.
    pub logger: Option<String>,
    /// Whether the engine should emit log output.
    pub log_enabled: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawGuardSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    adapter: Option<String>,
    model: RawModelSection,
    log: RawLogSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawModelSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    config_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_text: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawLogSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    logger: Option<String>,
    enable: bool,
}

impl GuardConfig {
    fn from_raw(raw: RawGuardSection, key: &str) -> Result<Self> {
        let model_source = match raw.model.config_type.as_deref() {
            Some("file") => {
                ModelSource::File(PathBuf::from(raw.model.config_file_path.unwrap_or_default()))
            }
            Some("text") => ModelSource::Text(raw.model.config_text.unwrap_or_default()),
            Some(other) => {
                tracing::warn!(
                    key,
                    config_type = other,
                    "unknown model config_type; starting with an empty model"
                );
                ModelSource::None
            }
            None => ModelSource::None,
        };
        let adapter = raw
            .adapter
            .filter(|name| !name.trim().is_empty())
            .map(AdapterName::new)
            .transpose()
            .map_err(|err| Error::InvalidConfig {
                key: format!("{key}.adapter"),
                message: err.to_string(),
            })?;
        let logger = raw.log.logger.filter(|name| !name.trim().is_empty());

        Ok(Self {
            model_source,
            adapter,
            logger,
            log_enabled: raw.log.enable,
        })
    }

    fn to_raw(&self) -> RawGuardSection {
        let mut model = RawModelSection::default();
        match &self.model_source {
            ModelSource::None => {}
            ModelSource::File(path) => {
                model.config_type = Some("file".to_string());
                model.config_file_path = Some(path.display().to_string());
            }
            ModelSource::Text(text) => {
                model.config_type = Some("text".to_string());
                model.config_text = Some(text.clone());
            }
        }
        RawGuardSection {
            adapter: self.adapter.as_ref().map(|name| name.as_str().to_string()),
            model,
            log: RawLogSection {
                logger: self.logger.clone(),
                enable: self.log_enabled,
            },
        }
    }
}

/// Reads guard configuration from a [`ConfigStore`] under one namespace.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    store: ConfigStore,
    namespace: String,
}

impl ConfigResolver {
    /// Creates a resolver reading `<namespace>.*` keys from `store`.
    pub fn new(store: ConfigStore, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Returns the configuration namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.namespace)
    }

    /// Returns the configured default guard name, or an empty string when unset.
    pub fn default_guard_name(&self) -> String {
        self.store
            .get_str(&self.key(DEFAULT_KEY))
            .unwrap_or_default()
    }

    /// Overwrites the default guard name. The name is not checked against
    /// configured guards.
    pub fn set_default_guard_name(&self, name: impl AsRef<str>) {
        self.store
            .set(&self.key(DEFAULT_KEY), name.as_ref().trim().to_string());
    }

    /// Maps an empty name to the default guard name and validates the result.
    pub fn resolve_name(&self, name: &str) -> Result<GuardName> {
        let name = if name.trim().is_empty() {
            let default = self.default_guard_name();
            if default.trim().is_empty() {
                return Err(Error::ConfigMissing {
                    key: self.key(DEFAULT_KEY),
                });
            }
            default
        } else {
            name.to_string()
        };
        GuardName::new(name)
    }

    /// Resolves the configuration of `name`, or of the default guard when
    /// `name` is empty.
    pub fn resolve(&self, name: &str) -> Result<GuardConfig> {
        let name = self.resolve_name(name)?;
        self.resolve_guard(&name)
    }

    /// Resolves the configuration section of an already validated guard name.
    pub fn resolve_guard(&self, name: &GuardName) -> Result<GuardConfig> {
        let key = self.key(name.as_str());
        let section = match self.store.get(&key) {
            None | Some(Value::Null) => return Err(Error::ConfigMissing { key }),
            Some(section @ Value::Object(_)) => section,
            Some(_) => {
                return Err(Error::InvalidConfig {
                    key,
                    message: "guard section must be a table".to_string(),
                });
            }
        };
        let raw: RawGuardSection =
            serde_json::from_value(section).map_err(|err| Error::InvalidConfig {
                key: key.clone(),
                message: err.to_string(),
            })?;
        GuardConfig::from_raw(raw, &key)
    }

    /// Writes `config` as the section for `name`, replacing any previous one.
    pub fn define_guard(&self, name: &GuardName, config: &GuardConfig) -> Result<()> {
        let key = self.key(name.as_str());
        let value = serde_json::to_value(config.to_raw()).map_err(|err| Error::InvalidConfig {
            key: key.clone(),
            message: err.to_string(),
        })?;
        self.store.set(&key, value);
        Ok(())
    }

    /// Returns the model source configured for `name`.
    pub fn model_source(&self, name: &str) -> Result<ModelSource> {
        self.resolve(name).map(|config| config.model_source)
    }

    /// Returns the adapter descriptor configured for `name`.
    pub fn adapter_descriptor(&self, name: &str) -> Result<Option<AdapterName>> {
        self.resolve(name).map(|config| config.adapter)
    }

    /// Returns the logger descriptor configured for `name`.
    pub fn logger_descriptor(&self, name: &str) -> Result<Option<String>> {
        self.resolve(name).map(|config| config.logger)
    }

    /// Returns whether engine logging is enabled for `name`.
    pub fn is_log_enabled(&self, name: &str) -> Result<bool> {
        self.resolve(name).map(|config| config.log_enabled)
    }

    /// Returns the inline model text for `name`, or an empty string.
    pub fn model_config_text(&self, name: &str) -> Result<String> {
        let name = self.resolve_name(name)?;
        Ok(self
            .store
            .get_str(&self.key(&format!("{name}.model.config_text")))
            .unwrap_or_default())
    }

    /// Replaces the inline model text for `name`. Guards already built keep
    /// their model.
    pub fn set_model_config_text(&self, name: &str, text: impl Into<String>) -> Result<()> {
        let name = self.resolve_name(name)?;
        self.store.set(
            &self.key(&format!("{name}.model.config_text")),
            text.into(),
        );
        Ok(())
    }
}
