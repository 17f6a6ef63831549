//! The project configuration store backed by `cardsConfig.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::is_valid_prefix;
use crate::error::CardoError;
use crate::schema;

/// Schema version written by this build; the migration runner upgrades older
/// projects to it.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// One imported module as recorded in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    pub location: String,
}

/// In-memory form of `cardsConfig.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub card_key_prefix: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub hubs: Vec<String>,
}

/// Outcome of a schema-version compatibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub compatible: bool,
    pub message: String,
}

/// Reads and writes `cardsConfig.json` for one project.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: ProjectConfig,
}

impl ConfigStore {
    /// Load configuration from `cardsConfig.json`.
    pub fn load(path: &Path) -> Result<Self, CardoError> {
        let value = schema::read_json(path)?;
        schema::require_valid(&value, "cardsConfigSchema")?;
        let config: ProjectConfig = serde_json::from_value(value)
            .map_err(|e| CardoError::JsonParse { path: path.to_path_buf(), detail: e.to_string() })?;
        Ok(Self { path: path.to_path_buf(), config })
    }

    /// Build a fresh configuration for a new project.
    pub fn create(path: &Path, name: &str, prefix: &str) -> Result<Self, CardoError> {
        if !is_valid_prefix(prefix) {
            return Err(CardoError::InvalidInput(format!(
                "Card key prefix '{prefix}' must match ^[a-z]{{1,10}}$"
            )));
        }
        if name.trim().is_empty() {
            return Err(CardoError::InvalidInput("Project name must not be empty".into()));
        }
        let config = ProjectConfig {
            schema_version: Some(CURRENT_SCHEMA_VERSION),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            card_key_prefix: prefix.to_string(),
            name: name.trim().to_string(),
            description: None,
            category: None,
            modules: Vec::new(),
            hubs: Vec::new(),
        };
        let store = Self { path: path.to_path_buf(), config };
        store.save()?;
        Ok(store)
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn card_key_prefix(&self) -> &str {
        &self.config.card_key_prefix
    }

    pub fn module_prefixes(&self) -> Vec<String> {
        self.config.modules.iter().map(|m| m.name.clone()).collect()
    }

    /// Persist the configuration; refuses to write an empty prefix.
    pub fn save(&self) -> Result<(), CardoError> {
        if self.config.card_key_prefix.is_empty() {
            return Err(CardoError::InvalidInput(
                "Refusing to save configuration without a card key prefix".into(),
            ));
        }
        let value = serde_json::to_value(&self.config)
            .map_err(|e| CardoError::InvalidInput(format!("Cannot serialize configuration: {e}")))?;
        schema::require_valid(&value, "cardsConfigSchema")?;
        schema::write_json(&self.path, &value)
    }

    /// Record an imported module; `file:` URLs and relative paths are
    /// normalized to absolute paths before storage.
    pub fn add_module(&mut self, name: &str, location: &str, base: &Path) -> Result<(), CardoError> {
        if self.config.modules.iter().any(|m| m.name == name) {
            return Err(CardoError::ModuleAlreadyImported(name.to_string()));
        }
        let location = normalize_location(location, base)?;
        self.config.modules.push(ModuleEntry { name: name.to_string(), location });
        self.save()
    }

    pub fn remove_module(&mut self, name: &str) -> Result<(), CardoError> {
        let before = self.config.modules.len();
        self.config.modules.retain(|m| m.name != name);
        if self.config.modules.len() == before {
            return Err(CardoError::ModuleNotImported(name.to_string()));
        }
        self.save()
    }

    /// Register a hub URL. Whitespace is trimmed; the URL must be http(s),
    /// parse cleanly, and not already be present.
    pub fn add_hub(&mut self, hub: &str) -> Result<(), CardoError> {
        let hub = hub.trim();
        if hub.is_empty() {
            return Err(CardoError::InvalidInput("Hub URL must not be empty".into()));
        }
        let parsed = Url::parse(hub)
            .map_err(|e| CardoError::InvalidInput(format!("Invalid hub URL '{hub}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CardoError::InvalidInput(format!(
                "Hub URL '{hub}' must use http or https"
            )));
        }
        if self.config.hubs.iter().any(|h| h == hub) {
            return Err(CardoError::InvalidInput(format!("Hub '{hub}' is already registered")));
        }
        self.config.hubs.push(hub.to_string());
        self.save()
    }

    pub fn remove_hub(&mut self, hub: &str) -> Result<(), CardoError> {
        let hub = hub.trim();
        let before = self.config.hubs.len();
        self.config.hubs.retain(|h| h != hub);
        if self.config.hubs.len() == before {
            return Err(CardoError::InvalidInput(format!("Hub '{hub}' is not registered")));
        }
        self.save()
    }

    pub fn set_card_prefix(&mut self, prefix: &str) -> Result<(), CardoError> {
        if !is_valid_prefix(prefix) {
            return Err(CardoError::InvalidInput(format!(
                "Card key prefix '{prefix}' must match ^[a-z]{{1,10}}$"
            )));
        }
        self.config.card_key_prefix = prefix.to_string();
        self.save()
    }

    /// Compare the stored schema version with the one this build writes.
    ///
    /// A missing version is treated as current and persisted.
    pub fn check_schema_version(&mut self) -> Result<VersionCheck, CardoError> {
        let stored = match self.config.schema_version {
            Some(v) => v,
            None => {
                self.config.schema_version = Some(CURRENT_SCHEMA_VERSION);
                self.save()?;
                CURRENT_SCHEMA_VERSION
            }
        };
        let check = if stored < CURRENT_SCHEMA_VERSION {
            VersionCheck {
                compatible: false,
                message: format!(
                    "Project uses schema version {stored}, current is {CURRENT_SCHEMA_VERSION}: run a migration to upgrade"
                ),
            }
        } else if stored > CURRENT_SCHEMA_VERSION {
            VersionCheck {
                compatible: false,
                message: format!(
                    "Project uses schema version {stored}, newer than supported {CURRENT_SCHEMA_VERSION}: update the application"
                ),
            }
        } else {
            VersionCheck { compatible: true, message: String::new() }
        };
        Ok(check)
    }

    pub(crate) fn set_schema_version(&mut self, version: u32) -> Result<(), CardoError> {
        self.config.schema_version = Some(version);
        self.save()
    }
}

fn normalize_location(location: &str, base: &Path) -> Result<String, CardoError> {
    if let Ok(url) = Url::parse(location) {
        if url.scheme() == "file" {
            let path = url.to_file_path().map_err(|_| {
                CardoError::InvalidInput(format!("Invalid file URL '{location}'"))
            })?;
            return Ok(path.to_string_lossy().into_owned());
        }
        return Ok(location.to_string());
    }
    let path = Path::new(location);
    let absolute = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    Ok(absolute.to_string_lossy().into_owned())
}
