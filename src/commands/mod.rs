//! The atomic mutation layer and the synchronous command-manager facade.
//!
//! Every mutation runs under the writer lock with a human-readable label and
//! touches the calculation engine only after its filesystem writes committed.
//! The `CommandManager` wraps the typed API into `ActionResult` status codes
//! for route-layer callers.

mod create;
mod edit;
mod import;
mod move_card;
mod remove;
mod rename;
mod transition;
mod validate;

use std::sync::Arc;

use serde_json::{Value, json};

use crate::cache::ResourceScope;
use crate::domain::{CardKey, ResourceName, ResourceType};
use crate::error::CardoError;
use crate::project::{Project, parse_card_key};
use crate::resources::UpdateOp;

/// Event emitted after a successful mutation.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    CardsAdded(Vec<CardKey>),
    CardChanged(CardKey),
    CardMoved(CardKey),
    CardDeleted(CardKey),
    ResourceChanged(ResourceName),
    ModuleImported(String),
    ModuleRemoved(String),
}

/// Synchronous wrapper result with route-layer status codes.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub status_code: u16,
    pub payload: Option<Value>,
    pub message: Option<String>,
}

impl ActionResult {
    pub fn ok(payload: Value) -> Self {
        Self { status_code: 200, payload: Some(payload), message: None }
    }

    pub fn no_content() -> Self {
        Self { status_code: 204, payload: None, message: None }
    }

    pub fn partial(payload: Value, message: String) -> Self {
        Self { status_code: 207, payload: Some(payload), message: Some(message) }
    }

    pub fn from_error(error: &CardoError) -> Self {
        Self {
            status_code: error.status_code(),
            payload: None,
            message: Some(error.to_string()),
        }
    }
}

impl From<Result<Value, CardoError>> for ActionResult {
    fn from(result: Result<Value, CardoError>) -> Self {
        match result {
            Ok(payload) => ActionResult::ok(payload),
            Err(error) => ActionResult::from_error(&error),
        }
    }
}

impl From<Result<(), CardoError>> for ActionResult {
    fn from(result: Result<(), CardoError>) -> Self {
        match result {
            Ok(()) => ActionResult::no_content(),
            Err(error) => ActionResult::from_error(&error),
        }
    }
}

/// Per-path handle over one project; the host constructs it explicitly.
pub struct CommandManager {
    project: Arc<Project>,
}

impl CommandManager {
    /// Open the project at `path`.
    pub fn open(path: &std::path::Path) -> Result<Self, CardoError> {
        Ok(Self { project: Arc::new(Project::open(path)?) })
    }

    /// Create a new project at `path`, then open it.
    pub fn create(path: &std::path::Path, name: &str, prefix: &str) -> Result<Self, CardoError> {
        Ok(Self { project: Arc::new(Project::create(path, name, prefix)?) })
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    /// Begin watching the project for out-of-band changes.
    pub fn start_watching(&self) -> Result<(), CardoError> {
        self.project.start_watching()
    }

    pub fn close(&self) {
        self.project.close();
    }

    // -- show ---------------------------------------------------------------

    pub fn show_project(&self) -> ActionResult {
        let result = self.read(|project| {
            project.lock.with_reader(|state| {
                let config = state.config.config();
                Ok(json!({
                    "name": config.name,
                    "prefix": config.card_key_prefix,
                    "schemaVersion": config.schema_version,
                    "description": config.description,
                    "modules": config.modules,
                    "hubs": config.hubs,
                }))
            })
        });
        result.into()
    }

    pub fn show_modules(&self) -> ActionResult {
        let result = self.read(|project| {
            project.lock.with_reader(|state| Ok(json!(state.resources.module_prefixes())))
        });
        result.into()
    }

    pub fn show_module(&self, prefix: &str) -> ActionResult {
        let prefix = prefix.to_string();
        let result = self.read(|project| {
            project.lock.with_reader(|state| {
                let entry = state
                    .config
                    .config()
                    .modules
                    .iter()
                    .find(|m| m.name == prefix)
                    .ok_or_else(|| CardoError::ModuleNotImported(prefix.clone()))?;
                Ok(json!({ "name": entry.name, "location": entry.location }))
            })
        });
        result.into()
    }

    pub fn show_card(&self, key: &str) -> ActionResult {
        let result = self.read(|project| {
            let key = parse_card_key(key)?;
            project.lock.with_reader(|state| {
                let card = state.cards.card(&key)?;
                serde_json::to_value(&card)
                    .map_err(|e| CardoError::InvalidInput(format!("Cannot serialize card: {e}")))
            })
        });
        result.into()
    }

    pub fn show_cards(&self) -> ActionResult {
        let result = self.read(|project| {
            project.lock.with_reader(|state| {
                let records = state.cards.cards(None)?;
                let rows: Vec<Value> = records
                    .iter()
                    .map(|record| {
                        json!({
                            "key": record.key,
                            "cardType": record.metadata.card_type,
                            "workflowState": record.metadata.workflow_state,
                            "rank": record.metadata.rank,
                            "parent": record.parent,
                            "children": record.children,
                        })
                    })
                    .collect();
                Ok(Value::Array(rows))
            })
        });
        result.into()
    }

    /// Resources of one type; each entry carries its document plus a
    /// `readOnly` marker for module resources.
    pub fn show_resources(&self, rt: ResourceType) -> ActionResult {
        let result = self.read(|project| {
            project.lock.with_reader(|state| {
                let local_prefix = state.local_prefix();
                let mut rows = Vec::new();
                for name in state.resources.resource_names(rt, ResourceScope::All) {
                    let entry = state.resources.by_name(&name)?;
                    let mut raw = entry.raw()?;
                    if let Some(object) = raw.as_object_mut() {
                        object.insert(
                            "readOnly".to_string(),
                            Value::Bool(name.prefix() != local_prefix),
                        );
                    }
                    rows.push(raw);
                }
                Ok(Value::Array(rows))
            })
        });
        result.into()
    }

    pub fn show_resource(&self, name: &str) -> ActionResult {
        let result = self.read(|project| {
            let name = ResourceName::parse(name)?;
            project.lock.with_reader(|state| {
                let entry = state.resources.by_name(&name)?;
                let mut raw = entry.raw()?;
                if let Some(object) = raw.as_object_mut() {
                    object.insert(
                        "readOnly".to_string(),
                        Value::Bool(name.prefix() != state.local_prefix()),
                    );
                }
                Ok(raw)
            })
        });
        result.into()
    }

    pub fn show_attachments(&self, key: &str) -> ActionResult {
        let result = self.read(|project| {
            let key = parse_card_key(key)?;
            project.lock.with_reader(|state| {
                let record = state.cards.find_anywhere(&key)?;
                Ok(json!(record.attachments))
            })
        });
        result.into()
    }

    /// Attachment descriptor; the route layer streams the bytes from `path`.
    pub fn show_attachment(&self, key: &str, file: &str) -> ActionResult {
        let result = self.read(|project| {
            let key = parse_card_key(key)?;
            let file = file.to_string();
            project.lock.with_reader(|state| {
                let record = state.cards.find_anywhere(&key)?;
                if !record.attachments.iter().any(|a| *a == file) {
                    return Err(CardoError::AttachmentNotFound {
                        card: key.to_string(),
                        file: file.clone(),
                    });
                }
                let path = record.path.join(crate::paths::ATTACHMENTS_DIR).join(&file);
                Ok(json!({ "fileName": file, "path": path }))
            })
        });
        result.into()
    }

    /// Every label in use, aggregated through the `labels` query.
    pub fn show_labels(&self) -> ActionResult {
        let result = self.read(|project| {
            let labels = project.run_query("labels", None)?;
            let values: Vec<&str> = labels.rows.iter().map(|r| r.key.as_str()).collect();
            Ok(json!(values))
        });
        result.into()
    }

    fn read<T>(
        &self,
        body: impl FnOnce(&Project) -> Result<T, CardoError>,
    ) -> Result<T, CardoError> {
        self.project.refresh()?;
        body(&self.project)
    }

    // -- mutations ----------------------------------------------------------

    pub fn create_card(&self, template: &str, parent: Option<&str>) -> ActionResult {
        let parent = match parent.map(parse_card_key).transpose() {
            Ok(parent) => parent,
            Err(error) => return ActionResult::from_error(&error),
        };
        match self.project.create_card(template, parent.as_ref()) {
            Ok(keys) => ActionResult::ok(json!(keys)),
            Err(error) => ActionResult::from_error(&error),
        }
    }

    /// Upload several attachments; failures are reported per file and leave
    /// the successfully written ones in place for the caller to keep or roll
    /// back.
    pub fn create_attachments(&self, key: &str, files: &[(String, Vec<u8>)]) -> ActionResult {
        let mut succeeded: Vec<String> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        for (name, bytes) in files {
            match self.project.create_attachment(key, name, bytes) {
                Ok(()) => succeeded.push(name.clone()),
                Err(error) => failures.push(format!("{name}: {error}")),
            }
        }
        if failures.is_empty() {
            ActionResult::ok(json!(succeeded))
        } else if succeeded.is_empty() {
            ActionResult {
                status_code: 400,
                payload: None,
                message: Some(failures.join("\n")),
            }
        } else {
            ActionResult::partial(json!(succeeded), failures.join("\n"))
        }
    }

    pub fn create_attachment(&self, key: &str, file: &str, bytes: &[u8]) -> ActionResult {
        self.project.create_attachment(key, file, bytes).into()
    }

    pub fn create_resource(&self, rt: ResourceType, identifier: &str) -> ActionResult {
        match self.project.create_resource(rt, identifier) {
            Ok(name) => ActionResult::ok(json!(name)),
            Err(error) => ActionResult::from_error(&error),
        }
    }

    pub fn create_label(&self, key: &str, label: &str) -> ActionResult {
        self.project.create_label(key, label).into()
    }

    pub fn create_link(
        &self,
        source: &str,
        destination: &str,
        link_type: &str,
        description: Option<&str>,
    ) -> ActionResult {
        self.project.create_link(source, destination, link_type, description).into()
    }

    pub fn edit_card_content(&self, key: &str, content: &str) -> ActionResult {
        self.project.edit_card_content(key, content).into()
    }

    pub fn edit_card_metadata(&self, key: &str, field: &str, value: Value) -> ActionResult {
        self.project.edit_card_metadata(key, field, value).into()
    }

    pub fn update_resource(&self, name: &str, key: &str, op: UpdateOp) -> ActionResult {
        self.project.update_resource(name, key, op).into()
    }

    pub fn move_card(&self, key: &str, new_parent: Option<&str>) -> ActionResult {
        self.project.move_card(key, new_parent).into()
    }

    pub fn rank_by_index(&self, key: &str, index: usize) -> ActionResult {
        self.project.rank_by_index(key, index).into()
    }

    pub fn transition_card(&self, key: &str, transition: &str) -> ActionResult {
        self.project.transition_card(key, transition).into()
    }

    pub fn rename_project_prefix(&self, new_prefix: &str) -> ActionResult {
        self.project.rename_project_prefix(new_prefix).into()
    }

    pub fn rename_resource(&self, name: &str, new_identifier: &str) -> ActionResult {
        self.project.rename_resource(name, new_identifier).into()
    }

    pub fn remove_card(&self, key: &str) -> ActionResult {
        self.project.remove_card(key).into()
    }

    pub fn remove_attachment(&self, key: &str, file: &str) -> ActionResult {
        self.project.remove_attachment(key, file).into()
    }

    pub fn remove_label(&self, key: &str, label: &str) -> ActionResult {
        self.project.remove_label(key, label).into()
    }

    pub fn remove_link(&self, source: &str, destination: &str, link_type: &str) -> ActionResult {
        self.project.remove_link(source, destination, link_type).into()
    }

    pub fn remove_resource(&self, name: &str) -> ActionResult {
        self.project.remove_resource(name).into()
    }

    pub fn remove_module(&self, prefix: &str) -> ActionResult {
        self.project.remove_module(prefix).into()
    }

    pub fn add_hub(&self, url: &str) -> ActionResult {
        self.project.add_hub(url).into()
    }

    pub fn remove_hub(&self, url: &str) -> ActionResult {
        self.project.remove_hub(url).into()
    }

    pub fn import_module(&self, source: &std::path::Path, prefix: Option<&str>) -> ActionResult {
        match self.project.import_module(source, prefix) {
            Ok(prefix) => ActionResult::ok(json!(prefix)),
            Err(error) => ActionResult::from_error(&error),
        }
    }

    pub fn validate(&self) -> ActionResult {
        match self.project.validate_project() {
            Ok(violations) if violations.is_empty() => ActionResult::no_content(),
            Ok(violations) => ActionResult {
                status_code: 400,
                payload: Some(json!(violations)),
                message: Some(violations.join("\n\n")),
            },
            Err(error) => ActionResult::from_error(&error),
        }
    }

    pub fn run_query(&self, name: &str, params: Option<Value>) -> ActionResult {
        let result = self.read(|project| {
            let query = project.run_query(name, params.as_ref())?;
            let rows: Vec<Value> = query.rows.iter().map(row_to_json).collect();
            Ok(Value::Array(rows))
        });
        result.into()
    }

    pub fn run_logic_program(&self, text: &str) -> ActionResult {
        let result = self.read(|project| {
            let answers = project.run_logic_program(text)?;
            Ok(json!(answers))
        });
        result.into()
    }
}

fn row_to_json(row: &crate::engine::ResultRow) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("key".to_string(), Value::String(row.key.clone()));
    for (name, value) in &row.fields {
        object.insert(name.clone(), value.clone());
    }
    if !row.children.is_empty() {
        object.insert(
            "results".to_string(),
            Value::Array(row.children.iter().map(row_to_json).collect()),
        );
    }
    Value::Object(object)
}
