use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{FileResource, ResourceContext, ResourceData, UpdateOp};
use crate::domain::{ResourceName, ResourceType};
use crate::error::CardoError;
use crate::paths::CHILDREN_DIR;
use crate::schema;

/// Marker file inside a template's card tree naming the card shape schema.
pub const CARD_SHAPE_MARKER: &str = ".schema";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ResourceData for TemplateData {
    const RESOURCE_TYPE: ResourceType = ResourceType::Templates;
    const SCHEMA_ID: &'static str = "templateSchema";

    fn name(&self) -> &ResourceName {
        &self.name
    }

    fn set_name(&mut self, name: ResourceName) {
        self.name = name;
    }

    fn default_for(name: &ResourceName) -> Self {
        Self { name: name.clone(), display_name: None, description: None, category: None }
    }
}

/// Template resource: the JSON document plus a `c/` tree of template cards.
#[derive(Debug, Clone)]
pub struct TemplateResource {
    inner: FileResource<TemplateData>,
}

impl TemplateResource {
    pub fn open(ctx: ResourceContext, name: ResourceName) -> Result<Self, CardoError> {
        Ok(Self { inner: FileResource::open(ctx, name)? })
    }

    pub fn create(ctx: ResourceContext, name: ResourceName) -> Result<Self, CardoError> {
        let inner = FileResource::create(ctx, name, None)?;
        let template = Self { inner };
        template.ensure_card_tree()?;
        Ok(template)
    }

    pub fn name(&self) -> &ResourceName {
        self.inner.name()
    }

    pub fn show(&self) -> &TemplateData {
        self.inner.show()
    }

    pub fn is_module_resource(&self) -> bool {
        self.inner.is_module_resource()
    }

    pub fn validate(
        &self,
        content: Option<&serde_json::Value>,
    ) -> Result<Vec<String>, CardoError> {
        self.inner.validate(content)
    }

    pub fn update(&mut self, key: &str, op: UpdateOp) -> Result<(), CardoError> {
        self.inner.update(key, op)
    }

    pub fn show_file(&self, relative: &str) -> Result<String, CardoError> {
        self.inner.show_file(relative)
    }

    pub fn show_file_names(&self) -> Result<Vec<String>, CardoError> {
        self.inner.show_file_names()
    }

    pub fn update_file(&self, relative: &str, content: &str) -> Result<(), CardoError> {
        self.inner.update_file(relative, content)
    }

    pub fn delete(&self) -> Result<(), CardoError> {
        self.inner.delete()
    }

    pub fn rename(&mut self, new_name: ResourceName) -> Result<(), CardoError> {
        self.inner.rename(new_name)
    }

    /// Root of the template's card tree (`templates/<id>/c/`).
    pub fn cards_root(&self) -> PathBuf {
        self.inner.content_dir().join(CHILDREN_DIR)
    }

    /// Whether the template holds at least one card.
    pub fn has_cards(&self) -> Result<bool, CardoError> {
        let root = self.cards_root();
        if !root.exists() {
            return Ok(false);
        }
        let entries = fs::read_dir(&root).map_err(|e| CardoError::read(&root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CardoError::read(&root, e))?;
            if entry.path().is_dir() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Create the card tree folder and its card-shape marker.
    pub fn ensure_card_tree(&self) -> Result<(), CardoError> {
        let root = self.cards_root();
        fs::create_dir_all(&root).map_err(|e| CardoError::write(&root, e))?;
        let marker = root.join(CARD_SHAPE_MARKER);
        if !marker.exists() {
            schema::write_atomic(&marker, b"cardBaseSchema\n")?;
        }
        Ok(())
    }
}
