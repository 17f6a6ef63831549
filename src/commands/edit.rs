//! Edit commands: card content, card metadata fields, resource updates.

use serde_json::Value;

use super::ChangeEvent;
use super::create::guard_local_card;
use crate::cache::{CardCache, ResourceEntry};
use crate::domain::{ResourceName, ResourceType};
use crate::error::CardoError;
use crate::project::{Project, parse_card_key};
use crate::resources::UpdateOp;
use crate::schema;

/// Metadata keys that have dedicated commands and cannot be edited directly.
const RESERVED_FIELDS: &[&str] = &["cardType", "workflowState", "rank", "labels", "links"];

impl Project {
    /// Replace a card's AsciiDoc body.
    pub fn edit_card_content(&self, key: &str, content: &str) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        let is_template_card = self.lock.with_writer("edit card content", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;
            let record = state.cards.find_anywhere(&key)?;
            schema::write_atomic(
                &record.path.join(crate::cache::CONTENT_FILE),
                content.as_bytes(),
            )?;
            Ok(state.cards.is_template_card(&key))
        })?;
        if !is_template_card {
            self.emit(&ChangeEvent::CardChanged(key));
        }
        Ok(())
    }

    /// Set one custom field on a card; `null` clears the field.
    ///
    /// The value is validated against the field type's `dataType` before
    /// anything is written; the prior value survives a failed edit.
    pub fn edit_card_metadata(
        &self,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        if RESERVED_FIELDS.contains(&field) {
            return Err(CardoError::InvalidInput(format!(
                "Field '{field}' has a dedicated command and cannot be edited directly"
            )));
        }
        self.lock.with_writer("edit card metadata", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;

            let field_name = ResourceName::parse(field)?;
            if field_name.resource_type() != ResourceType::FieldTypes {
                return Err(CardoError::InvalidInput(format!(
                    "'{field}' is not a field type reference"
                )));
            }
            let field_type = state.resources.field_type(&field_name)?;
            field_type
                .show()
                .check_value(&value)
                .map_err(CardoError::SchemaViolation)?;

            let template = state.cards.is_template_card(&key);
            let mut metadata = state.cards.find_anywhere(&key)?.metadata.clone();
            metadata.set_field(field, value);

            if template {
                state.cards.update_template_metadata(&key, metadata)?;
                let record = state.cards.find_anywhere(&key)?;
                CardCache::save_metadata(record)?;
            } else {
                state.cards.update_metadata(&key, metadata)?;
                let record = state.cards.find(&key)?;
                CardCache::save_metadata(record)?;
                self.engine.handle_card_changed(record, None);
            }
            Ok(())
        })?;
        self.emit(&ChangeEvent::CardChanged(key));
        Ok(())
    }

    /// Apply one update operation to a resource document.
    pub fn update_resource(&self, name: &str, key: &str, op: UpdateOp) -> Result<(), CardoError> {
        let name = ResourceName::parse(name)?;
        self.lock.with_writer("update resource", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            let entry = state.resources.by_name_mut(&name)?;
            match entry {
                ResourceEntry::CardType(r) => r.update(key, op)?,
                ResourceEntry::FieldType(r) => r.update(key, op)?,
                ResourceEntry::LinkType(r) => r.update(key, op)?,
                ResourceEntry::Workflow(r) => r.update(key, op)?,
                ResourceEntry::Template(r) => r.update(key, op)?,
                ResourceEntry::Report(r) => r.update(key, op)?,
                ResourceEntry::GraphModel(r) => r.update(key, op)?,
                ResourceEntry::GraphView(r) => r.update(key, op)?,
                ResourceEntry::Calculation(r) => r.update(key, op)?,
            }
            let entry = state.resources.by_name(&name)?;
            self.engine.handle_resource_changed(entry)?;
            Ok(())
        })?;
        self.emit(&ChangeEvent::ResourceChanged(name));
        Ok(())
    }

    /// Overwrite one file inside a folder resource's content directory.
    pub fn update_resource_file(
        &self,
        name: &str,
        relative: &str,
        content: &str,
    ) -> Result<(), CardoError> {
        let name = ResourceName::parse(name)?;
        self.lock.with_writer("update resource file", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            let entry = state.resources.by_name(&name)?;
            match entry {
                ResourceEntry::Template(r) => r.update_file(relative, content)?,
                ResourceEntry::Report(r) => r.update_file(relative, content)?,
                ResourceEntry::GraphModel(r) => r.update_file(relative, content)?,
                ResourceEntry::GraphView(r) => r.update_file(relative, content)?,
                ResourceEntry::Calculation(r) => r.update_program(content)?,
                _ => {
                    return Err(CardoError::InvalidInput(format!(
                        "Resource '{name}' has no content folder"
                    )));
                }
            }
            self.engine.handle_resource_changed(entry)?;
            Ok(())
        })?;
        self.emit(&ChangeEvent::ResourceChanged(name));
        Ok(())
    }
}
