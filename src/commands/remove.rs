//! Remove commands: cards, attachments, labels, links, resources, modules.

use std::fs;

use super::ChangeEvent;
use super::create::guard_local_card;
use crate::cache::{CardCache, ResourceEntry, ResourceScope};
use crate::domain::{CardKey, ResourceName, ResourceType};
use crate::error::CardoError;
use crate::paths::ATTACHMENTS_DIR;
use crate::project::{Project, ProjectState, parse_card_key};

impl Project {
    /// Delete a card and its subtree.
    pub fn remove_card(&self, key: &str) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        let removed = self.lock.with_writer("remove card", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;
            let record = state.cards.find(&key)?;
            let path = record.path.clone();
            token.check("remove card")?;
            fs::remove_dir_all(&path).map_err(|e| CardoError::write(&path, e))?;
            let removed = state.cards.remove_subtree(&key)?;
            for record in &removed {
                self.engine.handle_delete_card(&record.key);
            }
            Ok(removed.into_iter().map(|r| r.key).collect::<Vec<_>>())
        })?;
        for key in removed {
            self.emit(&ChangeEvent::CardDeleted(key));
        }
        Ok(())
    }

    /// Delete one attachment file from a card.
    pub fn remove_attachment(&self, key: &str, file: &str) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        self.lock.with_writer("remove attachment", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;
            let record = state.cards.find_anywhere(&key)?;
            if !record.attachments.iter().any(|a| a == file) {
                return Err(CardoError::AttachmentNotFound {
                    card: key.to_string(),
                    file: file.to_string(),
                });
            }
            let path = record.path.join(ATTACHMENTS_DIR).join(file);
            token.check("remove attachment")?;
            fs::remove_file(&path).map_err(|e| CardoError::write(&path, e))?;
            if state.cards.remove_attachment(&key, file).is_err() {
                state.cards.changed();
            } else {
                let record = state.cards.find(&key)?;
                self.engine.handle_card_changed(record, None);
            }
            Ok(())
        })?;
        self.emit(&ChangeEvent::CardChanged(key));
        Ok(())
    }

    /// Remove a label from a card.
    pub fn remove_label(&self, key: &str, label: &str) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        self.lock.with_writer("remove label", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;
            let mut metadata = state.cards.find(&key)?.metadata.clone();
            let before = metadata.labels.len();
            metadata.labels.retain(|l| l != label);
            if metadata.labels.len() == before {
                return Err(CardoError::ItemNotFound(label.to_string()));
            }
            state.cards.update_metadata(&key, metadata)?;
            let record = state.cards.find(&key)?;
            CardCache::save_metadata(record)?;
            self.engine.handle_card_changed(record, None);
            Ok(())
        })?;
        self.emit(&ChangeEvent::CardChanged(key));
        Ok(())
    }

    /// Remove a typed link from its source card.
    pub fn remove_link(
        &self,
        source: &str,
        destination: &str,
        link_type: &str,
    ) -> Result<(), CardoError> {
        let source = parse_card_key(source)?;
        let destination = parse_card_key(destination)?;
        let link_type = ResourceName::parse(link_type)?;
        self.lock.with_writer("remove link", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &source)?;
            let mut metadata = state.cards.find(&source)?.metadata.clone();
            let before = metadata.links.len();
            metadata
                .links
                .retain(|l| !(l.link_type == link_type && l.card_key == destination));
            if metadata.links.len() == before {
                return Err(CardoError::ItemNotFound(format!("{link_type} -> {destination}")));
            }
            state.cards.update_metadata(&source, metadata)?;
            let record = state.cards.find(&source)?;
            CardCache::save_metadata(record)?;
            self.engine.handle_card_changed(record, None);
            Ok(())
        })?;
        self.emit(&ChangeEvent::CardChanged(source));
        Ok(())
    }

    /// Delete a resource, refusing while anything still references it.
    pub fn remove_resource(&self, name: &str) -> Result<(), CardoError> {
        let name = ResourceName::parse(name)?;
        self.lock.with_writer("remove resource", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            if name.prefix() != state.local_prefix() {
                return Err(CardoError::ReadOnlyModule(name.to_string()));
            }
            let usage = resource_usage(state, &name)?;
            if !usage.is_empty() {
                return Err(CardoError::ResourceInUse {
                    name: name.to_string(),
                    usage: usage.join(", "),
                });
            }
            token.check("remove resource")?;

            let entry = state.resources.remove(&name)?;
            let result = match &entry {
                ResourceEntry::CardType(r) => r.delete(),
                ResourceEntry::FieldType(r) => r.delete(),
                ResourceEntry::LinkType(r) => r.delete(),
                ResourceEntry::Workflow(r) => r.delete(),
                ResourceEntry::Template(r) => r.delete(),
                ResourceEntry::Report(r) => r.delete(),
                ResourceEntry::GraphModel(r) => r.delete(),
                ResourceEntry::GraphView(r) => r.delete(),
                ResourceEntry::Calculation(r) => r.delete(),
            };
            if let Err(error) = result {
                state.resources.add(entry)?;
                return Err(error);
            }
            if name.resource_type() == ResourceType::Templates {
                let template_cards: Vec<CardKey> = state
                    .cards
                    .template_cards(&name.to_string())
                    .map(|records| records.iter().map(|r| r.key.clone()).collect())
                    .unwrap_or_default();
                for key in template_cards {
                    self.engine.handle_delete_card(&key);
                }
                state.cards.delete_cards_from_template(&name.to_string());
            }
            self.engine.handle_resource_removed(&name);
            Ok(())
        })?;
        self.emit(&ChangeEvent::ResourceChanged(name));
        Ok(())
    }

    /// Remove an imported module and its on-disk mirror.
    pub fn remove_module(&self, prefix: &str) -> Result<(), CardoError> {
        self.lock.with_writer("remove module", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            state.config.remove_module(prefix)?;
            let dir = self.paths().module_dir(prefix);
            token.check("remove module")?;
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| CardoError::write(&dir, e))?;
            }
            state.resources.remove_module(prefix);
            state.cards.sync_templates(Self::template_roots(&state.resources));
            state.cards.refresh_if_stale()?;
            self.engine.generate(&state.engine_inputs())?;
            Ok(())
        })?;
        self.emit(&ChangeEvent::ModuleRemoved(prefix.to_string()));
        Ok(())
    }
}

/// Where a resource is still referenced; empty when it is safe to delete.
fn resource_usage(state: &ProjectState, name: &ResourceName) -> Result<Vec<String>, CardoError> {
    let mut usage = Vec::new();
    let name_str = name.to_string();

    match name.resource_type() {
        ResourceType::CardTypes => {
            for record in state.cards.cards(None)? {
                if record.metadata.card_type == *name {
                    usage.push(format!("card {}", record.key));
                }
            }
            for template in state.resources.resource_names(ResourceType::Templates, ResourceScope::Local)
            {
                for record in state.cards.template_cards(&template.to_string())? {
                    if record.metadata.card_type == *name {
                        usage.push(format!("template card {}", record.key));
                    }
                }
            }
        }
        ResourceType::Workflows => {
            for ct in state.resources.resource_names(ResourceType::CardTypes, ResourceScope::Local)
            {
                let card_type = state.resources.card_type(&ct)?;
                if card_type.show().workflow == *name {
                    usage.push(format!("card type {ct}"));
                }
            }
        }
        ResourceType::FieldTypes => {
            for ct in state.resources.resource_names(ResourceType::CardTypes, ResourceScope::Local)
            {
                let card_type = state.resources.card_type(&ct)?;
                if card_type.show().has_field(&name_str) {
                    usage.push(format!("card type {ct}"));
                }
            }
            for record in state.cards.cards(None)? {
                if record.metadata.field(&name_str).is_some() {
                    usage.push(format!("card {}", record.key));
                }
            }
        }
        ResourceType::LinkTypes => {
            for record in state.cards.cards(None)? {
                if record.metadata.links.iter().any(|l| l.link_type == *name) {
                    usage.push(format!("card {}", record.key));
                }
            }
        }
        // Templates, reports, graphs and calculations are never referenced by
        // surviving cards; deleting a template drops its card partition.
        _ => {}
    }
    Ok(usage)
}
