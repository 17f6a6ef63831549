//! Create commands: cards from templates, attachments, resources, labels and
//! links.

use std::collections::BTreeMap;
use std::fs;

use super::ChangeEvent;
use crate::cache::ResourceEntry;
use crate::domain::{CardKey, CardLink, CardRecord, Rank, ResourceName, ResourceType};
use crate::error::CardoError;
use crate::paths::{ATTACHMENTS_DIR, CHILDREN_DIR};
use crate::project::{Project, ProjectState, parse_card_key};
use crate::resources::{
    CalculationResource, FileResource, ResourceContext, TemplateResource,
};
use crate::schema;

/// Resolve a resource argument: a full `prefix/type/identifier` reference or
/// a bare identifier looked up locally first, then in modules.
pub(crate) fn resolve_resource_name(
    state: &ProjectState,
    input: &str,
    rt: ResourceType,
) -> Result<ResourceName, CardoError> {
    if let Ok(name) = ResourceName::parse(input) {
        if name.resource_type() != rt {
            return Err(CardoError::InvalidInput(format!(
                "'{input}' is not a {} reference",
                rt.as_str()
            )));
        }
        return Ok(name);
    }
    state
        .resources
        .find(rt, input)
        .map(|entry| entry.name().clone())
        .ok_or_else(|| match rt {
            ResourceType::Templates => CardoError::TemplateNotFound(input.to_string()),
            _ => CardoError::ResourceNotFound(input.to_string()),
        })
}

impl Project {
    /// Create cards by cloning a template's card tree.
    ///
    /// Fresh keys are minted for every clone, topology is preserved, and each
    /// card starts in its workflow's initial state. Returns the created keys
    /// in preorder.
    pub fn create_card(
        &self,
        template: &str,
        parent: Option<&CardKey>,
    ) -> Result<Vec<CardKey>, CardoError> {
        let keys = self.lock.with_writer("create card", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            let local_prefix = state.local_prefix();

            let template_name = resolve_resource_name(state, template, ResourceType::Templates)?;
            state.resources.template(&template_name)?;
            let template_cards: Vec<CardRecord> = state
                .cards
                .template_cards(&template_name.to_string())?
                .into_iter()
                .cloned()
                .collect();
            if template_cards.is_empty() {
                return Err(CardoError::InvalidInput(format!(
                    "Template '{template_name}' has no cards"
                )));
            }

            let dest_dir = match parent {
                Some(parent_key) => {
                    let record = state.cards.find(parent_key)?;
                    record.path.join(CHILDREN_DIR)
                }
                None => self.paths().card_root(),
            };

            // Mint every key up front so links between clones can be mapped.
            let mut existing = state.cards.all_keys();
            let mut key_map: BTreeMap<CardKey, CardKey> = BTreeMap::new();
            for card in &template_cards {
                let minted = CardKey::mint(&local_prefix, &existing)?;
                existing.insert(minted.clone());
                key_map.insert(card.key.clone(), minted);
            }

            // Top-level clones are ranked after the destination's last child.
            let mut previous_rank = match parent {
                Some(parent_key) => {
                    let record = state.cards.find(parent_key)?;
                    record
                        .children
                        .last()
                        .and_then(|k| state.cards.find(k).ok())
                        .map(|r| r.metadata.rank.clone())
                }
                None => state
                    .cards
                    .cards(None)?
                    .iter()
                    .filter(|r| r.parent.is_none())
                    .next_back()
                    .map(|r| r.metadata.rank.clone()),
            };

            let mut new_records: Vec<CardRecord> = Vec::new();
            let mut paths_by_key: BTreeMap<CardKey, std::path::PathBuf> = BTreeMap::new();
            for card in &template_cards {
                token.check("create card")?;
                let new_key = key_map[&card.key].clone();
                let (new_parent, parent_dir) = match &card.parent {
                    Some(template_parent) => {
                        let mapped = key_map[template_parent].clone();
                        let dir = paths_by_key[&mapped].join(CHILDREN_DIR);
                        (Some(mapped), dir)
                    }
                    None => (parent.cloned(), dest_dir.clone()),
                };
                let new_dir = parent_dir.join(new_key.as_str());

                let card_type = state.resources.card_type(&card.metadata.card_type)?;
                let workflow = state.resources.workflow(&card_type.show().workflow)?;
                let initial = workflow.show().initial_state().ok_or_else(|| {
                    CardoError::InvalidInput(format!(
                        "Workflow '{}' has no states",
                        workflow.show().name
                    ))
                })?;

                let mut metadata = card.metadata.clone();
                metadata.workflow_state = initial.to_string();
                if card.parent.is_none() {
                    let rank = match &previous_rank {
                        Some(rank) => Rank::after(rank),
                        None => Rank::first(),
                    };
                    previous_rank = Some(rank.clone());
                    metadata.rank = rank;
                }
                for link in &mut metadata.links {
                    if let Some(mapped) = key_map.get(&link.card_key) {
                        link.card_key = mapped.clone();
                    }
                }

                fs::create_dir_all(&new_dir).map_err(|e| CardoError::write(&new_dir, e))?;
                let content = state.cards.content(&card.key)?;
                schema::write_atomic(
                    &new_dir.join(crate::cache::CONTENT_FILE),
                    content.as_bytes(),
                )?;
                if !card.attachments.is_empty() {
                    let attachments_dir = new_dir.join(ATTACHMENTS_DIR);
                    fs::create_dir_all(&attachments_dir)
                        .map_err(|e| CardoError::write(&attachments_dir, e))?;
                    for attachment in &card.attachments {
                        let from = card.path.join(ATTACHMENTS_DIR).join(attachment);
                        let to = attachments_dir.join(attachment);
                        fs::copy(&from, &to).map_err(|e| CardoError::write(&to, e))?;
                    }
                }

                let record = CardRecord {
                    key: new_key.clone(),
                    path: new_dir.clone(),
                    metadata,
                    parent: new_parent,
                    children: Vec::new(),
                    attachments: card.attachments.clone(),
                };
                crate::cache::CardCache::save_metadata(&record)?;
                paths_by_key.insert(new_key, new_dir);
                new_records.push(record);
            }

            for record in &new_records {
                state.cards.insert(record.clone());
            }

            // Mirror the new cards and let `onCreation` seed derived fields.
            self.ensure_engine(state)?;
            let refs: Vec<&CardRecord> = new_records.iter().collect();
            let updates = self.engine.handle_new_cards(&refs)?;
            for update in updates {
                let mut metadata = state.cards.find(&update.key)?.metadata.clone();
                metadata.set_field(&update.field, update.value);
                state.cards.update_metadata(&update.key, metadata)?;
                let record = state.cards.find(&update.key)?;
                crate::cache::CardCache::save_metadata(record)?;
                self.engine.handle_card_changed(record, None);
            }

            Ok(new_records.iter().map(|r| r.key.clone()).collect::<Vec<_>>())
        })?;

        self.emit(&ChangeEvent::CardsAdded(keys.clone()));
        Ok(keys)
    }

    /// Add one attachment file to a card.
    pub fn create_attachment(&self, key: &str, file: &str, bytes: &[u8]) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        self.lock.with_writer("create attachment", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            guard_local_card(state, &key)?;
            let record = state.cards.find_anywhere(&key)?;
            if record.attachments.iter().any(|a| a == file) {
                return Err(CardoError::AttachmentExists {
                    card: key.to_string(),
                    file: file.to_string(),
                });
            }
            let dir = record.path.join(ATTACHMENTS_DIR);
            fs::create_dir_all(&dir).map_err(|e| CardoError::write(&dir, e))?;
            token.check("create attachment")?;
            let path = dir.join(file);
            fs::write(&path, bytes).map_err(|e| CardoError::write(&path, e))?;

            if state.cards.add_attachment(&key, file).is_err() {
                // Template card: re-walk on next refresh.
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

    /// Create a resource of the given type with default content.
    pub fn create_resource(
        &self,
        rt: ResourceType,
        identifier: &str,
    ) -> Result<ResourceName, CardoError> {
        let name = self.lock.with_writer("create resource", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            let name = ResourceName::new(state.local_prefix(), rt, identifier);
            if state.resources.exists(&name) {
                return Err(CardoError::ResourceExists(name.to_string()));
            }
            let ctx = ResourceContext::new(self.paths().clone(), state.local_prefix());
            let entry = match rt {
                ResourceType::CardTypes => {
                    ResourceEntry::CardType(FileResource::create(ctx, name.clone(), None)?)
                }
                ResourceType::FieldTypes => {
                    ResourceEntry::FieldType(FileResource::create(ctx, name.clone(), None)?)
                }
                ResourceType::LinkTypes => {
                    ResourceEntry::LinkType(FileResource::create(ctx, name.clone(), None)?)
                }
                ResourceType::Workflows => {
                    ResourceEntry::Workflow(FileResource::create(ctx, name.clone(), None)?)
                }
                ResourceType::Templates => {
                    let template = TemplateResource::create(ctx, name.clone())?;
                    state.cards.add_template(&name.to_string(), template.cards_root());
                    ResourceEntry::Template(template)
                }
                ResourceType::Reports => {
                    ResourceEntry::Report(FileResource::create(ctx, name.clone(), None)?)
                }
                ResourceType::GraphModels => {
                    ResourceEntry::GraphModel(FileResource::create(ctx, name.clone(), None)?)
                }
                ResourceType::GraphViews => {
                    ResourceEntry::GraphView(FileResource::create(ctx, name.clone(), None)?)
                }
                ResourceType::Calculations => {
                    ResourceEntry::Calculation(CalculationResource::create(ctx, name.clone(), None)?)
                }
            };
            self.engine.handle_resource_changed(&entry)?;
            state.resources.add(entry)?;
            Ok(name)
        })?;
        self.emit(&ChangeEvent::ResourceChanged(name.clone()));
        Ok(name)
    }

    /// Create a card with the given card type inside a template's tree.
    pub fn create_template_card(
        &self,
        template: &str,
        card_type: &str,
        parent: Option<&CardKey>,
    ) -> Result<CardKey, CardoError> {
        let key = self.lock.with_writer("create template card", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            let local_prefix = state.local_prefix();
            let template_name = resolve_resource_name(state, template, ResourceType::Templates)?;
            let template_res = state.resources.template(&template_name)?;
            if template_res.is_module_resource() {
                return Err(CardoError::ReadOnlyModule(template_name.to_string()));
            }
            template_res.ensure_card_tree()?;
            let cards_root = template_res.cards_root();

            let card_type_name = resolve_resource_name(state, card_type, ResourceType::CardTypes)?;
            let card_type_res = state.resources.card_type(&card_type_name)?;
            let workflow = state.resources.workflow(&card_type_res.show().workflow)?;
            let initial = workflow.show().initial_state().ok_or_else(|| {
                CardoError::InvalidInput(format!(
                    "Workflow '{}' has no states",
                    workflow.show().name
                ))
            })?;

            let parent_dir = match parent {
                Some(parent_key) => {
                    let record = state.cards.find_anywhere(parent_key)?;
                    if !record.path.starts_with(&cards_root) {
                        return Err(CardoError::InvalidInput(format!(
                            "Card '{parent_key}' is not part of template '{template_name}'"
                        )));
                    }
                    record.path.join(CHILDREN_DIR)
                }
                None => cards_root.clone(),
            };

            let existing = state.cards.all_keys();
            let key = CardKey::mint(&local_prefix, &existing)?;
            let rank = state
                .cards
                .template_roots(&template_name.to_string())?
                .last()
                .map(|r| Rank::after(&r.metadata.rank))
                .unwrap_or_else(Rank::first);

            token.check("create template card")?;
            let dir = parent_dir.join(key.as_str());
            fs::create_dir_all(&dir).map_err(|e| CardoError::write(&dir, e))?;
            schema::write_atomic(&dir.join(crate::cache::CONTENT_FILE), b"")?;

            let metadata =
                crate::domain::CardMetadata::new(card_type_name, initial.to_string(), rank);
            let record = CardRecord {
                key: key.clone(),
                path: dir,
                metadata,
                parent: parent.cloned(),
                children: Vec::new(),
                attachments: Vec::new(),
            };
            crate::cache::CardCache::save_metadata(&record)?;
            self.engine.handle_card_changed(&record, Some(&template_name.to_string()));
            state.cards.insert_template_card(&template_name.to_string(), record);
            Ok(key)
        })?;
        self.emit(&ChangeEvent::CardsAdded(vec![key.clone()]));
        Ok(key)
    }

    /// Add a label to a card.
    pub fn create_label(&self, key: &str, label: &str) -> Result<(), CardoError> {
        let key = parse_card_key(key)?;
        let label = label.trim();
        if label.is_empty() {
            return Err(CardoError::InvalidInput("Label must not be empty".into()));
        }
        self.lock.with_writer("create label", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            let mut metadata = state.cards.find(&key)?.metadata.clone();
            if metadata.labels.iter().any(|l| l == label) {
                return Err(CardoError::ItemAlreadyExists(label.to_string()));
            }
            metadata.labels.push(label.to_string());
            state.cards.update_metadata(&key, metadata)?;
            let record = state.cards.find(&key)?;
            crate::cache::CardCache::save_metadata(record)?;
            self.engine.handle_card_changed(record, None);
            Ok(())
        })?;
        self.emit(&ChangeEvent::CardChanged(key));
        Ok(())
    }

    /// Create a typed link from one card to another.
    pub fn create_link(
        &self,
        source: &str,
        destination: &str,
        link_type: &str,
        description: Option<&str>,
    ) -> Result<(), CardoError> {
        let source = parse_card_key(source)?;
        let destination = parse_card_key(destination)?;
        self.lock.with_writer("create link", |state, _| {
            Self::refresh_state(&self.engine, state)?;
            let link_type_name = resolve_resource_name(state, link_type, ResourceType::LinkTypes)?;
            let link_type_res = state.resources.link_type(&link_type_name)?;
            let data = link_type_res.show().clone();

            if description.is_some() && !data.enable_link_description {
                return Err(CardoError::InvalidInput(format!(
                    "Link type '{link_type_name}' does not allow link descriptions"
                )));
            }

            let source_record = state.cards.find(&source)?;
            let destination_record = state.cards.find(&destination)?;
            if !data.allows_source(&source_record.metadata.card_type) {
                return Err(CardoError::InvalidInput(format!(
                    "Link type '{link_type_name}' does not allow source card type '{}'",
                    source_record.metadata.card_type
                )));
            }
            if !data.allows_destination(&destination_record.metadata.card_type) {
                return Err(CardoError::InvalidInput(format!(
                    "Link type '{link_type_name}' does not allow destination card type '{}'",
                    destination_record.metadata.card_type
                )));
            }

            let mut metadata = source_record.metadata.clone();
            let duplicate = metadata
                .links
                .iter()
                .any(|l| l.link_type == link_type_name && l.card_key == destination);
            if duplicate {
                return Err(CardoError::ItemAlreadyExists(format!(
                    "{link_type_name} -> {destination}"
                )));
            }
            metadata.links.push(CardLink {
                link_type: link_type_name,
                card_key: destination.clone(),
                link_description: description.map(str::to_string),
            });
            state.cards.update_metadata(&source, metadata)?;
            let record = state.cards.find(&source)?;
            crate::cache::CardCache::save_metadata(record)?;
            self.engine.handle_card_changed(record, None);
            Ok(())
        })?;
        self.emit(&ChangeEvent::CardChanged(source));
        Ok(())
    }
}

/// Reject mutations of cards owned by a module.
pub(crate) fn guard_local_card(state: &ProjectState, key: &CardKey) -> Result<(), CardoError> {
    if key.prefix() != state.local_prefix() {
        return Err(CardoError::ReadOnlyModule(key.to_string()));
    }
    Ok(())
}
