//! The card index: project cards plus a partition per template.
//!
//! The filesystem is the source of truth; `populate` walks it once and
//! commands keep the index current incrementally. The watcher marks the index
//! stale instead, and the next refresh re-walks.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{Card, CardKey, CardMetadata, CardRecord};
use crate::error::CardoError;
use crate::paths::{ATTACHMENTS_DIR, CHILDREN_DIR, ProjectPaths};
use crate::schema;

/// Card body file inside a card directory.
pub const CONTENT_FILE: &str = "index.adoc";

/// Card metadata file inside a card directory.
pub const METADATA_FILE: &str = "index.json";

#[derive(Debug, Default)]
struct Partition {
    roots: Vec<CardKey>,
    cards: BTreeMap<CardKey, CardRecord>,
}

impl Partition {
    fn sorted_children(&self, keys: &[CardKey]) -> Vec<CardKey> {
        let mut keys = keys.to_vec();
        keys.sort_by(|a, b| {
            let ra = self.cards.get(a).map(|c| c.metadata.rank.clone());
            let rb = self.cards.get(b).map(|c| c.metadata.rank.clone());
            ra.cmp(&rb).then_with(|| a.cmp(b))
        });
        keys
    }

    fn resort(&mut self) {
        let roots = self.sorted_children(&self.roots);
        self.roots = roots;
        let keys: Vec<CardKey> = self.cards.keys().cloned().collect();
        for key in keys {
            let children = self.cards[&key].children.clone();
            let sorted = self.sorted_children(&children);
            if let Some(record) = self.cards.get_mut(&key) {
                record.children = sorted;
            }
        }
    }

    fn preorder<'a>(&'a self, roots: &[CardKey], out: &mut Vec<&'a CardRecord>) {
        for key in roots {
            if let Some(record) = self.cards.get(key) {
                out.push(record);
                let children = record.children.clone();
                self.preorder(&children, out);
            }
        }
    }
}

/// Keyed index of project and template cards.
#[derive(Debug)]
pub struct CardCache {
    paths: ProjectPaths,
    project: Partition,
    templates: BTreeMap<String, Partition>,
    template_roots: Vec<(String, PathBuf)>,
    stale: bool,
}

impl CardCache {
    pub fn new(paths: ProjectPaths) -> Self {
        Self {
            paths,
            project: Partition::default(),
            templates: BTreeMap::new(),
            template_roots: Vec::new(),
            stale: true,
        }
    }

    /// Walk the filesystem once and (re)build every partition.
    ///
    /// `templates` lists each template's full name and card-tree root.
    pub fn populate(&mut self, templates: Vec<(String, PathBuf)>) -> Result<(), CardoError> {
        self.project = Partition::default();
        self.templates = BTreeMap::new();

        let card_root = self.paths.card_root();
        if card_root.exists() {
            let roots = self.read_children(&card_root, None)?;
            self.project.roots = roots;
            self.project.resort();
        }

        // read_children always fills self.project, so each template partition
        // is swapped in for the duration of its walk.
        for (name, root) in &templates {
            let mut partition = Partition::default();
            if root.exists() {
                std::mem::swap(&mut self.project, &mut partition);
                let result = self.read_children(root, None);
                std::mem::swap(&mut self.project, &mut partition);
                partition.roots = result?;
                partition.resort();
            }
            self.templates.insert(name.clone(), partition);
        }

        self.template_roots = templates;
        self.stale = false;
        debug!(
            cards = self.project.cards.len(),
            templates = self.templates.len(),
            "card cache populated"
        );
        Ok(())
    }

    /// Mark the whole index stale; the next refresh re-walks the filesystem.
    pub fn changed(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Adopt the current template list; a changed list marks the index stale.
    pub fn sync_templates(&mut self, templates: Vec<(String, PathBuf)>) {
        if self.template_roots != templates {
            self.template_roots = templates;
            self.stale = true;
        }
    }

    pub fn refresh_if_stale(&mut self) -> Result<(), CardoError> {
        if self.stale {
            let templates = self.template_roots.clone();
            self.populate(templates)?;
        }
        Ok(())
    }

    fn read_children(
        &mut self,
        dir: &Path,
        parent: Option<&CardKey>,
    ) -> Result<Vec<CardKey>, CardoError> {
        let mut keys = Vec::new();
        let listing = fs::read_dir(dir).map_err(|e| CardoError::read(dir, e))?;
        for entry in listing {
            let entry = entry.map_err(|e| CardoError::read(dir, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let Ok(key) = CardKey::new(name) else { continue };
            let record = self.read_card(&path, key.clone(), parent.cloned())?;
            keys.push(record.key.clone());
            self.project.cards.insert(record.key.clone(), record);
        }
        Ok(keys)
    }

    fn read_card(
        &mut self,
        path: &Path,
        key: CardKey,
        parent: Option<CardKey>,
    ) -> Result<CardRecord, CardoError> {
        let metadata_path = path.join(METADATA_FILE);
        let value = schema::read_json(&metadata_path)?;
        let metadata: CardMetadata = serde_json::from_value(value)
            .map_err(|e| CardoError::JsonParse { path: metadata_path, detail: e.to_string() })?;

        let attachments = list_attachments(path)?;
        let children_dir = path.join(CHILDREN_DIR);
        let children = if children_dir.exists() {
            self.read_children(&children_dir, Some(&key))?
        } else {
            Vec::new()
        };

        Ok(CardRecord { key, path: path.to_path_buf(), metadata, parent, children, attachments })
    }

    /// Find a project card.
    pub fn find(&self, key: &CardKey) -> Result<&CardRecord, CardoError> {
        self.project
            .cards
            .get(key)
            .ok_or_else(|| CardoError::CardNotFound(key.to_string()))
    }

    /// Find a card in any partition, template partitions included.
    pub fn find_anywhere(&self, key: &CardKey) -> Result<&CardRecord, CardoError> {
        if let Some(record) = self.project.cards.get(key) {
            return Ok(record);
        }
        self.templates
            .values()
            .find_map(|p| p.cards.get(key))
            .ok_or_else(|| CardoError::CardNotFound(key.to_string()))
    }

    pub fn is_template_card(&self, key: &CardKey) -> bool {
        self.templates.values().any(|p| p.cards.contains_key(key))
    }

    /// Depth-first preorder listing; siblings ordered by rank, then key.
    pub fn cards(&self, root: Option<&CardKey>) -> Result<Vec<&CardRecord>, CardoError> {
        let mut out = Vec::new();
        match root {
            Some(key) => {
                let record = self.find(key)?;
                out.push(record);
                self.project.preorder(&record.children, &mut out);
            }
            None => self.project.preorder(&self.project.roots.clone(), &mut out),
        }
        Ok(out)
    }

    /// Preorder listing of one template's cards.
    pub fn template_cards(&self, template: &str) -> Result<Vec<&CardRecord>, CardoError> {
        let partition = self
            .templates
            .get(template)
            .ok_or_else(|| CardoError::TemplateNotFound(template.to_string()))?;
        let mut out = Vec::new();
        partition.preorder(&partition.roots.clone(), &mut out);
        Ok(out)
    }

    /// Root-level template cards of one template, in sibling order.
    pub fn template_roots(&self, template: &str) -> Result<Vec<&CardRecord>, CardoError> {
        let partition = self
            .templates
            .get(template)
            .ok_or_else(|| CardoError::TemplateNotFound(template.to_string()))?;
        Ok(partition.roots.iter().filter_map(|k| partition.cards.get(k)).collect())
    }

    /// Every key in use, across project and template partitions.
    pub fn all_keys(&self) -> std::collections::BTreeSet<CardKey> {
        let mut keys: std::collections::BTreeSet<CardKey> =
            self.project.cards.keys().cloned().collect();
        for partition in self.templates.values() {
            keys.extend(partition.cards.keys().cloned());
        }
        keys
    }

    /// Sibling keys of a card (other children of its parent), sorted.
    pub fn siblings(&self, key: &CardKey) -> Result<Vec<CardKey>, CardoError> {
        let record = self.find(key)?;
        let keys = match &record.parent {
            Some(parent) => self.find(parent)?.children.clone(),
            None => self.project.roots.clone(),
        };
        Ok(keys)
    }

    /// Keys of a card and all its descendants.
    pub fn subtree_keys(&self, key: &CardKey) -> Result<Vec<CardKey>, CardoError> {
        let record = self.find(key)?;
        let mut out = vec![record];
        self.project.preorder(&record.children, &mut out);
        Ok(out.into_iter().map(|r| r.key.clone()).collect())
    }

    /// Whether `ancestor` lies on the parent chain of `key`.
    pub fn is_ancestor(&self, ancestor: &CardKey, key: &CardKey) -> Result<bool, CardoError> {
        let mut current = self.find(key)?.parent.clone();
        while let Some(parent) = current {
            if parent == *ancestor {
                return Ok(true);
            }
            current = self.find(&parent)?.parent.clone();
        }
        Ok(false)
    }

    /// The card body, empty when the content file is missing.
    pub fn content(&self, key: &CardKey) -> Result<String, CardoError> {
        let record = self.find_anywhere(key)?;
        let path = record.path.join(CONTENT_FILE);
        if !path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&path).map_err(|e| CardoError::read(&path, e))
    }

    /// A full card view for callers, body included.
    pub fn card(&self, key: &CardKey) -> Result<Card, CardoError> {
        let record = self.find_anywhere(key)?;
        Ok(Card {
            key: record.key.clone(),
            metadata: record.metadata.clone(),
            content: self.content(key)?,
            parent: record.parent.clone(),
            children: record.children.clone(),
            attachments: record.attachments.clone(),
        })
    }

    // Incremental updates, used by commands after their filesystem writes.

    /// Re-sort one sibling set after a rank or membership change.
    fn resort_children_of(&mut self, parent: Option<&CardKey>) {
        match parent {
            Some(parent_key) => {
                let children = self.project.cards.get(parent_key).map(|r| r.children.clone());
                if let Some(children) = children {
                    let sorted = self.project.sorted_children(&children);
                    if let Some(record) = self.project.cards.get_mut(parent_key) {
                        record.children = sorted;
                    }
                }
            }
            None => {
                let roots = self.project.roots.clone();
                self.project.roots = self.project.sorted_children(&roots);
            }
        }
    }

    /// Index a new project card.
    pub fn insert(&mut self, record: CardRecord) {
        let key = record.key.clone();
        let parent = record.parent.clone();
        self.project.cards.insert(key.clone(), record);
        match &parent {
            Some(parent_key) => {
                if let Some(parent_record) = self.project.cards.get_mut(parent_key)
                    && !parent_record.children.contains(&key)
                {
                    parent_record.children.push(key);
                }
            }
            None => {
                if !self.project.roots.contains(&key) {
                    self.project.roots.push(key);
                }
            }
        }
        self.resort_children_of(parent.as_ref());
    }

    /// Index a new template card.
    pub fn insert_template_card(&mut self, template: &str, record: CardRecord) {
        let partition = self.templates.entry(template.to_string()).or_default();
        let key = record.key.clone();
        let parent = record.parent.clone();
        partition.cards.insert(key.clone(), record);
        match parent {
            Some(parent_key) => {
                if let Some(parent_record) = partition.cards.get_mut(&parent_key)
                    && !parent_record.children.contains(&key)
                {
                    parent_record.children.push(key);
                }
            }
            None => partition.roots.push(key),
        }
        partition.resort();
    }

    /// Replace a project card's metadata and re-sort its siblings.
    pub fn update_metadata(&mut self, key: &CardKey, metadata: CardMetadata) -> Result<(), CardoError> {
        let parent = {
            let record = self
                .project
                .cards
                .get_mut(key)
                .ok_or_else(|| CardoError::CardNotFound(key.to_string()))?;
            record.metadata = metadata;
            record.parent.clone()
        };
        self.resort_children_of(parent.as_ref());
        Ok(())
    }

    /// Replace a template card's metadata.
    pub fn update_template_metadata(
        &mut self,
        key: &CardKey,
        metadata: CardMetadata,
    ) -> Result<(), CardoError> {
        for partition in self.templates.values_mut() {
            if let Some(record) = partition.cards.get_mut(key) {
                record.metadata = metadata;
                partition.resort();
                return Ok(());
            }
        }
        Err(CardoError::CardNotFound(key.to_string()))
    }

    /// Drop a project card and its descendants; returns the removed records.
    pub fn remove_subtree(&mut self, key: &CardKey) -> Result<Vec<CardRecord>, CardoError> {
        let keys = self.subtree_keys(key)?;
        let parent = self.find(key)?.parent.clone();
        match parent {
            Some(parent_key) => {
                if let Some(parent_record) = self.project.cards.get_mut(&parent_key) {
                    parent_record.children.retain(|k| k != key);
                }
            }
            None => self.project.roots.retain(|k| k != key),
        }
        let mut removed = Vec::new();
        for k in keys {
            if let Some(record) = self.project.cards.remove(&k) {
                removed.push(record);
            }
        }
        Ok(removed)
    }

    /// Re-attach a project card (and implicitly its subtree) elsewhere.
    pub fn reparent(
        &mut self,
        key: &CardKey,
        new_parent: Option<CardKey>,
        new_path: PathBuf,
    ) -> Result<(), CardoError> {
        let old_parent = self.find(key)?.parent.clone();
        match &old_parent {
            Some(parent_key) => {
                if let Some(parent_record) = self.project.cards.get_mut(parent_key) {
                    parent_record.children.retain(|k| k != key);
                }
            }
            None => self.project.roots.retain(|k| k != key),
        }

        let old_path = {
            let record = self
                .project
                .cards
                .get_mut(key)
                .ok_or_else(|| CardoError::CardNotFound(key.to_string()))?;
            let old_path = record.path.clone();
            record.parent = new_parent.clone();
            record.path = new_path.clone();
            old_path
        };

        // Paths of every descendant moved with the directory.
        let descendant_keys: Vec<CardKey> =
            self.subtree_keys(key)?.into_iter().filter(|k| k != key).collect();
        for k in descendant_keys {
            if let Some(record) = self.project.cards.get_mut(&k) {
                let previous = record.path.clone();
                if let Ok(rel) = previous.strip_prefix(&old_path) {
                    record.path = new_path.join(rel);
                }
            }
        }

        match &new_parent {
            Some(parent_key) => {
                if let Some(parent_record) = self.project.cards.get_mut(parent_key) {
                    parent_record.children.push(key.clone());
                }
            }
            None => {
                self.project.roots.push(key.clone());
            }
        }
        self.resort_children_of(new_parent.as_ref());
        Ok(())
    }

    /// Record a new attachment file name on a card.
    pub fn add_attachment(&mut self, key: &CardKey, file: &str) -> Result<(), CardoError> {
        let record = self
            .project
            .cards
            .get_mut(key)
            .ok_or_else(|| CardoError::CardNotFound(key.to_string()))?;
        if !record.attachments.iter().any(|a| a == file) {
            record.attachments.push(file.to_string());
            record.attachments.sort();
        }
        Ok(())
    }

    pub fn remove_attachment(&mut self, key: &CardKey, file: &str) -> Result<(), CardoError> {
        let record = self
            .project
            .cards
            .get_mut(key)
            .ok_or_else(|| CardoError::CardNotFound(key.to_string()))?;
        record.attachments.retain(|a| a != file);
        Ok(())
    }

    /// Drop one template's partition after the template is deleted.
    pub fn delete_cards_from_template(&mut self, template: &str) {
        self.templates.remove(template);
        self.template_roots.retain(|(name, _)| name != template);
    }

    /// Register a template partition for a newly created template.
    pub fn add_template(&mut self, template: &str, cards_root: PathBuf) {
        self.templates.entry(template.to_string()).or_default();
        if !self.template_roots.iter().any(|(name, _)| name == template) {
            self.template_roots.push((template.to_string(), cards_root));
        }
    }

    /// Write a card's metadata back to its `index.json`.
    pub fn save_metadata(record: &CardRecord) -> Result<(), CardoError> {
        let value = serde_json::to_value(&record.metadata)
            .map_err(|e| CardoError::InvalidInput(format!("Cannot serialize metadata: {e}")))?;
        schema::write_json(&record.path.join(METADATA_FILE), &value)
    }
}

fn list_attachments(card_dir: &Path) -> Result<Vec<String>, CardoError> {
    let dir = card_dir.join(ATTACHMENTS_DIR);
    let mut attachments = Vec::new();
    if dir.exists() {
        let listing = fs::read_dir(&dir).map_err(|e| CardoError::read(&dir, e))?;
        for entry in listing {
            let entry = entry.map_err(|e| CardoError::read(&dir, e))?;
            if entry.path().is_file()
                && let Some(name) = entry.path().file_name().and_then(|n| n.to_str())
            {
                attachments.push(name.to_string());
            }
        }
    }
    attachments.sort();
    Ok(attachments)
}
