//! Rename commands: single resources and the project prefix.

use std::fs;
use std::path::PathBuf;

use super::ChangeEvent;
use crate::cache::ResourceEntry;
use crate::config::ConfigStore;
use crate::domain::{ResourceName, ResourceType};
use crate::error::CardoError;
use crate::project::{Project, ProjectState};
use crate::resources::{rewrite_references, validate_identifier};

impl Project {
    /// Rename a local resource and rewrite every reference to it.
    ///
    /// References in card contents, card metadata, resource documents and
    /// logic programs are rewritten first; the renamed resource itself is
    /// written last.
    pub fn rename_resource(&self, name: &str, new_identifier: &str) -> Result<(), CardoError> {
        let old_name = ResourceName::parse(name)?;
        validate_identifier(new_identifier)?;
        let new_name = old_name.with_identifier(new_identifier);
        self.lock.with_writer("rename resource", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            if old_name.prefix() != state.local_prefix() {
                return Err(CardoError::ReadOnlyModule(old_name.to_string()));
            }
            if state.resources.exists(&new_name) {
                return Err(CardoError::ResourceExists(new_name.to_string()));
            }
            // Ensure the resource is present before touching other files.
            state.resources.by_name(&old_name)?;

            let roots = self.reference_roots(state);
            rewrite_references(&roots, &old_name.to_string(), &new_name.to_string())?;
            token.check("rename resource")?;

            let mut entry = state.resources.remove(&old_name)?;
            let rename_result = match &mut entry {
                ResourceEntry::CardType(r) => r.rename(new_name.clone()),
                ResourceEntry::FieldType(r) => r.rename(new_name.clone()),
                ResourceEntry::LinkType(r) => r.rename(new_name.clone()),
                ResourceEntry::Workflow(r) => r.rename(new_name.clone()),
                ResourceEntry::Template(r) => r.rename(new_name.clone()),
                ResourceEntry::Report(r) => r.rename(new_name.clone()),
                ResourceEntry::GraphModel(r) => r.rename(new_name.clone()),
                ResourceEntry::GraphView(r) => r.rename(new_name.clone()),
                ResourceEntry::Calculation(r) => r.rename(new_name.clone()),
            };
            match rename_result {
                Ok(()) => state.resources.add(entry)?,
                Err(error) => {
                    // Keep the instance under its old key; the caller can
                    // retry once the filesystem issue is resolved.
                    state.resources.add(entry)?;
                    return Err(error);
                }
            }

            // The rewrite touched other resources' documents and card
            // metadata on disk; re-scan both caches before regenerating.
            state.resources.changed();
            state.resources.refresh()?;
            state.cards.sync_templates(Self::template_roots(&state.resources));
            state.cards.changed();
            state.cards.refresh_if_stale()?;
            self.engine.generate(&state.engine_inputs())?;
            Ok(())
        })?;
        self.emit(&ChangeEvent::ResourceChanged(new_name));
        Ok(())
    }

    /// Rename the project prefix: configuration, resources, card keys and
    /// every textual reference, then rebuild caches and calculations.
    pub fn rename_project_prefix(&self, new_prefix: &str) -> Result<(), CardoError> {
        self.lock.with_writer("rename project", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            let old_prefix = state.local_prefix();
            if new_prefix.trim().is_empty() {
                return Err(CardoError::InvalidInput("Project prefix must not be empty".into()));
            }
            if new_prefix == old_prefix {
                return Err(CardoError::InvalidInput(format!(
                    "Project prefix is already '{new_prefix}'"
                )));
            }
            if state.resources.module_prefixes().iter().any(|p| p == new_prefix) {
                return Err(CardoError::PrefixCollision(new_prefix.to_string()));
            }

            // 1. Configuration first; everything else derives from it.
            state.config.set_card_prefix(new_prefix)?;
            token.check("rename project")?;

            // 2+4. Rewrite resource-name references (in the card-type →
            // workflow → field-type → others → template order) and card-key
            // references in every reference-bearing file.
            let roots = self.reference_roots(state);
            for rt in [
                ResourceType::CardTypes,
                ResourceType::Workflows,
                ResourceType::FieldTypes,
                ResourceType::LinkTypes,
                ResourceType::Reports,
                ResourceType::GraphModels,
                ResourceType::GraphViews,
                ResourceType::Calculations,
                ResourceType::Templates,
            ] {
                rewrite_references(
                    &roots,
                    &format!("{old_prefix}/{}/", rt.as_str()),
                    &format!("{new_prefix}/{}/", rt.as_str()),
                )?;
            }
            rewrite_references(&roots, &format!("\"{old_prefix}_"), &format!("\"{new_prefix}_"))?;
            token.check("rename project")?;

            // 3. Rename card directories depth-first, children before
            // parents, touching only the final path component.
            let mut card_dirs = Vec::new();
            for root in &roots {
                if !root.exists() {
                    continue;
                }
                collect_card_dirs(root, &old_prefix, &mut card_dirs)?;
            }
            card_dirs.sort_by_key(|path| std::cmp::Reverse(path.components().count()));
            for dir in card_dirs {
                let Some(name) = dir.file_name().and_then(|n| n.to_str()) else { continue };
                let renamed =
                    dir.with_file_name(name.replacen(&format!("{old_prefix}_"), &format!("{new_prefix}_"), 1));
                fs::rename(&dir, &renamed).map_err(|e| CardoError::write(&renamed, e))?;
            }
            token.check("rename project")?;

            // 5. Rebuild caches from the renamed tree.
            let config = ConfigStore::load(&self.paths().config_file())?;
            *state = Self::build_state(self.paths(), config)?;

            // 6. Regenerate calculations.
            self.engine.generate(&state.engine_inputs())?;
            Ok(())
        })
    }

    /// Directories whose files may carry resource-name references.
    fn reference_roots(&self, state: &ProjectState) -> Vec<PathBuf> {
        let mut roots = vec![self.paths().card_root(), self.paths().local_dir()];
        if let Some(version) = state.config.config().schema_version {
            roots.push(self.paths().versioned_resources_dir(version));
        }
        roots
    }
}

/// Collect card directories (directories named like `<prefix>_<id>`).
fn collect_card_dirs(
    dir: &std::path::Path,
    prefix: &str,
    out: &mut Vec<PathBuf>,
) -> Result<(), CardoError> {
    let entries = fs::read_dir(dir).map_err(|e| CardoError::read(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CardoError::read(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        collect_card_dirs(&path, prefix, out)?;
        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && name.starts_with(&format!("{prefix}_"))
        {
            out.push(path);
        }
    }
    Ok(())
}
