//! Module import.

use std::fs;
use std::path::Path;

use super::ChangeEvent;
use crate::config::ConfigStore;
use crate::domain::{ResourceType, is_valid_prefix};
use crate::error::CardoError;
use crate::paths::ProjectPaths;
use crate::project::Project;
use crate::resources::rewrite_references;

impl Project {
    /// Import another project's resources as a read-only module.
    ///
    /// The module prefix defaults to the source project's own prefix; a
    /// different prefix rewrites all references inside the copied tree.
    /// Returns the prefix the module was imported under.
    pub fn import_module(
        &self,
        source: &Path,
        prefix: Option<&str>,
    ) -> Result<String, CardoError> {
        let source_paths = ProjectPaths::new(source);
        let source_config = ConfigStore::load(&source_paths.config_file())?;
        let source_prefix = source_config.card_key_prefix().to_string();
        let prefix = prefix.unwrap_or(&source_prefix).to_string();
        if !is_valid_prefix(&prefix) {
            return Err(CardoError::InvalidInput(format!(
                "Module prefix '{prefix}' must match ^[a-z]{{1,10}}$"
            )));
        }

        self.lock.with_writer("import module", |state, token| {
            Self::refresh_state(&self.engine, state)?;
            if prefix == state.local_prefix() {
                return Err(CardoError::PrefixCollision(prefix.clone()));
            }
            if state.resources.module_prefixes().iter().any(|p| *p == prefix) {
                return Err(CardoError::ModuleAlreadyImported(prefix.clone()));
            }

            // Mirror the source's resource folders; its configuration stays
            // behind.
            let dest = self.paths().module_dir(&prefix);
            for rt in ResourceType::ALL {
                let from = source_paths.local_dir().join(rt.as_str());
                if !from.exists() {
                    continue;
                }
                token.check("import module")?;
                copy_dir(&from, &dest.join(rt.as_str()))?;
            }

            // An overridden prefix must hold inside the mirror as well.
            if prefix != source_prefix {
                for rt in ResourceType::ALL {
                    rewrite_references(
                        &[dest.clone()],
                        &format!("{source_prefix}/{}/", rt.as_str()),
                        &format!("{prefix}/{}/", rt.as_str()),
                    )?;
                }
                rewrite_references(
                    &[dest.clone()],
                    &format!("\"{source_prefix}_"),
                    &format!("\"{prefix}_"),
                )?;
                rename_card_dirs(&dest, &source_prefix, &prefix)?;
            }

            state.config.add_module(&prefix, &source.to_string_lossy(), self.paths().root())?;
            state.resources.add_module(&prefix);
            state.resources.refresh()?;
            state.cards.sync_templates(Self::template_roots(&state.resources));
            state.cards.refresh_if_stale()?;
            self.engine.generate(&state.engine_inputs())?;
            Ok(())
        })?;
        self.emit(&ChangeEvent::ModuleImported(prefix.clone()));
        Ok(prefix)
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), CardoError> {
    fs::create_dir_all(to).map_err(|e| CardoError::write(to, e))?;
    let entries = fs::read_dir(from).map_err(|e| CardoError::read(from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CardoError::read(from, e))?;
        let path = entry.path();
        let dest = to.join(entry.file_name());
        if path.is_dir() {
            copy_dir(&path, &dest)?;
        } else {
            fs::copy(&path, &dest).map_err(|e| CardoError::write(&dest, e))?;
        }
    }
    Ok(())
}

/// Rename `<old>_<id>` directories to `<new>_<id>`, deepest first.
fn rename_card_dirs(root: &Path, old: &str, new: &str) -> Result<(), CardoError> {
    let mut dirs = Vec::new();
    collect_dirs(root, &mut dirs)?;
    dirs.sort_by_key(|path| std::cmp::Reverse(path.components().count()));
    for dir in dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else { continue };
        if name.starts_with(&format!("{old}_")) {
            let renamed = dir.with_file_name(name.replacen(&format!("{old}_"), &format!("{new}_"), 1));
            fs::rename(&dir, &renamed).map_err(|e| CardoError::write(&renamed, e))?;
        }
    }
    Ok(())
}

fn collect_dirs(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), CardoError> {
    let entries = fs::read_dir(dir).map_err(|e| CardoError::read(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CardoError::read(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_dirs(&path, out)?;
            out.push(path);
        }
    }
    Ok(())
}
