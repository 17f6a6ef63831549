//! Canonical paths inside a `.cards/` project.

use std::path::{Path, PathBuf};

use crate::domain::{ResourceName, ResourceType};

/// The project metadata directory name.
pub const CARDS_DIR: &str = ".cards";

/// Subdirectory of `.cards/` holding the project's own resources.
pub const LOCAL_DIR: &str = "local";

/// Subdirectory of `.cards/` holding imported modules.
pub const MODULES_DIR: &str = "modules";

/// The card tree root directory name.
pub const CARD_ROOT_DIR: &str = "cardRoot";

/// The configuration file name.
pub const CONFIG_FILE: &str = "cardsConfig.json";

/// Child-cards folder inside a card directory.
pub const CHILDREN_DIR: &str = "c";

/// Attachments folder inside a card directory.
pub const ATTACHMENTS_DIR: &str = "a";

/// Resolves every on-disk location of a project rooted at a given path.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cards_dir(&self) -> PathBuf {
        self.root.join(CARDS_DIR)
    }

    /// `.cards/local/` — the project's own resources.
    pub fn local_dir(&self) -> PathBuf {
        self.cards_dir().join(LOCAL_DIR)
    }

    /// `.cards/modules/` — read-only imported modules.
    pub fn modules_dir(&self) -> PathBuf {
        self.cards_dir().join(MODULES_DIR)
    }

    /// `.cards/modules/<prefix>/`.
    pub fn module_dir(&self, prefix: &str) -> PathBuf {
        self.modules_dir().join(prefix)
    }

    /// `cardRoot/` — the project card tree.
    pub fn card_root(&self) -> PathBuf {
        self.root.join(CARD_ROOT_DIR)
    }

    /// `.cards/local/cardsConfig.json`.
    pub fn config_file(&self) -> PathBuf {
        self.local_dir().join(CONFIG_FILE)
    }

    /// `.cards/<schemaVersion>/resources/` — snapshot used by migrations.
    pub fn versioned_resources_dir(&self, schema_version: u32) -> PathBuf {
        self.cards_dir().join(schema_version.to_string()).join("resources")
    }

    /// Resource folder for one type, local or inside a module.
    pub fn resource_type_dir(&self, prefix: &str, local_prefix: &str, rt: ResourceType) -> PathBuf {
        let base = if prefix == local_prefix {
            self.local_dir()
        } else {
            self.module_dir(prefix)
        };
        base.join(rt.as_str())
    }

    /// The JSON document of a resource.
    ///
    /// File resources are `<identifier>.json`; folder resources keep their
    /// document at `<identifier>/<identifier>.json` next to the content.
    pub fn resource_file(&self, name: &ResourceName, local_prefix: &str) -> PathBuf {
        let dir = self.resource_type_dir(name.prefix(), local_prefix, name.resource_type());
        if name.resource_type().is_folder_resource() {
            dir.join(name.identifier()).join(format!("{}.json", name.identifier()))
        } else {
            dir.join(format!("{}.json", name.identifier()))
        }
    }

    /// The content folder of a folder resource.
    pub fn resource_folder(&self, name: &ResourceName, local_prefix: &str) -> PathBuf {
        self.resource_type_dir(name.prefix(), local_prefix, name.resource_type())
            .join(name.identifier())
    }

    /// `.cards/local/calculations/` (or the module equivalent).
    pub fn calculations_dir(&self, prefix: &str, local_prefix: &str) -> PathBuf {
        self.resource_type_dir(prefix, local_prefix, ResourceType::Calculations)
    }

    /// Derive the resource a changed file belongs to, if any.
    ///
    /// Used by the watcher to invalidate the smallest possible cache slice.
    pub fn resource_name_of(&self, path: &Path, local_prefix: &str) -> Option<ResourceName> {
        let relative = path.strip_prefix(self.cards_dir()).ok()?;
        let mut parts = relative.iter().filter_map(|c| c.to_str());
        let (prefix, type_str) = match parts.next()? {
            LOCAL_DIR => (local_prefix, parts.next()?),
            MODULES_DIR => (parts.next()?, parts.next()?),
            _ => return None,
        };
        let rt = ResourceType::parse(type_str)?;
        let identifier = parts.next()?;
        let identifier = identifier.strip_suffix(".json").unwrap_or(identifier);
        if identifier.is_empty() {
            return None;
        }
        Some(ResourceName::new(prefix, rt, identifier))
    }

    /// Whether a path lies inside the project card tree.
    pub fn in_card_root(&self, path: &Path) -> bool {
        path.starts_with(self.card_root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceType;

    fn paths() -> ProjectPaths {
        ProjectPaths::new("/proj")
    }

    #[test]
    fn file_resource_lives_directly_under_its_type_dir() {
        let name = ResourceName::new("demo", ResourceType::Workflows, "simple");
        assert_eq!(
            paths().resource_file(&name, "demo"),
            PathBuf::from("/proj/.cards/local/workflows/simple.json")
        );
    }

    #[test]
    fn folder_resource_keeps_document_inside_its_folder() {
        let name = ResourceName::new("demo", ResourceType::Templates, "page");
        assert_eq!(
            paths().resource_file(&name, "demo"),
            PathBuf::from("/proj/.cards/local/templates/page/page.json")
        );
        assert_eq!(
            paths().resource_folder(&name, "demo"),
            PathBuf::from("/proj/.cards/local/templates/page")
        );
    }

    #[test]
    fn module_resources_resolve_under_modules_dir() {
        let name = ResourceName::new("test", ResourceType::CardTypes, "page");
        assert_eq!(
            paths().resource_file(&name, "demo"),
            PathBuf::from("/proj/.cards/modules/test/cardTypes/page.json")
        );
    }

    #[test]
    fn derives_resource_name_from_changed_file() {
        let p = paths();
        let local = p
            .resource_name_of(Path::new("/proj/.cards/local/workflows/simple.json"), "demo")
            .unwrap();
        assert_eq!(local.to_string(), "demo/workflows/simple");

        let module = p
            .resource_name_of(
                Path::new("/proj/.cards/modules/test/templates/page/page.json"),
                "demo",
            )
            .unwrap();
        assert_eq!(module.to_string(), "test/templates/page");

        assert!(p.resource_name_of(Path::new("/proj/cardRoot/demo_1/index.json"), "demo").is_none());
    }

    #[test]
    fn versioned_resources_dir_is_keyed_by_schema_version() {
        assert_eq!(
            paths().versioned_resources_dir(3),
            PathBuf::from("/proj/.cards/3/resources")
        );
    }
}
