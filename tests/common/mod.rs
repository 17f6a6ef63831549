//! Shared testing utilities for cardo integration tests.

use std::path::{Path, PathBuf};

use cardo::commands::CommandManager;
use cardo::domain::ResourceType;
use tempfile::TempDir;

/// Testing harness providing an isolated project on disk.
#[allow(dead_code)]
pub struct TestContext {
    root: TempDir,
    manager: CommandManager,
}

#[allow(dead_code)]
impl TestContext {
    /// Create a fresh project with the standard fixture resources:
    /// workflow `simple`, card type `page`, a `page` template holding a
    /// parent/child pair of template cards, and a `number` field type.
    pub fn new() -> Self {
        Self::with_prefix("demo")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp directory for tests");
        let project_dir = root.path().join("project");
        std::fs::create_dir_all(&project_dir).expect("Failed to create project directory");
        let manager = CommandManager::create(&project_dir, "Demo project", prefix)
            .expect("Failed to create test project");
        let ctx = Self { root, manager };
        ctx.seed_fixture(prefix);
        ctx
    }

    fn seed_fixture(&self, prefix: &str) {
        let project = self.manager.project();
        project
            .create_resource(ResourceType::Workflows, "simple")
            .expect("create workflow");
        project
            .create_resource(ResourceType::CardTypes, "page")
            .expect("create card type");
        project
            .create_resource(ResourceType::FieldTypes, "estimate")
            .expect("create field type");
        project
            .update_resource(
                &format!("{prefix}/fieldTypes/estimate"),
                "dataType",
                cardo::resources::UpdateOp::Set(serde_json::json!("number")),
            )
            .expect("set field data type");
        project
            .create_resource(ResourceType::Templates, "page")
            .expect("create template");

        let template = format!("{prefix}/templates/page");
        let card_type = format!("{prefix}/cardTypes/page");
        let parent = project
            .create_template_card(&template, &card_type, None)
            .expect("create template card");
        project
            .create_template_card(&template, &card_type, Some(&parent))
            .expect("create child template card");
    }

    /// The command manager over the fixture project.
    pub fn manager(&self) -> &CommandManager {
        &self.manager
    }

    pub fn project(&self) -> &std::sync::Arc<cardo::Project> {
        self.manager.project()
    }

    /// Root directory of the fixture project.
    pub fn project_dir(&self) -> PathBuf {
        self.root.path().join("project")
    }

    /// Scratch space outside the project.
    pub fn scratch_dir(&self) -> &Path {
        self.root.path()
    }

    /// Create a second, independent project usable as a module source.
    pub fn module_source(&self, prefix: &str) -> PathBuf {
        let dir = self.root.path().join(format!("module-{prefix}"));
        std::fs::create_dir_all(&dir).expect("Failed to create module directory");
        let manager = CommandManager::create(&dir, "Module project", prefix)
            .expect("Failed to create module project");
        let project = manager.project();
        project
            .create_resource(ResourceType::Workflows, "simple")
            .expect("create module workflow");
        project
            .create_resource(ResourceType::CardTypes, "page")
            .expect("create module card type");
        project
            .create_resource(ResourceType::Templates, "page")
            .expect("create module template");
        let template = format!("{prefix}/templates/page");
        let card_type = format!("{prefix}/cardTypes/page");
        project
            .create_template_card(&template, &card_type, None)
            .expect("create module template card");
        manager.close();
        dir
    }

    /// Create one card tree from the fixture template; returns the keys.
    pub fn create_page_cards(&self) -> Vec<cardo::CardKey> {
        self.project()
            .create_card("demo/templates/page", None)
            .expect("create card from template")
    }
}
