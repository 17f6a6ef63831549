use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{FileResource, ResourceContext, ResourceData, UpdateOp};
use crate::domain::{ResourceName, ResourceType};
use crate::error::CardoError;
use crate::schema;

/// A calculation: a named logic program fed to the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ResourceData for CalculationData {
    const RESOURCE_TYPE: ResourceType = ResourceType::Calculations;
    const SCHEMA_ID: &'static str = "calculationSchema";

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

/// Calculation resource: the JSON document plus an `<id>.lp` program file in
/// the same folder.
#[derive(Debug, Clone)]
pub struct CalculationResource {
    inner: FileResource<CalculationData>,
}

impl CalculationResource {
    pub fn open(ctx: ResourceContext, name: ResourceName) -> Result<Self, CardoError> {
        Ok(Self { inner: FileResource::open(ctx, name)? })
    }

    pub fn create(
        ctx: ResourceContext,
        name: ResourceName,
        program: Option<&str>,
    ) -> Result<Self, CardoError> {
        let inner = FileResource::create(ctx, name, None)?;
        let resource = Self { inner };
        schema::write_atomic(&resource.lp_path(), program.unwrap_or("").as_bytes())?;
        Ok(resource)
    }

    pub fn name(&self) -> &ResourceName {
        self.inner.name()
    }

    pub fn show(&self) -> &CalculationData {
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

    /// Path of the logic program next to the JSON document.
    pub fn lp_path(&self) -> PathBuf {
        self.inner.file_path().with_extension("lp")
    }

    /// The logic program text; `None` when the `.lp` file is missing.
    pub fn show_program(&self) -> Result<Option<String>, CardoError> {
        let path = self.lp_path();
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path).map(Some).map_err(|e| CardoError::read(&path, e))
    }

    pub fn update_program(&self, text: &str) -> Result<(), CardoError> {
        if self.is_module_resource() {
            return Err(CardoError::ReadOnlyModule(self.name().to_string()));
        }
        schema::write_atomic(&self.lp_path(), text.as_bytes())
    }

    pub fn delete(&self) -> Result<(), CardoError> {
        let lp = self.lp_path();
        self.inner.delete()?;
        if lp.exists() {
            fs::remove_file(&lp).map_err(|e| CardoError::write(&lp, e))?;
        }
        Ok(())
    }

    pub fn rename(&mut self, new_name: ResourceName) -> Result<(), CardoError> {
        let old_lp = self.lp_path();
        self.inner.rename(new_name)?;
        let new_lp = self.lp_path();
        if old_lp.exists() {
            fs::rename(&old_lp, &new_lp).map_err(|e| CardoError::write(&new_lp, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::ProjectPaths;

    fn context(root: &std::path::Path) -> ResourceContext {
        ResourceContext::new(ProjectPaths::new(root), "demo")
    }

    #[test]
    fn create_writes_document_and_program() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let name = ResourceName::new("demo", ResourceType::Calculations, "velocity");
        let calc = CalculationResource::create(ctx, name, Some("velocity(X) :- card(X).\n")).unwrap();

        assert!(calc.lp_path().exists());
        assert_eq!(calc.show_program().unwrap().unwrap(), "velocity(X) :- card(X).\n");
    }

    #[test]
    fn missing_program_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let name = ResourceName::new("demo", ResourceType::Calculations, "velocity");
        let calc = CalculationResource::create(ctx, name, None).unwrap();
        fs::remove_file(calc.lp_path()).unwrap();
        assert_eq!(calc.show_program().unwrap(), None);
    }

    #[test]
    fn rename_moves_the_program_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let name = ResourceName::new("demo", ResourceType::Calculations, "velocity");
        let mut calc = CalculationResource::create(ctx, name, Some("a(1).")).unwrap();

        calc.rename(ResourceName::new("demo", ResourceType::Calculations, "pace")).unwrap();
        assert_eq!(calc.name().identifier(), "pace");
        assert!(calc.lp_path().ends_with("pace.lp"));
        assert_eq!(calc.show_program().unwrap().unwrap(), "a(1).");
    }
}
