//! Resource objects: typed I/O over the documents in `.cards/`.
//!
//! Each resource kind wraps the same file plumbing; type-specific behaviour
//! lives with its data struct. Module resources are read-only: every mutation
//! checks the owning prefix first.

mod calculation;
mod card_type;
mod field_type;
mod graph;
mod link_type;
mod report;
mod template;
mod update;
mod workflow;

pub use calculation::{CalculationData, CalculationResource};
pub use card_type::{CardTypeData, CustomFieldRef};
pub use field_type::{DataType, EnumValue, FieldTypeData};
pub use graph::{GraphModelData, GraphViewData, MODEL_PROGRAM_FILE, VIEW_TEMPLATE_FILE};
pub use link_type::LinkTypeData;
pub use report::{CONTENT_TEMPLATE_FILE, QUERY_TEMPLATE_FILE, ReportData};
pub use template::{CARD_SHAPE_MARKER, TemplateData, TemplateResource};
pub use update::{UpdateOp, apply as apply_update};
pub use workflow::{ANY_STATE, WorkflowData, WorkflowState, WorkflowTransition};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::{ResourceName, ResourceType};
use crate::error::CardoError;
use crate::paths::ProjectPaths;
use crate::schema;

/// Opaque handle to the owning project: enough to resolve paths and tell
/// local resources from module resources, without an owning back-pointer.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    pub paths: ProjectPaths,
    pub local_prefix: String,
}

impl ResourceContext {
    pub fn new(paths: ProjectPaths, local_prefix: impl Into<String>) -> Self {
        Self { paths, local_prefix: local_prefix.into() }
    }

    pub fn is_local(&self, name: &ResourceName) -> bool {
        name.prefix() == self.local_prefix
    }
}

/// Behaviour every resource document shares.
pub trait ResourceData: Clone + Serialize + DeserializeOwned {
    const RESOURCE_TYPE: ResourceType;
    const SCHEMA_ID: &'static str;

    fn name(&self) -> &ResourceName;
    fn set_name(&mut self, name: ResourceName);

    /// Content written when a resource is created without explicit data.
    fn default_for(name: &ResourceName) -> Self;

    /// Checks beyond the JSON schema that only need the document itself.
    fn intra_checks(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A resource backed by one JSON document (plus a content folder for the
/// folder-resource kinds).
#[derive(Debug, Clone)]
pub struct FileResource<D: ResourceData> {
    name: ResourceName,
    ctx: ResourceContext,
    data: D,
}

impl<D: ResourceData> FileResource<D> {
    /// Load an existing resource from disk.
    pub fn open(ctx: ResourceContext, name: ResourceName) -> Result<Self, CardoError> {
        let path = ctx.paths.resource_file(&name, &ctx.local_prefix);
        if !path.exists() {
            return Err(CardoError::ResourceNotFound(name.to_string()));
        }
        let value = schema::read_json(&path)?;
        let data: D = serde_json::from_value(value)
            .map_err(|e| CardoError::JsonParse { path, detail: e.to_string() })?;
        Ok(Self { name, ctx, data })
    }

    /// Create a new resource; fails when one already exists under the name.
    pub fn create(
        ctx: ResourceContext,
        name: ResourceName,
        provided: Option<D>,
    ) -> Result<Self, CardoError> {
        if !ctx.is_local(&name) {
            return Err(CardoError::ReadOnlyModule(name.to_string()));
        }
        validate_identifier(name.identifier())?;
        let path = ctx.paths.resource_file(&name, &ctx.local_prefix);
        if path.exists() {
            return Err(CardoError::ResourceExists(name.to_string()));
        }
        let mut data = provided.unwrap_or_else(|| D::default_for(&name));
        data.set_name(name.clone());
        let resource = Self { name, ctx, data };
        resource.check(None)?;
        resource.write()?;
        Ok(resource)
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// The parsed document.
    pub fn show(&self) -> &D {
        &self.data
    }

    /// The document as raw JSON.
    pub fn raw(&self) -> Result<Value, CardoError> {
        serde_json::to_value(&self.data)
            .map_err(|e| CardoError::InvalidInput(format!("Cannot serialize resource: {e}")))
    }

    pub fn file_path(&self) -> PathBuf {
        self.ctx.paths.resource_file(&self.name, &self.ctx.local_prefix)
    }

    pub fn content_dir(&self) -> PathBuf {
        self.ctx.paths.resource_folder(&self.name, &self.ctx.local_prefix)
    }

    pub fn is_module_resource(&self) -> bool {
        !self.ctx.is_local(&self.name)
    }

    /// Validate the stored document, or `content` when given.
    pub fn validate(&self, content: Option<&Value>) -> Result<Vec<String>, CardoError> {
        match content {
            Some(value) => {
                let mut violations = schema::validate(value, D::SCHEMA_ID)?;
                if violations.is_empty() {
                    match serde_json::from_value::<D>(value.clone()) {
                        Ok(data) => violations.extend(data.intra_checks()),
                        Err(e) => violations.push(e.to_string()),
                    }
                }
                Ok(violations)
            }
            None => {
                let value = self.raw()?;
                let mut violations = schema::validate(&value, D::SCHEMA_ID)?;
                violations.extend(self.data.intra_checks());
                Ok(violations)
            }
        }
    }

    fn check(&self, value: Option<&Value>) -> Result<(), CardoError> {
        let violations = self.validate(value)?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CardoError::SchemaViolation(violations.join("\n\n")))
        }
    }

    /// Apply one update operation to the document and persist it.
    ///
    /// Validation runs on the updated document before anything is written;
    /// on failure the file is untouched.
    pub fn update(&mut self, key: &str, op: UpdateOp) -> Result<(), CardoError> {
        self.guard_mutable()?;
        let mut value = self.raw()?;
        update::apply(&mut value, key, op)?;
        self.check(Some(&value))?;
        let data: D = serde_json::from_value(value.clone())
            .map_err(|e| CardoError::JsonParse { path: self.file_path(), detail: e.to_string() })?;
        schema::write_json(&self.file_path(), &value)?;
        self.data = data;
        Ok(())
    }

    /// Remove the resource's document (and content folder, if any).
    pub fn delete(&self) -> Result<(), CardoError> {
        self.guard_mutable()?;
        let path = self.file_path();
        fs::remove_file(&path).map_err(|e| CardoError::write(&path, e))?;
        if D::RESOURCE_TYPE.is_folder_resource() {
            let dir = self.content_dir();
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| CardoError::write(&dir, e))?;
            }
        }
        Ok(())
    }

    /// Rename this resource on disk and in its own document.
    ///
    /// Rewriting references held by other files is the caller's concern; the
    /// renamed resource itself is written last so a failed rewrite never
    /// leaves a resource pointing at itself under the old name.
    pub fn rename(&mut self, new_name: ResourceName) -> Result<(), CardoError> {
        self.guard_mutable()?;
        if new_name.resource_type() != D::RESOURCE_TYPE {
            return Err(CardoError::InvalidInput(format!(
                "Cannot rename '{}' across resource types to '{new_name}'",
                self.name
            )));
        }
        if new_name.prefix() != self.ctx.local_prefix {
            return Err(CardoError::InvalidInput(format!(
                "Renamed resource '{new_name}' must keep the project prefix '{}'",
                self.ctx.local_prefix
            )));
        }
        validate_identifier(new_name.identifier())?;
        let new_file = self.ctx.paths.resource_file(&new_name, &self.ctx.local_prefix);
        if new_file.exists() {
            return Err(CardoError::ResourceExists(new_name.to_string()));
        }

        if D::RESOURCE_TYPE.is_folder_resource() {
            let old_dir = self.content_dir();
            let new_dir = self.ctx.paths.resource_folder(&new_name, &self.ctx.local_prefix);
            if old_dir.exists() {
                fs::rename(&old_dir, &new_dir).map_err(|e| CardoError::write(&new_dir, e))?;
            }
            // The document moved with the folder; drop the stale inner name.
            let moved_doc = new_dir.join(format!("{}.json", self.name.identifier()));
            if moved_doc.exists() && moved_doc != new_file {
                fs::rename(&moved_doc, &new_file).map_err(|e| CardoError::write(&new_file, e))?;
            }
        } else {
            let old_file = self.file_path();
            fs::rename(&old_file, &new_file).map_err(|e| CardoError::write(&new_file, e))?;
        }

        self.name = new_name.clone();
        self.data.set_name(new_name);
        self.write()
    }

    /// File names inside the content folder, relative to it.
    pub fn show_file_names(&self) -> Result<Vec<String>, CardoError> {
        let dir = self.content_dir();
        let mut names = Vec::new();
        if dir.exists() {
            collect_files(&dir, &mut |path| {
                if let Ok(rel) = path.strip_prefix(&dir) {
                    names.push(rel.to_string_lossy().into_owned());
                }
            })?;
        }
        names.sort();
        Ok(names)
    }

    /// Content of one file inside the content folder.
    pub fn show_file(&self, relative: &str) -> Result<String, CardoError> {
        let path = self.content_file(relative)?;
        fs::read_to_string(&path).map_err(|e| CardoError::read(&path, e))
    }

    /// Overwrite one file inside the content folder.
    pub fn update_file(&self, relative: &str, content: &str) -> Result<(), CardoError> {
        self.guard_mutable()?;
        let path = self.content_file(relative)?;
        schema::write_atomic(&path, content.as_bytes())
    }

    fn content_file(&self, relative: &str) -> Result<PathBuf, CardoError> {
        let rel = Path::new(relative);
        if rel.is_absolute() || rel.components().any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(CardoError::InvalidInput(format!(
                "Content file path '{relative}' must be relative and stay inside the resource"
            )));
        }
        Ok(self.content_dir().join(rel))
    }

    fn guard_mutable(&self) -> Result<(), CardoError> {
        if self.is_module_resource() {
            return Err(CardoError::ReadOnlyModule(self.name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn write(&self) -> Result<(), CardoError> {
        let value = self.raw()?;
        schema::write_json(&self.file_path(), &value)
    }
}

/// Windows device names that cannot be used as file stems.
const RESERVED_IDENTIFIERS: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Enforce the resource identifier pattern `^[A-Za-z][A-Za-z0-9-]*$`.
pub fn validate_identifier(identifier: &str) -> Result<(), CardoError> {
    let mut chars = identifier.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        _ => false,
    };
    if !valid {
        return Err(CardoError::InvalidInput(format!(
            "Resource identifier '{identifier}' must start with a letter and contain only letters, digits and '-'"
        )));
    }
    if RESERVED_IDENTIFIERS.contains(&identifier.to_ascii_lowercase().as_str()) {
        return Err(CardoError::InvalidInput(format!(
            "Resource identifier '{identifier}' is a reserved name"
        )));
    }
    Ok(())
}

/// Extensions scanned when rewriting resource references.
pub(crate) const REFERENCE_EXTENSIONS: &[&str] = &["adoc", "json", "hbs", "j2", "lp"];

/// Replace every occurrence of `old` with `new` in reference-bearing files
/// under `roots`. Returns the number of files touched.
pub fn rewrite_references(roots: &[PathBuf], old: &str, new: &str) -> Result<usize, CardoError> {
    let mut touched = 0;
    for root in roots {
        if !root.exists() {
            continue;
        }
        let mut files = Vec::new();
        collect_files(root, &mut |path| files.push(path.to_path_buf()))?;
        for path in files {
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
            if !REFERENCE_EXTENSIONS.contains(&ext) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else { continue };
            if !content.contains(old) {
                continue;
            }
            let replaced = content.replace(old, new);
            schema::write_atomic(&path, replaced.as_bytes())?;
            touched += 1;
        }
    }
    Ok(touched)
}

/// Depth-first walk over regular files.
pub(crate) fn collect_files(
    dir: &Path,
    visit: &mut dyn FnMut(&Path),
) -> Result<(), CardoError> {
    let entries = fs::read_dir(dir).map_err(|e| CardoError::read(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CardoError::read(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, visit)?;
        } else if path.is_file() {
            visit(&path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_pattern() {
        assert!(validate_identifier("page").is_ok());
        assert!(validate_identifier("Page-2").is_ok());
        assert!(validate_identifier("2page").is_err());
        assert!(validate_identifier("42").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("with_underscore").is_err());
    }

    #[test]
    fn reserved_names_are_rejected() {
        assert!(validate_identifier("con").is_err());
        assert!(validate_identifier("COM1").is_err());
        assert!(validate_identifier("console").is_ok());
    }
}
