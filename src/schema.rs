//! JSON loading and validation against the bundled schemas.
//!
//! Schemas ship inside the binary; there is no network resolution. Validators
//! are compiled once and cached for the life of the process.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use include_dir::{Dir, include_dir};
use jsonschema::Validator;
use serde_json::Value;

use crate::error::CardoError;

static SCHEMAS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

/// Read and parse a JSON file, preserving the parse position in the error.
pub fn read_json(path: &Path) -> Result<Value, CardoError> {
    let text = fs::read_to_string(path).map_err(|e| CardoError::read(path, e))?;
    serde_json::from_str(&text)
        .map_err(|e| CardoError::JsonParse { path: path.to_path_buf(), detail: e.to_string() })
}

/// Write a JSON document atomically: temp file in the same directory, then
/// rename over the target.
pub fn write_json(path: &Path, value: &Value) -> Result<(), CardoError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CardoError::InvalidInput(format!("Cannot serialize JSON: {e}")))?;
    write_atomic(path, text.as_bytes())
}

/// Atomic byte write via temp file + rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CardoError> {
    let dir = path.parent().ok_or_else(|| {
        CardoError::InvalidInput(format!("Path '{}' has no parent directory", path.display()))
    })?;
    fs::create_dir_all(dir).map_err(|e| CardoError::write(dir, e))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CardoError::InvalidInput(format!("Invalid path '{}'", path.display())))?;
    let tmp = dir.join(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes).map_err(|e| CardoError::write(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CardoError::write(path, e))
}

fn validators() -> &'static BTreeMap<String, Validator> {
    static CACHE: OnceLock<BTreeMap<String, Validator>> = OnceLock::new();
    CACHE.get_or_init(|| {
        SCHEMAS
            .files()
            .filter_map(|file| {
                let id = file.path().file_stem()?.to_str()?.to_string();
                let schema: Value = serde_json::from_slice(file.contents())
                    .expect("bundled schemas are valid JSON");
                let validator =
                    jsonschema::validator_for(&schema).expect("bundled schemas compile");
                Some((id, validator))
            })
            .collect()
    })
}

/// Names of all bundled schemas.
pub fn schema_ids() -> impl Iterator<Item = &'static str> {
    validators().keys().map(String::as_str)
}

/// Validate a value against a bundled schema, returning one human-readable
/// line per violation. An empty list means the value conforms.
pub fn validate(value: &Value, schema_id: &str) -> Result<Vec<String>, CardoError> {
    let validator = validators()
        .get(schema_id)
        .ok_or_else(|| CardoError::InvalidInput(format!("Unknown schema '{schema_id}'")))?;
    Ok(validator
        .iter_errors(value)
        .map(|error| {
            let location = error.instance_path.to_string();
            if location.is_empty() {
                error.to_string()
            } else {
                format!("{location}: {error}")
            }
        })
        .collect())
}

/// Validate and fail with `SchemaViolation` when the value does not conform.
///
/// Violations are joined by blank lines to mirror the log formatting the
/// callers expect.
pub fn require_valid(value: &Value, schema_id: &str) -> Result<(), CardoError> {
    let violations = validate(value, schema_id)?;
    if violations.is_empty() {
        Ok(())
    } else {
        Err(CardoError::SchemaViolation(violations.join("\n\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_bundled_schemas_compile() {
        let ids: Vec<_> = schema_ids().collect();
        for required in [
            "cardBaseSchema",
            "cardTypeSchema",
            "workflowSchema",
            "fieldTypeSchema",
            "linkTypeSchema",
            "templateSchema",
            "reportSchema",
            "graphModelSchema",
            "graphViewSchema",
            "calculationSchema",
            "cardsConfigSchema",
        ] {
            assert!(ids.contains(&required), "missing schema {required}");
        }
    }

    #[test]
    fn valid_workflow_passes() {
        let value = serde_json::json!({
            "name": "demo/workflows/simple",
            "states": [
                {"name": "Draft", "category": "initial"},
                {"name": "Approved", "category": "closed"}
            ],
            "transitions": [
                {"name": "Approve", "fromState": ["Draft"], "toState": "Approved"}
            ]
        });
        assert!(validate(&value, "workflowSchema").unwrap().is_empty());
    }

    #[test]
    fn violations_carry_instance_paths() {
        let value = serde_json::json!({
            "name": "demo/workflows/simple",
            "states": [],
            "transitions": "nope"
        });
        let violations = validate(&value, "workflowSchema").unwrap();
        assert!(!violations.is_empty());
        assert!(violations.iter().any(|v| v.contains("/transitions")), "{violations:?}");
    }

    #[test]
    fn unknown_schema_id_is_rejected() {
        let err = validate(&serde_json::json!({}), "noSuchSchema").unwrap_err();
        assert!(err.to_string().contains("noSuchSchema"));
    }

    #[test]
    fn atomic_write_replaces_content(){
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("doc.json");
        write_json(&target, &serde_json::json!({"a": 1})).unwrap();
        write_json(&target, &serde_json::json!({"a": 2})).unwrap();
        let value = read_json(&target).unwrap();
        assert_eq!(value["a"], 2);
        assert!(!dir.path().join(".doc.json.tmp").exists());
    }
}
