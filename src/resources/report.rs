use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ResourceData;
use crate::domain::{ResourceName, ResourceType};

/// File inside a report's content folder holding the query template.
pub const QUERY_TEMPLATE_FILE: &str = "query.lp.j2";

/// File inside a report's content folder holding the content template.
pub const CONTENT_TEMPLATE_FILE: &str = "content.adoc.j2";

/// A report: a parameter schema plus query and content templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// JSON Schema constraining the report parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ReportData {
    /// Check report parameters against the declared parameter schema.
    pub fn check_parameters(&self, parameters: &Value) -> Result<(), String> {
        let Some(schema) = &self.schema else { return Ok(()) };
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| format!("Parameter schema of '{}' does not compile: {e}", self.name))?;
        let violations: Vec<String> =
            validator.iter_errors(parameters).map(|e| e.to_string()).collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations.join("\n\n"))
        }
    }
}

impl ResourceData for ReportData {
    const RESOURCE_TYPE: ResourceType = ResourceType::Reports;
    const SCHEMA_ID: &'static str = "reportSchema";

    fn name(&self) -> &ResourceName {
        &self.name
    }

    fn set_name(&mut self, name: ResourceName) {
        self.name = name;
    }

    fn default_for(name: &ResourceName) -> Self {
        Self {
            name: name.clone(),
            display_name: None,
            description: None,
            category: None,
            schema: None,
        }
    }

    fn intra_checks(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if let Some(schema) = &self.schema
            && let Err(e) = jsonschema::validator_for(schema)
        {
            violations.push(format!("Parameter schema does not compile: {e}"));
        }
        violations
    }
}
