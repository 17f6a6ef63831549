use serde::{Deserialize, Serialize};

use super::ResourceData;
use crate::domain::{ResourceName, ResourceType};

/// Reference from a card type to one of its custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldRef {
    /// Full field-type name (`prefix/fieldTypes/id`).
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_calculated: Option<bool>,
}

/// A card type: the workflow its cards follow plus the fields they carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardTypeData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub workflow: ResourceName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_fields: Vec<CustomFieldRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub always_visible_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optionally_visible_fields: Vec<String>,
}

impl CardTypeData {
    pub fn has_field(&self, field_type_name: &str) -> bool {
        self.custom_fields.iter().any(|f| f.name.to_string() == field_type_name)
    }
}

impl ResourceData for CardTypeData {
    const RESOURCE_TYPE: ResourceType = ResourceType::CardTypes;
    const SCHEMA_ID: &'static str = "cardTypeSchema";

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
            workflow: ResourceName::new(name.prefix(), ResourceType::Workflows, "simple"),
            custom_fields: Vec::new(),
            always_visible_fields: Vec::new(),
            optionally_visible_fields: Vec::new(),
        }
    }

    fn intra_checks(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for visible in self.always_visible_fields.iter().chain(&self.optionally_visible_fields) {
            if !self.has_field(visible) {
                violations.push(format!(
                    "Visible field '{visible}' is not declared in customFields of '{}'",
                    self.name
                ));
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for field in &self.custom_fields {
            if !seen.insert(field.name.to_string()) {
                violations.push(format!("Duplicate custom field '{}'", field.name));
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_fields_must_be_declared() {
        let mut data = CardTypeData::default_for(&ResourceName::new(
            "demo",
            ResourceType::CardTypes,
            "page",
        ));
        data.always_visible_fields.push("demo/fieldTypes/ghost".into());
        assert!(data.intra_checks().iter().any(|v| v.contains("ghost")));

        data.custom_fields.push(CustomFieldRef {
            name: ResourceName::parse("demo/fieldTypes/ghost").unwrap(),
            display_name: None,
            is_calculated: None,
        });
        assert!(data.intra_checks().is_empty());
    }
}
