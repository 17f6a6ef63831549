use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ResourceData;
use crate::domain::{ResourceName, ResourceType};

/// Value types a custom field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    ShortText,
    LongText,
    Number,
    Integer,
    Boolean,
    Date,
    DateTime,
    Enum,
    List,
    Person,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValue {
    pub enum_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_display_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTypeData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<EnumValue>,
}

impl FieldTypeData {
    /// Check a metadata value against this field's data type.
    ///
    /// `Null` is always accepted: it clears the field.
    pub fn check_value(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return Ok(());
        }
        let ok = match self.data_type {
            DataType::ShortText | DataType::LongText | DataType::Person => value.is_string(),
            DataType::Number => value.is_number(),
            DataType::Integer => value.is_i64() || value.is_u64(),
            DataType::Boolean => value.is_boolean(),
            DataType::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            DataType::DateTime => {
                value.as_str().is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok())
            }
            DataType::Enum => value
                .as_str()
                .is_some_and(|s| self.enum_values.iter().any(|e| e.enum_value == s)),
            DataType::List => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "Value {value} does not conform to data type {:?} of field '{}'",
                self.data_type, self.name
            ))
        }
    }
}

impl ResourceData for FieldTypeData {
    const RESOURCE_TYPE: ResourceType = ResourceType::FieldTypes;
    const SCHEMA_ID: &'static str = "fieldTypeSchema";

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
            data_type: DataType::ShortText,
            enum_values: Vec::new(),
        }
    }

    fn intra_checks(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.data_type == DataType::Enum && self.enum_values.is_empty() {
            violations.push(format!("Enum field '{}' declares no enum values", self.name));
        }
        violations
    }
}
