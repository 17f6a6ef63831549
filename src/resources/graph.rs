use serde::{Deserialize, Serialize};

use super::ResourceData;
use crate::domain::{ResourceName, ResourceType};

/// File inside a graph model's content folder holding its logic program.
pub const MODEL_PROGRAM_FILE: &str = "model.lp";

/// File inside a graph view's content folder holding the DOT template.
pub const VIEW_TEMPLATE_FILE: &str = "view.dot.j2";

/// A graph model: a logic program deriving nodes and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphModelData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ResourceData for GraphModelData {
    const RESOURCE_TYPE: ResourceType = ResourceType::GraphModels;
    const SCHEMA_ID: &'static str = "graphModelSchema";

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

/// A graph view: a DOT template rendered over a model's answer set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphViewData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// JSON Schema constraining the view parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

impl ResourceData for GraphViewData {
    const RESOURCE_TYPE: ResourceType = ResourceType::GraphViews;
    const SCHEMA_ID: &'static str = "graphViewSchema";

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
}
