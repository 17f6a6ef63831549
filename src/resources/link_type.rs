use serde::{Deserialize, Serialize};

use super::ResourceData;
use crate::domain::{ResourceName, ResourceType};

/// A link type: the relation cards of certain types may form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTypeData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub outbound_display_name: String,
    pub inbound_display_name: String,
    /// Allowed source card types; empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_card_types: Vec<ResourceName>,
    /// Allowed destination card types; empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_card_types: Vec<ResourceName>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enable_link_description: bool,
}

impl LinkTypeData {
    pub fn allows_source(&self, card_type: &ResourceName) -> bool {
        self.source_card_types.is_empty() || self.source_card_types.contains(card_type)
    }

    pub fn allows_destination(&self, card_type: &ResourceName) -> bool {
        self.destination_card_types.is_empty() || self.destination_card_types.contains(card_type)
    }
}

impl ResourceData for LinkTypeData {
    const RESOURCE_TYPE: ResourceType = ResourceType::LinkTypes;
    const SCHEMA_ID: &'static str = "linkTypeSchema";

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
            outbound_display_name: name.identifier().to_string(),
            inbound_display_name: format!("{} (inbound)", name.identifier()),
            source_card_types: Vec::new(),
            destination_card_types: Vec::new(),
            enable_link_description: false,
        }
    }
}
