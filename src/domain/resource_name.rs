use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CardoError;

/// The nine resource kinds a project can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    CardTypes,
    FieldTypes,
    LinkTypes,
    Workflows,
    Templates,
    Reports,
    GraphModels,
    GraphViews,
    Calculations,
}

impl ResourceType {
    pub const ALL: [ResourceType; 9] = [
        ResourceType::CardTypes,
        ResourceType::FieldTypes,
        ResourceType::LinkTypes,
        ResourceType::Workflows,
        ResourceType::Templates,
        ResourceType::Reports,
        ResourceType::GraphModels,
        ResourceType::GraphViews,
        ResourceType::Calculations,
    ];

    /// Folder name under `.cards/local/` and inside resource names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::CardTypes => "cardTypes",
            ResourceType::FieldTypes => "fieldTypes",
            ResourceType::LinkTypes => "linkTypes",
            ResourceType::Workflows => "workflows",
            ResourceType::Templates => "templates",
            ResourceType::Reports => "reports",
            ResourceType::GraphModels => "graphModels",
            ResourceType::GraphViews => "graphViews",
            ResourceType::Calculations => "calculations",
        }
    }

    pub fn parse(s: &str) -> Option<ResourceType> {
        ResourceType::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Folder resources keep a content directory next to their JSON document.
    ///
    /// Calculations stay flat (`calculations/<id>.json` + `<id>.lp`) so that
    /// logic programs remain plain `*.lp` files under the calculations folder.
    pub fn is_folder_resource(&self) -> bool {
        matches!(
            self,
            ResourceType::Templates
                | ResourceType::Reports
                | ResourceType::GraphModels
                | ResourceType::GraphViews
        )
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `prefix/type/identifier` resource reference.
///
/// Guarantees:
/// - Exactly three `/`-separated segments
/// - Prefix and identifier are non-empty
/// - The middle segment names a known resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName {
    prefix: String,
    resource_type: ResourceType,
    identifier: String,
}

impl ResourceName {
    pub fn new(
        prefix: impl Into<String>,
        resource_type: ResourceType,
        identifier: impl Into<String>,
    ) -> Self {
        Self { prefix: prefix.into(), resource_type, identifier: identifier.into() }
    }

    /// Parse a `prefix/type/identifier` reference.
    pub fn parse(name: &str) -> Result<Self, CardoError> {
        let mut parts = name.split('/');
        let (prefix, type_str, identifier) = match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (Some(p), Some(t), Some(i), None) if !p.is_empty() && !i.is_empty() => (p, t, i),
            _ => return Err(CardoError::InvalidResourceName(name.to_string())),
        };
        let resource_type = ResourceType::parse(type_str)
            .ok_or_else(|| CardoError::InvalidResourceName(name.to_string()))?;
        Ok(Self::new(prefix, resource_type, identifier))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Same identifier and type under a different prefix.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self::new(prefix, self.resource_type, self.identifier.clone())
    }

    /// Same prefix and type with a different identifier.
    pub fn with_identifier(&self, identifier: &str) -> Self {
        Self::new(self.prefix.clone(), self.resource_type, identifier)
    }
}

impl Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.prefix, self.resource_type, self.identifier)
    }
}

impl FromStr for ResourceName {
    type Err = CardoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceName::parse(s)
    }
}

impl Serialize for ResourceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceName::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_segment_reference() {
        let name = ResourceName::parse("demo/cardTypes/page").unwrap();
        assert_eq!(name.prefix(), "demo");
        assert_eq!(name.resource_type(), ResourceType::CardTypes);
        assert_eq!(name.identifier(), "page");
        assert_eq!(name.to_string(), "demo/cardTypes/page");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(ResourceName::parse("demo/cardTypes").is_err());
        assert!(ResourceName::parse("demo/cardTypes/page/extra").is_err());
        assert!(ResourceName::parse("").is_err());
    }

    #[test]
    fn rejects_unknown_type_segment() {
        assert!(ResourceName::parse("demo/gadgets/page").is_err());
    }

    #[test]
    fn rejects_empty_prefix_or_identifier() {
        assert!(ResourceName::parse("/cardTypes/page").is_err());
        assert!(ResourceName::parse("demo/cardTypes/").is_err());
    }

    #[test]
    fn prefix_swap_keeps_identifier() {
        let name = ResourceName::parse("demo/workflows/simple").unwrap();
        assert_eq!(name.with_prefix("cli").to_string(), "cli/workflows/simple");
    }
}
