use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CardKey, Rank, ResourceName};

/// Metadata persisted as a card's `index.json`.
///
/// Custom field values are keyed by the full field-type name
/// (`prefix/fieldTypes/id`); unknown keys are retained verbatim so that a
/// read-modify-write cycle never loses data written by newer versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMetadata {
    pub card_type: ResourceName,
    pub workflow_state: String,
    pub rank: Rank,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<CardLink>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl CardMetadata {
    pub fn new(card_type: ResourceName, workflow_state: impl Into<String>, rank: Rank) -> Self {
        Self {
            card_type,
            workflow_state: workflow_state.into(),
            rank,
            labels: Vec::new(),
            links: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Value of a custom field, if set.
    pub fn field(&self, field_type_name: &str) -> Option<&Value> {
        self.fields.get(field_type_name)
    }

    /// Set a custom field; `Value::Null` clears it.
    pub fn set_field(&mut self, field_type_name: &str, value: Value) {
        if value.is_null() {
            self.fields.remove(field_type_name);
        } else {
            self.fields.insert(field_type_name.to_string(), value);
        }
    }
}

/// A typed link from one card to another, stored on the source card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardLink {
    pub link_type: ResourceName,
    pub card_key: CardKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_description: Option<String>,
}

/// An indexed card as held by the card cache.
#[derive(Debug, Clone)]
pub struct CardRecord {
    pub key: CardKey,
    /// Directory of the card (`.../<cardKey>/`).
    pub path: PathBuf,
    pub metadata: CardMetadata,
    /// `None` for cards directly under the card root (or a template root).
    pub parent: Option<CardKey>,
    pub children: Vec<CardKey>,
    /// File names under the card's `a/` folder.
    pub attachments: Vec<String>,
}

/// A card as returned to callers, body included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub key: CardKey,
    pub metadata: CardMetadata,
    pub content: String,
    pub parent: Option<CardKey>,
    pub children: Vec<CardKey>,
    pub attachments: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceType;

    fn metadata() -> CardMetadata {
        CardMetadata::new(
            ResourceName::new("demo", ResourceType::CardTypes, "page"),
            "Draft",
            Rank::first(),
        )
    }

    #[test]
    fn round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "cardType": "demo/cardTypes/page",
            "workflowState": "Draft",
            "rank": "i",
            "demo/fieldTypes/estimate": 42,
            "futureField": {"nested": true},
        });
        let parsed: CardMetadata = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(parsed.field("demo/fieldTypes/estimate"), Some(&serde_json::json!(42)));

        let written = serde_json::to_value(&parsed).unwrap();
        assert_eq!(written, raw);
    }

    #[test]
    fn null_clears_a_field() {
        let mut meta = metadata();
        meta.set_field("demo/fieldTypes/estimate", serde_json::json!(3));
        meta.set_field("demo/fieldTypes/estimate", Value::Null);
        assert_eq!(meta.field("demo/fieldTypes/estimate"), None);
    }
}
