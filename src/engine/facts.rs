//! Fact generation: pure functions mirroring repository entities into ground
//! terms for the solver. Facts are deterministic: same entity, same text.

use std::fmt::Write;

use serde_json::Value;

use super::solver::quote;
use crate::cache::ResourceEntry;
use crate::config::ProjectConfig;
use crate::domain::CardRecord;

/// Parent key used for cards directly under the card root.
pub const ROOT_PARENT: &str = "root";

/// Render a JSON value as a solver constant.
fn json_const(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        // Floats and everything structured travel as strings.
        Value::Number(n) => quote(&n.to_string()),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

/// Facts about the project itself and its imported modules.
pub fn project_facts(config: &ProjectConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "project({},{}).", quote(&config.card_key_prefix), quote(&config.name));
    for module in &config.modules {
        let _ = writeln!(out, "module({}).", quote(&module.name));
    }
    out
}

/// Facts for one card: identity, tree position, metadata, attachments.
///
/// Project cards assert `card/1`; template cards assert `templateCard/2`
/// instead so that card-tree queries never see them.
pub fn card_facts(record: &CardRecord, template: Option<&str>) -> String {
    let key = quote(record.key.as_str());
    let mut out = String::new();
    match template {
        None => {
            let _ = writeln!(out, "card({key}).");
        }
        Some(template) => {
            let _ = writeln!(out, "templateCard({key},{}).", quote(template));
        }
    }

    let parent = record
        .parent
        .as_ref()
        .map(|p| quote(p.as_str()))
        .unwrap_or_else(|| quote(ROOT_PARENT));
    let _ = writeln!(out, "parent({key},{parent}).");
    let _ = writeln!(out, "cardCardType({key},{}).", quote(&record.metadata.card_type.to_string()));
    let _ = writeln!(out, "cardWorkflowState({key},{}).", quote(&record.metadata.workflow_state));
    let _ = writeln!(out, "cardRank({key},{}).", quote(record.metadata.rank.as_str()));

    let label_predicate = if template.is_some() { "templateCardLabel" } else { "cardLabel" };
    for label in &record.metadata.labels {
        let _ = writeln!(out, "{label_predicate}({key},{}).", quote(label));
    }
    for link in &record.metadata.links {
        let _ = writeln!(
            out,
            "cardLink({key},{},{}).",
            quote(link.card_key.as_str()),
            quote(&link.link_type.to_string())
        );
    }
    for (field, value) in &record.metadata.fields {
        let _ = writeln!(out, "cardField({key},{},{}).", quote(field), json_const(value));
    }
    for attachment in &record.attachments {
        let _ = writeln!(out, "cardAttachment({key},{}).", quote(attachment));
    }
    out
}

/// Facts for one resource, keyed by its kind.
pub fn resource_facts(entry: &ResourceEntry) -> String {
    let mut out = String::new();
    match entry {
        ResourceEntry::CardType(r) => {
            let data = r.show();
            let name = quote(&data.name.to_string());
            let _ = writeln!(out, "cardType({name}).");
            let _ = writeln!(out, "cardTypeWorkflow({name},{}).", quote(&data.workflow.to_string()));
            for field in &data.custom_fields {
                let _ = writeln!(
                    out,
                    "cardTypeCustomField({name},{}).",
                    quote(&field.name.to_string())
                );
            }
            for field in &data.always_visible_fields {
                let _ = writeln!(out, "cardTypeVisibleField({name},{},{}).", quote(field), quote("always"));
            }
            for field in &data.optionally_visible_fields {
                let _ = writeln!(
                    out,
                    "cardTypeVisibleField({name},{},{}).",
                    quote(field),
                    quote("optional")
                );
            }
        }
        ResourceEntry::FieldType(r) => {
            let data = r.show();
            let name = quote(&data.name.to_string());
            let _ = writeln!(out, "fieldType({name}).");
            let data_type = serde_json::to_value(data.data_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let _ = writeln!(out, "fieldTypeDataType({name},{}).", quote(&data_type));
            for value in &data.enum_values {
                let _ = writeln!(out, "fieldTypeEnumValue({name},{}).", quote(&value.enum_value));
            }
        }
        ResourceEntry::LinkType(r) => {
            let data = r.show();
            let name = quote(&data.name.to_string());
            let _ = writeln!(out, "linkType({name}).");
            for ct in &data.source_card_types {
                let _ = writeln!(out, "linkTypeSource({name},{}).", quote(&ct.to_string()));
            }
            for ct in &data.destination_card_types {
                let _ = writeln!(out, "linkTypeDestination({name},{}).", quote(&ct.to_string()));
            }
        }
        ResourceEntry::Workflow(r) => {
            let data = r.show();
            let name = quote(&data.name.to_string());
            let _ = writeln!(out, "workflow({name}).");
            if let Some(initial) = data.initial_state() {
                let _ = writeln!(out, "workflowInitialState({name},{}).", quote(initial));
            }
            for state in &data.states {
                let _ = writeln!(out, "workflowState({name},{}).", quote(&state.name));
                if let Some(category) = &state.category {
                    let _ = writeln!(
                        out,
                        "workflowStateCategory({name},{},{}).",
                        quote(&state.name),
                        quote(category)
                    );
                }
            }
            for transition in &data.transitions {
                for from in &transition.from_state {
                    let _ = writeln!(
                        out,
                        "workflowTransition({name},{},{},{}).",
                        quote(&transition.name),
                        quote(from),
                        quote(&transition.to_state)
                    );
                }
            }
        }
        ResourceEntry::Template(r) => {
            let _ = writeln!(out, "template({}).", quote(&r.name().to_string()));
        }
        ResourceEntry::Report(r) => {
            let _ = writeln!(out, "report({}).", quote(&r.name().to_string()));
        }
        ResourceEntry::GraphModel(r) => {
            let _ = writeln!(out, "graphModel({}).", quote(&r.name().to_string()));
        }
        ResourceEntry::GraphView(r) => {
            let _ = writeln!(out, "graphView({}).", quote(&r.name().to_string()));
        }
        ResourceEntry::Calculation(r) => {
            let _ = writeln!(out, "calculation({}).", quote(&r.name().to_string()));
        }
    }
    out
}

/// Context facts injected per query.
pub fn context_facts(mode: &str, card_keys: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "queryContext({}).", quote(mode));
    for key in card_keys {
        let _ = writeln!(out, "queryCard({}).", quote(key));
        let _ = writeln!(out, "newCard({}).", quote(key));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CardKey, CardMetadata, Rank, ResourceName};
    use std::path::PathBuf;

    fn record() -> CardRecord {
        let mut metadata = CardMetadata::new(
            ResourceName::parse("demo/cardTypes/page").unwrap(),
            "Draft",
            Rank::first(),
        );
        metadata.labels.push("alpha".into());
        metadata.set_field("demo/fieldTypes/estimate", serde_json::json!(8));
        CardRecord {
            key: CardKey::new("demo_1").unwrap(),
            path: PathBuf::from("/proj/cardRoot/demo_1"),
            metadata,
            parent: None,
            children: vec![],
            attachments: vec!["diagram.png".into()],
        }
    }

    #[test]
    fn project_card_asserts_card_fact() {
        let facts = card_facts(&record(), None);
        assert!(facts.contains(r#"card("demo_1")."#));
        assert!(facts.contains(r#"parent("demo_1","root")."#));
        assert!(facts.contains(r#"cardWorkflowState("demo_1","Draft")."#));
        assert!(facts.contains(r#"cardField("demo_1","demo/fieldTypes/estimate",8)."#));
        assert!(facts.contains(r#"cardAttachment("demo_1","diagram.png")."#));
    }

    #[test]
    fn template_card_asserts_template_fact_instead() {
        let facts = card_facts(&record(), Some("demo/templates/page"));
        assert!(facts.contains(r#"templateCard("demo_1","demo/templates/page")."#));
        assert!(!facts.contains(r#"card("demo_1")."#));
        assert!(facts.contains(r#"templateCardLabel("demo_1","alpha")."#));
    }

    #[test]
    fn fact_generation_is_deterministic() {
        assert_eq!(card_facts(&record(), None), card_facts(&record(), None));
    }
}
