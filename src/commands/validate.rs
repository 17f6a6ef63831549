//! Full-project validation.

use crate::cache::ResourceScope;
use crate::domain::{CardRecord, ResourceName, ResourceType};
use crate::error::CardoError;
use crate::project::{Project, ProjectState};
use crate::schema;

impl Project {
    /// Validate every resource and card; returns one line per violation.
    pub fn validate_project(&self) -> Result<Vec<String>, CardoError> {
        self.refresh()?;
        self.lock.with_reader(|state| {
            let mut violations = Vec::new();

            for entry in state.resources.entries(ResourceScope::All) {
                for violation in entry.validate(None)? {
                    violations.push(format!("{}: {violation}", entry.name()));
                }
            }
            cross_resource_checks(state, &mut violations)?;

            for record in state.cards.cards(None)? {
                card_checks(state, record, &mut violations)?;
            }
            for template in state.resources.resource_names(ResourceType::Templates, ResourceScope::All)
            {
                for record in state.cards.template_cards(&template.to_string())? {
                    card_checks(state, record, &mut violations)?;
                }
            }

            Ok(violations)
        })
    }
}

fn cross_resource_checks(
    state: &ProjectState,
    violations: &mut Vec<String>,
) -> Result<(), CardoError> {
    for name in state.resources.resource_names(ResourceType::CardTypes, ResourceScope::All) {
        let card_type = state.resources.card_type(&name)?;
        let data = card_type.show();
        if !state.resources.exists(&data.workflow) {
            violations.push(format!(
                "{name}: workflow '{}' does not exist",
                data.workflow
            ));
        }
        for field in &data.custom_fields {
            if !state.resources.exists(&field.name) {
                violations.push(format!("{name}: field type '{}' does not exist", field.name));
            }
        }
    }
    for name in state.resources.resource_names(ResourceType::LinkTypes, ResourceScope::All) {
        let link_type = state.resources.link_type(&name)?;
        let data = link_type.show();
        for ct in data.source_card_types.iter().chain(&data.destination_card_types) {
            if !state.resources.exists(ct) {
                violations.push(format!("{name}: card type '{ct}' does not exist"));
            }
        }
    }
    Ok(())
}

fn card_checks(
    state: &ProjectState,
    record: &CardRecord,
    violations: &mut Vec<String>,
) -> Result<(), CardoError> {
    let key = &record.key;

    let raw = serde_json::to_value(&record.metadata)
        .map_err(|e| CardoError::InvalidInput(format!("Cannot serialize metadata: {e}")))?;
    for violation in schema::validate(&raw, "cardBaseSchema")? {
        violations.push(format!("{key}: {violation}"));
    }

    let Ok(card_type) = state.resources.card_type(&record.metadata.card_type) else {
        violations.push(format!(
            "{key}: card type '{}' does not exist",
            record.metadata.card_type
        ));
        return Ok(());
    };
    match state.resources.workflow(&card_type.show().workflow) {
        Ok(workflow) => {
            if !workflow.show().has_state(&record.metadata.workflow_state) {
                violations.push(format!(
                    "{key}: state '{}' is not part of workflow '{}'",
                    record.metadata.workflow_state,
                    workflow.show().name
                ));
            }
        }
        Err(_) => violations.push(format!(
            "{key}: workflow '{}' does not exist",
            card_type.show().workflow
        )),
    }

    for (field, value) in &record.metadata.fields {
        let Ok(field_name) = ResourceName::parse(field) else {
            violations.push(format!("{key}: field '{field}' is not a field type reference"));
            continue;
        };
        match state.resources.field_type(&field_name) {
            Ok(field_type) => {
                if let Err(violation) = field_type.show().check_value(value) {
                    violations.push(format!("{key}: {violation}"));
                }
            }
            Err(_) => {
                violations.push(format!("{key}: field type '{field}' does not exist"));
            }
        }
    }

    for attachment in &record.attachments {
        let path = record.path.join(crate::paths::ATTACHMENTS_DIR).join(attachment);
        if !path.is_file() {
            violations.push(format!("{key}: attachment '{attachment}' is missing on disk"));
        }
    }
    Ok(())
}
