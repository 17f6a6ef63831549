use serde::{Deserialize, Serialize};

use super::ResourceData;
use crate::domain::{ResourceName, ResourceType};

/// Transition origin matching any state.
pub const ANY_STATE: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTransition {
    pub name: String,
    /// Origin states; `"*"` matches any state.
    pub from_state: Vec<String>,
    pub to_state: String,
}

/// A workflow: named states plus named transitions between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowData {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub states: Vec<WorkflowState>,
    pub transitions: Vec<WorkflowTransition>,
}

impl WorkflowData {
    /// The state a fresh card starts in: the state whose category is
    /// `initial`, falling back to the first state.
    pub fn initial_state(&self) -> Option<&str> {
        self.states
            .iter()
            .find(|s| s.category.as_deref() == Some("initial"))
            .or_else(|| self.states.first())
            .map(|s| s.name.as_str())
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s.name == state)
    }

    /// Resolve a named transition from `from`, honouring the `"*"` wildcard.
    pub fn transition_from(&self, from: &str, name: &str) -> Option<&WorkflowTransition> {
        self.transitions.iter().find(|t| {
            t.name == name && t.from_state.iter().any(|s| s == from || s == ANY_STATE)
        })
    }
}

impl ResourceData for WorkflowData {
    const RESOURCE_TYPE: ResourceType = ResourceType::Workflows;
    const SCHEMA_ID: &'static str = "workflowSchema";

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
            states: vec![
                WorkflowState { name: "Draft".into(), category: Some("initial".into()) },
                WorkflowState { name: "Approved".into(), category: Some("closed".into()) },
                WorkflowState { name: "Deprecated".into(), category: Some("closed".into()) },
            ],
            transitions: vec![
                WorkflowTransition {
                    name: "Create".into(),
                    from_state: vec![String::new()],
                    to_state: "Draft".into(),
                },
                WorkflowTransition {
                    name: "Approve".into(),
                    from_state: vec!["Draft".into()],
                    to_state: "Approved".into(),
                },
                WorkflowTransition {
                    name: "Archive".into(),
                    from_state: vec![ANY_STATE.into()],
                    to_state: "Deprecated".into(),
                },
            ],
        }
    }

    fn intra_checks(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for state in &self.states {
            if !seen.insert(state.name.as_str()) {
                violations.push(format!("Duplicate state '{}'", state.name));
            }
        }
        for transition in &self.transitions {
            if !self.has_state(&transition.to_state) {
                violations.push(format!(
                    "Transition '{}' targets unknown state '{}'",
                    transition.name, transition.to_state
                ));
            }
            for from in &transition.from_state {
                // Empty origin marks a creation transition.
                if !from.is_empty() && from != ANY_STATE && !self.has_state(from) {
                    violations.push(format!(
                        "Transition '{}' leaves unknown state '{from}'",
                        transition.name
                    ));
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow() -> WorkflowData {
        WorkflowData::default_for(&ResourceName::new("demo", ResourceType::Workflows, "simple"))
    }

    #[test]
    fn initial_state_prefers_the_initial_category() {
        assert_eq!(workflow().initial_state(), Some("Draft"));
    }

    #[test]
    fn wildcard_transitions_match_any_state() {
        let wf = workflow();
        assert!(wf.transition_from("Draft", "Archive").is_some());
        assert!(wf.transition_from("Approved", "Archive").is_some());
        assert!(wf.transition_from("Approved", "Approve").is_none());
    }

    #[test]
    fn unknown_target_state_is_a_violation() {
        let mut wf = workflow();
        wf.transitions.push(WorkflowTransition {
            name: "Launch".into(),
            from_state: vec!["Draft".into()],
            to_state: "Orbit".into(),
        });
        assert!(wf.intra_checks().iter().any(|v| v.contains("Orbit")));
    }
}
