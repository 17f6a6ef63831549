//! The calculation engine: mirrors the repository into a logic program store
//! and answers named queries through the embedded solver.
//!
//! All solver access goes through one mutex so that a solve always observes a
//! fact set consistent with the last completed mutation.

pub mod facts;
pub mod parser;
pub mod solver;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use include_dir::{Dir, include_dir};
use minijinja::{Environment, UndefinedBehavior, context};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CardCache, ResourceCache, ResourceEntry, ResourceScope};
use crate::config::ProjectConfig;
use crate::domain::{CardKey, CardRecord, ResourceName, ResourceType};
use crate::error::CardoError;
use crate::resources::VIEW_TEMPLATE_FILE;
use crate::schema;

pub use parser::{QueryResult, ResultRow};
pub use solver::{DatalogSolver, LogicSolver};

static PROGRAMS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/src/engine/programs");

/// Query context tag for the interactive application.
pub const CONTEXT_LOCAL_APP: &str = "localApp";

/// Query context tag for document export.
pub const CONTEXT_EXPORTED_DOCUMENT: &str = "exportedDocument";

/// Borrowed view of everything fact generation needs.
pub struct EngineInputs<'a> {
    pub config: &'a ProjectConfig,
    pub resources: &'a ResourceCache,
    pub cards: &'a CardCache,
}

/// One field assignment returned by the `onCreation` query.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub key: CardKey,
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Uninitialised,
    Initialised,
    Closed,
}

struct EngineInner {
    solver: DatalogSolver,
    state: EngineState,
    /// Names of per-card programs, for wholesale replacement on moves.
    card_programs: BTreeSet<String>,
}

/// Named, category-scoped program store plus query execution.
pub struct CalculationEngine {
    inner: Mutex<EngineInner>,
}

impl Default for CalculationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculationEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                solver: DatalogSolver::new(),
                state: EngineState::Uninitialised,
                card_programs: BTreeSet::new(),
            }),
        }
    }

    /// Rebuild the whole program store from the repository.
    pub fn generate(&self, inputs: &EngineInputs<'_>) -> Result<(), CardoError> {
        let mut inner = self.inner.lock();
        if inner.state == EngineState::Closed {
            return Err(CardoError::SolverFailure("calculation engine is closed".into()));
        }
        inner.solver.remove_all_programs();
        inner.card_programs.clear();

        for name in ["base.lp", "queryLanguage.lp", "utils.lp"] {
            let file = PROGRAMS
                .get_file(name)
                .and_then(|f| f.contents_utf8())
                .expect("bundled programs are present and utf-8");
            inner.solver.set_program(name, file, &[]);
        }

        inner.solver.set_program("project", &facts::project_facts(inputs.config), &[]);

        for entry in inputs.resources.entries(ResourceScope::All) {
            let program_name = format!("resource:{}", entry.name());
            inner.solver.set_program(&program_name, &facts::resource_facts(entry), &[]);

            match entry {
                ResourceEntry::Calculation(calculation) => {
                    match calculation.show_program()? {
                        Some(text) => {
                            let name = format!("calculation:{}", calculation.name());
                            inner.solver.set_program(&name, &text, &[]);
                        }
                        // The only permitted downgrade: a calculation without
                        // its program logs and is skipped.
                        None => warn!(
                            calculation = %calculation.name(),
                            "calculation has no logic program file, skipping"
                        ),
                    }
                }
                ResourceEntry::GraphModel(model) => {
                    let dir = model.content_dir().join(crate::resources::MODEL_PROGRAM_FILE);
                    if dir.exists() {
                        let text = std::fs::read_to_string(&dir)
                            .map_err(|e| CardoError::read(&dir, e))?;
                        let category = format!("graph:{}", model.name());
                        inner.solver.set_program(
                            &format!("graphModel:{}", model.name()),
                            &text,
                            &[category],
                        );
                    }
                }
                _ => {}
            }
        }

        for record in inputs.cards.cards(None)? {
            let name = format!("card:{}", record.key);
            inner.solver.set_program(&name, &facts::card_facts(record, None), &[]);
            inner.card_programs.insert(name);
        }
        for template in inputs.resources.resource_names(ResourceType::Templates, ResourceScope::All)
        {
            let template_name = template.to_string();
            let Ok(records) = inputs.cards.template_cards(&template_name) else { continue };
            for record in records {
                let name = format!("card:{}", record.key);
                inner
                    .solver
                    .set_program(&name, &facts::card_facts(record, Some(&template_name)), &[]);
                inner.card_programs.insert(name);
            }
        }

        inner.state = EngineState::Initialised;
        debug!(programs = inner.card_programs.len(), "calculation engine generated");
        Ok(())
    }

    /// Replace one card's program after an in-place change.
    ///
    /// `template` names the owning template for template cards.
    pub fn handle_card_changed(&self, record: &CardRecord, template: Option<&str>) {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Initialised {
            return;
        }
        let name = format!("card:{}", record.key);
        inner.solver.set_program(&name, &facts::card_facts(record, template), &[]);
        inner.card_programs.insert(name);
    }

    /// Rebuild every card program; parent links permeate the tree.
    pub fn handle_card_moved(&self, inputs: &EngineInputs<'_>) -> Result<(), CardoError> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Initialised {
            return Ok(());
        }
        let stale: Vec<String> = inner.card_programs.iter().cloned().collect();
        for name in stale {
            inner.solver.remove_program(&name);
        }
        inner.card_programs.clear();
        for record in inputs.cards.cards(None)? {
            let name = format!("card:{}", record.key);
            inner.solver.set_program(&name, &facts::card_facts(record, None), &[]);
            inner.card_programs.insert(name);
        }
        for template in inputs.resources.resource_names(ResourceType::Templates, ResourceScope::All)
        {
            let template_name = template.to_string();
            let Ok(records) = inputs.cards.template_cards(&template_name) else { continue };
            for record in records {
                let name = format!("card:{}", record.key);
                inner
                    .solver
                    .set_program(&name, &facts::card_facts(record, Some(&template_name)), &[]);
                inner.card_programs.insert(name);
            }
        }
        Ok(())
    }

    /// Drop a deleted card's program.
    pub fn handle_delete_card(&self, key: &CardKey) {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Initialised {
            return;
        }
        let name = format!("card:{key}");
        inner.solver.remove_program(&name);
        inner.card_programs.remove(&name);
    }

    /// Mirror freshly created cards, then ask the `onCreation` query which
    /// fields to seed. The caller applies the returned updates.
    pub fn handle_new_cards(
        &self,
        records: &[&CardRecord],
    ) -> Result<Vec<FieldUpdate>, CardoError> {
        {
            let mut inner = self.inner.lock();
            if inner.state != EngineState::Initialised {
                return Ok(Vec::new());
            }
            for record in records {
                let name = format!("card:{}", record.key);
                inner.solver.set_program(&name, &facts::card_facts(record, None), &[]);
                inner.card_programs.insert(name);
            }
        }

        let keys: Vec<String> = records.iter().map(|r| r.key.to_string()).collect();
        let result = self.run_query("onCreation", CONTEXT_LOCAL_APP, &keys, None)?;

        let mut updates = Vec::new();
        for row in &result.rows {
            let Ok(key) = CardKey::new(&row.key) else { continue };
            for (field, value) in &row.fields {
                updates.push(FieldUpdate {
                    key: key.clone(),
                    field: field.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(updates)
    }

    /// Replace one resource's fact program after a resource change.
    pub fn handle_resource_changed(&self, entry: &ResourceEntry) -> Result<(), CardoError> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Initialised {
            return Ok(());
        }
        let name = format!("resource:{}", entry.name());
        inner.solver.set_program(&name, &facts::resource_facts(entry), &[]);
        if let ResourceEntry::Calculation(calculation) = entry
            && let Some(text) = calculation.show_program()?
        {
            inner
                .solver
                .set_program(&format!("calculation:{}", calculation.name()), &text, &[]);
        }
        if let ResourceEntry::GraphModel(model) = entry {
            let program = model.content_dir().join(crate::resources::MODEL_PROGRAM_FILE);
            if program.exists() {
                let text = std::fs::read_to_string(&program)
                    .map_err(|e| CardoError::read(&program, e))?;
                let category = format!("graph:{}", model.name());
                inner.solver.set_program(
                    &format!("graphModel:{}", model.name()),
                    &text,
                    &[category],
                );
            }
        }
        Ok(())
    }

    /// Drop the programs of a removed resource.
    pub fn handle_resource_removed(&self, name: &ResourceName) {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Initialised {
            return;
        }
        inner.solver.remove_program(&format!("resource:{name}"));
        inner.solver.remove_program(&format!("calculation:{name}"));
        inner.solver.remove_program(&format!("graphModel:{name}"));
    }

    /// Run a named query with a context tag and optional parameters.
    pub fn run_query(
        &self,
        name: &str,
        context_tag: &str,
        card_keys: &[String],
        params: Option<&Value>,
    ) -> Result<QueryResult, CardoError> {
        let rendered = render_query(name, params)?;
        let mut query = rendered;
        query.push('\n');
        query.push_str(&facts::context_facts(context_tag, card_keys));

        let answers = {
            let inner = self.inner.lock();
            if inner.state != EngineState::Initialised {
                return Err(CardoError::SolverFailure(
                    "calculation engine is not initialised".into(),
                ));
            }
            inner.solver.solve(&query, &[])?
        };
        let result = parser::parse_answers(&answers)?;
        if let Some(message) = result.error {
            return Err(CardoError::SolverFailure(message));
        }
        Ok(result)
    }

    /// Run an ad-hoc logic program; returns the raw shown atoms.
    pub fn run_logic_program(&self, text: &str) -> Result<Vec<String>, CardoError> {
        let inner = self.inner.lock();
        if inner.state != EngineState::Initialised {
            return Err(CardoError::SolverFailure(
                "calculation engine is not initialised".into(),
            ));
        }
        inner.solver.solve(text, &[])
    }

    /// Expand a graph view over a graph model's answer set into DOT source.
    ///
    /// Rasterising the DOT into SVG belongs to the rendering layer.
    pub fn run_graph(
        &self,
        inputs: &EngineInputs<'_>,
        model: &ResourceName,
        view: &ResourceName,
        context_tag: &str,
    ) -> Result<String, CardoError> {
        let view_resource = inputs.resources.graph_view(view)?;
        let template_text = view_resource.show_file(VIEW_TEMPLATE_FILE)?;

        let answers = {
            let inner = self.inner.lock();
            if inner.state != EngineState::Initialised {
                return Err(CardoError::SolverFailure(
                    "calculation engine is not initialised".into(),
                ));
            }
            let query = facts::context_facts(context_tag, &[]);
            inner.solver.solve(&query, &[format!("graph:{model}")])?
        };

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.render_str(
            &template_text,
            context! { atoms => answers, context => context_tag },
        )
        .map_err(|e| CardoError::SolverFailure(format!("graph view rendering failed: {e}")))
    }

    /// Write the concatenation of the selected programs (plus an optional
    /// query) for debugging and support bundles.
    pub fn export_logic_program(
        &self,
        dest: &Path,
        categories: &[String],
        query: Option<&str>,
    ) -> Result<(), CardoError> {
        let inner = self.inner.lock();
        let text = inner.solver.build_program(query.unwrap_or(""), categories);
        schema::write_atomic(dest, text.as_bytes())
    }

    /// Close the engine; idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.solver.remove_all_programs();
        inner.card_programs.clear();
        inner.state = EngineState::Closed;
    }

    pub fn is_initialised(&self) -> bool {
        self.inner.lock().state == EngineState::Initialised
    }
}

fn query_environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        if let Some(queries) = PROGRAMS.get_dir("queries") {
            for file in queries.files() {
                let Some(name) = file.path().file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(stem) = name.strip_suffix(".lp.j2") else { continue };
                let Some(source) = file.contents_utf8() else { continue };
                env.add_template(stem, source).expect("bundled query templates compile");
            }
        }
        env
    })
}

/// Names of the bundled queries.
pub fn query_names() -> Vec<String> {
    let mut names: Vec<String> = query_environment()
        .templates()
        .map(|(name, _)| name.to_string())
        .collect();
    names.sort();
    names
}

fn render_query(name: &str, params: Option<&Value>) -> Result<String, CardoError> {
    let env = query_environment();
    let template = env
        .get_template(name)
        .map_err(|_| CardoError::InvalidInput(format!("Unknown query '{name}'")))?;
    template
        .render(context! { params => params })
        .map_err(|e| CardoError::SolverFailure(format!("query '{name}' failed to render: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_queries_are_present() {
        let names = query_names();
        for required in ["tree", "card", "labels", "deniedOperations", "onCreation", "onTransition"]
        {
            assert!(names.iter().any(|n| n == required), "missing query {required}");
        }
    }

    #[test]
    fn tree_query_renders_without_params() {
        let text = render_query("tree", None).unwrap();
        assert!(text.contains("result(K) :- card(K)."));
    }

    #[test]
    fn tree_query_renders_subtree_filter() {
        let text = render_query("tree", Some(&serde_json::json!({"root": "demo_1"}))).unwrap();
        assert!(text.contains(r#"ancestor(K, "demo_1")"#));
    }
}
