mod common;

use cardo::ResourceType;
use common::TestContext;
use serde_json::json;

#[test]
fn tree_query_returns_the_card_hierarchy() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();

    let result = ctx.project().run_query("tree", None).unwrap();
    assert_eq!(result.rows.len(), 1, "one root card");
    let root = &result.rows[0];
    assert_eq!(root.key, keys[0].to_string());
    assert_eq!(root.fields["workflowState"], "Draft");
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].key, keys[1].to_string());
}

#[test]
fn tree_query_supports_a_subtree_root_parameter() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();

    let result = ctx
        .project()
        .run_query("tree", Some(&json!({"root": keys[1].to_string()})))
        .unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].key, keys[1].to_string());
}

#[test]
fn card_query_reports_available_transitions() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();

    let result = ctx
        .project()
        .run_query_in_context("card", "localApp", &[keys[0].to_string()], None)
        .unwrap();
    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row.fields["cardType"], "demo/cardTypes/page");

    let transitions = &row.fields["availableTransition"];
    let names: Vec<&str> = match transitions {
        serde_json::Value::Array(items) => items.iter().filter_map(|v| v.as_str()).collect(),
        serde_json::Value::String(s) => vec![s.as_str()],
        other => panic!("unexpected transitions value: {other}"),
    };
    assert!(names.contains(&"Approve"));
    assert!(names.contains(&"Archive"), "wildcard transition is available");
}

#[test]
fn labels_query_aggregates_cards_and_templates() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    ctx.project().create_label(&keys[0].to_string(), "alpha").unwrap();

    let result = ctx.project().run_query("labels", None).unwrap();
    let labels: Vec<&str> = result.rows.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(labels, vec!["alpha"]);
}

#[test]
fn query_results_are_deterministic() {
    let ctx = TestContext::new();
    ctx.create_page_cards();
    ctx.create_page_cards();

    let first = ctx.project().run_query("tree", None).unwrap();
    let second = ctx.project().run_query("tree", None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn queries_observe_command_effects() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    ctx.project().transition_card(&keys[0].to_string(), "Approve").unwrap();

    let result = ctx.project().run_query("tree", None).unwrap();
    assert_eq!(result.rows[0].fields["workflowState"], "Approved");
}

#[test]
fn calculations_feed_the_oncreation_query() {
    let ctx = TestContext::new();
    let project = ctx.project();

    project.create_resource(ResourceType::Calculations, "defaults").unwrap();
    project
        .update_resource_file(
            "demo/calculations/defaults",
            "defaults.lp",
            "onCreationField(K, \"demo/fieldTypes/estimate\", 1) :- newCard(K).\n",
        )
        .unwrap();

    let keys = ctx.create_page_cards();
    let card = project.card(&keys[0]).unwrap();
    assert_eq!(
        card.metadata.field("demo/fieldTypes/estimate"),
        Some(&json!(1)),
        "onCreation seeded the field"
    );
}

#[test]
fn denied_operations_default_to_empty() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    let result = ctx
        .project()
        .run_query_in_context("deniedOperations", "localApp", &[keys[0].to_string()], None)
        .unwrap();
    assert_eq!(result.rows.len(), 1);
    assert!(result.rows[0].fields.get("deniedOperation").is_none());
}

#[test]
fn ad_hoc_logic_programs_run_against_the_fact_base() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();

    let answers = ctx
        .project()
        .run_logic_program("draftCard(K) :- card(K), cardWorkflowState(K, \"Draft\").\n#show draftCard/1.")
        .unwrap();
    assert_eq!(answers.len(), 2);
    assert!(answers[0].contains(&keys[0].to_string()));
}

#[test]
fn export_logic_program_writes_the_program_set() {
    let ctx = TestContext::new();
    ctx.create_page_cards();
    let dest = ctx.scratch_dir().join("export.lp");
    ctx.project().export_logic_program(&dest, &[], None).unwrap();

    let text = std::fs::read_to_string(&dest).unwrap();
    assert!(text.contains("ancestor"), "base program exported");
    assert!(text.contains("card("), "card facts exported");
}

#[test]
fn graph_views_render_dot_source() {
    let ctx = TestContext::new();
    ctx.create_page_cards();
    let project = ctx.project();

    project.create_resource(ResourceType::GraphModels, "hierarchy").unwrap();
    project
        .update_resource_file(
            "demo/graphModels/hierarchy",
            "model.lp",
            "edge(P, C) :- card(C), parent(C, P), card(P).\n#show edge/2.\n",
        )
        .unwrap();
    project.create_resource(ResourceType::GraphViews, "overview").unwrap();
    project
        .update_resource_file(
            "demo/graphViews/overview",
            "view.dot.j2",
            "digraph cards {\n{% for atom in atoms %}  // {{ atom }}\n{% endfor %}}\n",
        )
        .unwrap();

    let dot = project
        .run_graph("demo/graphModels/hierarchy", "demo/graphViews/overview", "localApp")
        .unwrap();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("edge("), "{dot}");
}

#[test]
fn unknown_query_name_is_rejected() {
    let ctx = TestContext::new();
    let err = ctx.project().run_query("noSuchQuery", None).unwrap_err();
    assert!(err.to_string().contains("noSuchQuery"));
}
