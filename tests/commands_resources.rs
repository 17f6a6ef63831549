mod common;

use cardo::ResourceType;
use cardo::error::CardoError;
use cardo::resources::UpdateOp;
use common::TestContext;
use serde_json::json;

#[test]
fn resource_identifiers_are_validated() {
    let ctx = TestContext::new();
    let project = ctx.project();

    let err = project.create_resource(ResourceType::Workflows, "2fast").unwrap_err();
    assert!(matches!(err, CardoError::InvalidInput(_)));
    let err = project.create_resource(ResourceType::Workflows, "42").unwrap_err();
    assert!(matches!(err, CardoError::InvalidInput(_)));
    let err = project.create_resource(ResourceType::Workflows, "con").unwrap_err();
    assert!(matches!(err, CardoError::InvalidInput(_)));
    let err = project.create_resource(ResourceType::Workflows, "simple").unwrap_err();
    assert!(matches!(err, CardoError::ResourceExists(_)));
}

#[test]
fn update_operations_apply_and_validate() {
    let ctx = TestContext::new();
    let project = ctx.project();
    let workflow = "demo/workflows/simple";

    project
        .update_resource(
            workflow,
            "states",
            UpdateOp::Add(json!({"name": "Review", "category": "active"})),
        )
        .unwrap();
    project
        .update_resource(
            workflow,
            "transitions",
            UpdateOp::Add(json!({"name": "Review", "fromState": ["Draft"], "toState": "Review"})),
        )
        .unwrap();

    // A transition pointing at a state that does not exist is rejected and
    // nothing is persisted.
    let err = project
        .update_resource(
            workflow,
            "transitions",
            UpdateOp::Add(json!({"name": "Orbit", "fromState": ["Draft"], "toState": "Orbit"})),
        )
        .unwrap_err();
    assert!(matches!(err, CardoError::SchemaViolation(_)));

    let shown = ctx.manager().show_resource(workflow);
    assert_eq!(shown.status_code, 200);
    let payload = shown.payload.unwrap();
    let transitions = payload["transitions"].as_array().unwrap();
    assert!(transitions.iter().any(|t| t["name"] == "Review"));
    assert!(!transitions.iter().any(|t| t["name"] == "Orbit"));
}

#[test]
fn array_rank_and_remove_round_trip() {
    let ctx = TestContext::new();
    let project = ctx.project();
    let workflow = "demo/workflows/simple";

    project
        .update_resource(
            workflow,
            "states",
            UpdateOp::Rank {
                target: json!({"name": "Approved", "category": "closed"}),
                index: 0,
            },
        )
        .unwrap();
    let payload = ctx.manager().show_resource(workflow).payload.unwrap();
    assert_eq!(payload["states"][0]["name"], "Approved");

    let err = project
        .update_resource(
            workflow,
            "states",
            UpdateOp::Remove(json!({"name": "Ghost"})),
        )
        .unwrap_err();
    assert!(matches!(err, CardoError::ItemNotFound(_)));
}

#[test]
fn set_and_clear_scalar_fields() {
    let ctx = TestContext::new();
    let project = ctx.project();
    let name = "demo/cardTypes/page";

    project
        .update_resource(name, "displayName", UpdateOp::Set(json!("Page")))
        .unwrap();
    let payload = ctx.manager().show_resource(name).payload.unwrap();
    assert_eq!(payload["displayName"], "Page");

    project
        .update_resource(name, "displayName", UpdateOp::Set(json!(null)))
        .unwrap();
    let payload = ctx.manager().show_resource(name).payload.unwrap();
    assert!(payload.get("displayName").is_none());
}

#[test]
fn rename_resource_rewrites_references() {
    let ctx = TestContext::new();
    let project = ctx.project();
    let keys = ctx.create_page_cards();

    project.rename_resource("demo/cardTypes/page", "article").unwrap();

    // Cards now reference the renamed card type.
    let card = project.card(&keys[0]).unwrap();
    assert_eq!(card.metadata.card_type.to_string(), "demo/cardTypes/article");

    // The old name is gone, the new one resolves.
    assert_eq!(ctx.manager().show_resource("demo/cardTypes/page").status_code, 400);
    assert_eq!(ctx.manager().show_resource("demo/cardTypes/article").status_code, 200);
}

#[test]
fn remove_resource_refuses_while_in_use() {
    let ctx = TestContext::new();
    let project = ctx.project();
    ctx.create_page_cards();

    let err = project.remove_resource("demo/cardTypes/page").unwrap_err();
    assert!(matches!(err, CardoError::ResourceInUse { .. }));
    let err = project.remove_resource("demo/workflows/simple").unwrap_err();
    assert!(matches!(err, CardoError::ResourceInUse { .. }));

    // An unused resource goes away cleanly.
    project.create_resource(ResourceType::FieldTypes, "unused").unwrap();
    project.remove_resource("demo/fieldTypes/unused").unwrap();
    assert_eq!(ctx.manager().show_resource("demo/fieldTypes/unused").status_code, 400);
}

#[test]
fn template_deletion_drops_its_cards() {
    let ctx = TestContext::new();
    let project = ctx.project();

    project.create_resource(ResourceType::Templates, "scratch").unwrap();
    project
        .create_template_card("demo/templates/scratch", "demo/cardTypes/page", None)
        .unwrap();
    project.remove_resource("demo/templates/scratch").unwrap();
    assert_eq!(ctx.manager().show_resource("demo/templates/scratch").status_code, 400);
}

#[test]
fn calculations_carry_their_program_file() {
    let ctx = TestContext::new();
    let project = ctx.project();

    project.create_resource(ResourceType::Calculations, "velocity").unwrap();
    project
        .update_resource_file(
            "demo/calculations/velocity",
            "velocity.lp",
            "velocity(K) :- card(K).\n",
        )
        .unwrap();
    let lp = ctx
        .project_dir()
        .join(".cards/local/calculations/velocity.lp");
    assert!(lp.exists());
    assert_eq!(std::fs::read_to_string(lp).unwrap(), "velocity(K) :- card(K).\n");
}
