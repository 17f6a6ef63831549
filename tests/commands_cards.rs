mod common;

use cardo::error::CardoError;
use common::TestContext;
use serde_json::json;

#[test]
fn create_card_clones_the_template_tree() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    assert_eq!(keys.len(), 2, "template holds a parent and a child");

    for key in &keys {
        let text = key.to_string();
        assert!(
            text.starts_with("demo_")
                && text["demo_".len()..].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()),
            "key '{text}' must match ^demo_[a-z0-9]+$"
        );
    }

    let parent = ctx.project().card(&keys[0]).unwrap();
    assert_eq!(parent.metadata.workflow_state, "Draft", "initial state of the workflow");
    assert_eq!(parent.children, vec![keys[1].clone()]);

    let child = ctx.project().card(&keys[1]).unwrap();
    assert_eq!(child.parent.as_ref(), Some(&keys[0]));
}

#[test]
fn created_keys_are_unique_across_creations() {
    let ctx = TestContext::new();
    let mut all = Vec::new();
    for _ in 0..5 {
        all.extend(ctx.create_page_cards());
    }
    let mut dedup = all.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(all.len(), dedup.len(), "no two cards share a key");
}

#[test]
fn create_card_under_a_parent() {
    let ctx = TestContext::new();
    let roots = ctx.create_page_cards();
    let children = ctx
        .project()
        .create_card("demo/templates/page", Some(&roots[1]))
        .unwrap();
    let child = ctx.project().card(&children[0]).unwrap();
    assert_eq!(child.parent.as_ref(), Some(&roots[1]));
}

#[test]
fn unknown_template_is_rejected() {
    let ctx = TestContext::new();
    let err = ctx.project().create_card("demo/templates/ghost", None).unwrap_err();
    assert!(matches!(err, CardoError::TemplateNotFound(_)));
}

#[test]
fn edit_metadata_validates_against_the_field_type() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    let key = keys[0].to_string();
    let field = "demo/fieldTypes/estimate";

    ctx.project().edit_card_metadata(&key, field, json!(42)).unwrap();
    let card = ctx.project().card(&keys[0]).unwrap();
    assert_eq!(card.metadata.field(field), Some(&json!(42)));

    // A mismatched value fails and leaves the prior one intact.
    let err = ctx.project().edit_card_metadata(&key, field, json!("abc")).unwrap_err();
    assert!(matches!(err, CardoError::SchemaViolation(_)));
    let card = ctx.project().card(&keys[0]).unwrap();
    assert_eq!(card.metadata.field(field), Some(&json!(42)));

    // Null clears.
    ctx.project().edit_card_metadata(&key, field, json!(null)).unwrap();
    let card = ctx.project().card(&keys[0]).unwrap();
    assert_eq!(card.metadata.field(field), None);
}

#[test]
fn edit_content_round_trips() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    ctx.project()
        .edit_card_content(&keys[0].to_string(), "= Title\n\nBody text.\n")
        .unwrap();
    let card = ctx.project().card(&keys[0]).unwrap();
    assert_eq!(card.content, "= Title\n\nBody text.\n");
}

#[test]
fn transitions_follow_the_workflow() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    let key = keys[0].to_string();

    ctx.project().transition_card(&key, "Approve").unwrap();
    assert_eq!(ctx.project().card(&keys[0]).unwrap().metadata.workflow_state, "Approved");

    // Re-applying the same transition is a no-op success.
    ctx.project().transition_card(&key, "Approve").unwrap();
    assert_eq!(ctx.project().card(&keys[0]).unwrap().metadata.workflow_state, "Approved");

    // A transition that does not leave the current state is illegal.
    let err = ctx.project().transition_card(&key, "Create").unwrap_err();
    assert!(matches!(err, CardoError::IllegalTransition { .. }));

    // The wildcard origin works from any state.
    ctx.project().transition_card(&key, "Archive").unwrap();
    assert_eq!(
        ctx.project().card(&keys[0]).unwrap().metadata.workflow_state,
        "Deprecated"
    );
}

#[test]
fn move_card_rejects_cycles() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    let parent = keys[0].to_string();
    let child = keys[1].to_string();

    let err = ctx.project().move_card(&parent, Some(&child)).unwrap_err();
    assert!(matches!(err, CardoError::CycleForbidden { .. }));
    let err = ctx.project().move_card(&parent, Some(&parent)).unwrap_err();
    assert!(matches!(err, CardoError::CycleForbidden { .. }));
}

#[test]
fn move_card_to_root_and_back() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    let child = keys[1].to_string();

    ctx.project().move_card(&child, None).unwrap();
    let record = ctx.project().card(&keys[1]).unwrap();
    assert_eq!(record.parent, None);

    ctx.project().move_card(&child, Some(&keys[0].to_string())).unwrap();
    let record = ctx.project().card(&keys[1]).unwrap();
    assert_eq!(record.parent.as_ref(), Some(&keys[0]));
}

#[test]
fn rank_by_index_reorders_siblings() {
    let ctx = TestContext::new();
    let first = ctx.create_page_cards()[0].clone();
    let second = ctx.create_page_cards()[0].clone();
    let third = ctx.create_page_cards()[0].clone();

    // Move the last root card to the front.
    ctx.project().rank_by_index(&third.to_string(), 0).unwrap();

    let order = ctx.project().root_cards().unwrap();
    assert_eq!(order, vec![third.clone(), first.clone(), second.clone()]);

    let err = ctx.project().rank_by_index(&third.to_string(), 9).unwrap_err();
    assert!(matches!(err, CardoError::InvalidTargetIndex { .. }));
}

#[test]
fn labels_and_links() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    let a = keys[0].to_string();
    let b = keys[1].to_string();

    ctx.project().create_label(&a, "alpha").unwrap();
    let err = ctx.project().create_label(&a, "alpha").unwrap_err();
    assert!(matches!(err, CardoError::ItemAlreadyExists(_)));

    ctx.project().create_resource(cardo::ResourceType::LinkTypes, "blocks").unwrap();
    ctx.project()
        .create_link(&a, &b, "demo/linkTypes/blocks", None)
        .unwrap();
    let err = ctx
        .project()
        .create_link(&a, &b, "demo/linkTypes/blocks", None)
        .unwrap_err();
    assert!(matches!(err, CardoError::ItemAlreadyExists(_)));

    // Descriptions require opt-in on the link type.
    let err = ctx
        .project()
        .create_link(&b, &a, "demo/linkTypes/blocks", Some("why"))
        .unwrap_err();
    assert!(matches!(err, CardoError::InvalidInput(_)));

    ctx.project().remove_link(&a, &b, "demo/linkTypes/blocks").unwrap();
    ctx.project().remove_label(&a, "alpha").unwrap();
    let err = ctx.project().remove_label(&a, "alpha").unwrap_err();
    assert!(matches!(err, CardoError::ItemNotFound(_)));
}

#[test]
fn attachments_lifecycle() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    let key = keys[0].to_string();

    ctx.project()
        .create_attachment(&key, "diagram.png", b"not really a png")
        .unwrap();
    let err = ctx
        .project()
        .create_attachment(&key, "diagram.png", b"again")
        .unwrap_err();
    assert!(matches!(err, CardoError::AttachmentExists { .. }));

    let card = ctx.project().card(&keys[0]).unwrap();
    assert_eq!(card.attachments, vec!["diagram.png".to_string()]);

    ctx.project().remove_attachment(&key, "diagram.png").unwrap();
    let err = ctx.project().remove_attachment(&key, "diagram.png").unwrap_err();
    assert!(matches!(err, CardoError::AttachmentNotFound { .. }));
}

#[test]
fn remove_card_deletes_the_subtree() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    ctx.project().remove_card(&keys[0].to_string()).unwrap();

    for key in &keys {
        assert!(ctx.manager().show_card(&key.to_string()).status_code == 400);
    }
}

#[test]
fn failing_command_leaves_no_partial_state() {
    let ctx = TestContext::new();
    let before = ctx.project().root_cards().unwrap();
    let err = ctx.project().create_card("demo/templates/ghost", None).unwrap_err();
    assert!(matches!(err, CardoError::TemplateNotFound(_)));
    assert_eq!(ctx.project().root_cards().unwrap(), before);
}
