mod common;

use std::collections::BTreeMap;
use std::path::Path;

use cardo::error::CardoError;
use common::TestContext;
use serde_json::json;

fn tree_snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut snapshot = BTreeMap::new();
    fn walk(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                out.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    walk(root, root, &mut snapshot);
    snapshot
}

#[test]
fn rename_prefix_rewrites_keys_and_references() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    ctx.project()
        .edit_card_metadata(&keys[0].to_string(), "demo/fieldTypes/estimate", json!(5))
        .unwrap();

    ctx.project().rename_project_prefix("cli").unwrap();

    // Configuration reports the new prefix.
    let shown = ctx.manager().show_project();
    assert_eq!(shown.payload.unwrap()["prefix"], "cli");

    // Every card key now carries the new prefix.
    let roots = ctx.project().root_cards().unwrap();
    assert!(!roots.is_empty());
    for key in &roots {
        assert!(key.to_string().starts_with("cli_"), "{key}");
    }

    // References inside metadata moved with it.
    let card = ctx.project().card(&roots[0]).unwrap();
    assert_eq!(card.metadata.card_type.to_string(), "cli/cardTypes/page");
    assert_eq!(card.metadata.field("cli/fieldTypes/estimate"), Some(&json!(5)));
    assert_eq!(card.metadata.field("demo/fieldTypes/estimate"), None);

    // No file under the project still mentions the old resource prefix.
    let snapshot = tree_snapshot(&ctx.project_dir());
    for (path, bytes) in &snapshot {
        let text = String::from_utf8_lossy(bytes);
        assert!(
            !text.contains("demo/cardTypes/") && !text.contains("demo/workflows/"),
            "{path} still references the old prefix"
        );
    }
}

#[test]
fn rename_to_the_same_prefix_fails() {
    let ctx = TestContext::new();
    ctx.project().rename_project_prefix("cli").unwrap();
    let err = ctx.project().rename_project_prefix("cli").unwrap_err();
    assert!(matches!(err, CardoError::InvalidInput(_)));
    assert_eq!(err.to_string(), "Invalid input: Project prefix is already 'cli'");
}

#[test]
fn rename_rejects_empty_and_module_prefixes() {
    let ctx = TestContext::new();
    let source = ctx.module_source("test");
    ctx.project().import_module(&source, None).unwrap();

    let err = ctx.project().rename_project_prefix("").unwrap_err();
    assert!(matches!(err, CardoError::InvalidInput(_)));
    let err = ctx.project().rename_project_prefix("test").unwrap_err();
    assert!(matches!(err, CardoError::PrefixCollision(_)));
}

#[test]
fn rename_round_trip_restores_the_tree() {
    let ctx = TestContext::new();
    ctx.create_page_cards();
    let before = tree_snapshot(&ctx.project_dir());

    ctx.project().rename_project_prefix("cli").unwrap();
    ctx.project().rename_project_prefix("demo").unwrap();

    let after = tree_snapshot(&ctx.project_dir());
    assert_eq!(
        before.keys().collect::<Vec<_>>(),
        after.keys().collect::<Vec<_>>(),
        "same file set after a rename round trip"
    );
    for (path, bytes) in &before {
        assert_eq!(bytes, &after[path], "{path} changed across the round trip");
    }
}

#[test]
fn commands_keep_working_after_a_rename() {
    let ctx = TestContext::new();
    ctx.create_page_cards();
    ctx.project().rename_project_prefix("cli").unwrap();

    let keys = ctx.project().create_card("cli/templates/page", None).unwrap();
    assert!(keys[0].to_string().starts_with("cli_"));
    ctx.project().transition_card(&keys[0].to_string(), "Approve").unwrap();

    let result = ctx.project().run_query("tree", None).unwrap();
    assert!(result.rows.iter().all(|row| row.key.starts_with("cli_")));
}
