mod common;

use std::process::Command;

use cardo::error::CardoError;
use cardo::sessions::SessionStatus;
use common::TestContext;

fn git(dir: &std::path::Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Turn the fixture project into a committed git repository.
fn init_repo(ctx: &TestContext) {
    let dir = ctx.project_dir();
    git(&dir, &["init", "--initial-branch=main"]);
    git(&dir, &["config", "user.name", "cardo-tests"]);
    git(&dir, &["config", "user.email", "cardo-tests@localhost"]);
    git(&dir, &["add", "."]);
    git(&dir, &["commit", "-m", "initial project state"]);
}

#[test]
fn start_commit_session_promotes_changes() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    init_repo(&ctx);

    let sessions = ctx.project().sessions();
    let session = sessions.start_session(&keys[0]).unwrap();
    assert_eq!(session.card_key, keys[0]);
    assert_eq!(session.status, SessionStatus::Active);
    assert!(session.worktree_path.exists());

    // Edit the card body inside the isolated worktree.
    let card_dir = session
        .worktree_path
        .join("cardRoot")
        .join(keys[0].as_str());
    std::fs::write(card_dir.join("index.adoc"), "edited in a session\n").unwrap();

    sessions.commit_session(&session.id, "edit card body").unwrap();
    assert!(!session.worktree_path.exists(), "worktree pruned after commit");

    // The base branch received the commit.
    let output = Command::new("git")
        .args(["log", "--oneline", "main"])
        .current_dir(ctx.project_dir())
        .output()
        .unwrap();
    let log = String::from_utf8_lossy(&output.stdout);
    assert!(log.contains("edit card body"), "{log}");

    let listed = sessions.list_sessions();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, SessionStatus::Committed);
}

#[test]
fn discard_session_drops_the_worktree() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    init_repo(&ctx);

    let sessions = ctx.project().sessions();
    let session = sessions.start_session(&keys[0]).unwrap();
    sessions.discard_session(&session.id).unwrap();
    assert!(!session.worktree_path.exists());

    // A discarded session cannot be committed.
    let err = sessions.commit_session(&session.id, "too late").unwrap_err();
    assert!(matches!(err, CardoError::SessionNotFound(_)));
}

#[test]
fn unknown_session_id_is_reported() {
    let ctx = TestContext::new();
    init_repo(&ctx);
    let err = ctx.project().sessions().discard_session("deadbeef").unwrap_err();
    assert!(matches!(err, CardoError::SessionNotFound(_)));
}

#[test]
fn sessions_do_not_block_commands() {
    let ctx = TestContext::new();
    let keys = ctx.create_page_cards();
    init_repo(&ctx);

    let session = ctx.project().sessions().start_session(&keys[0]).unwrap();
    // The main checkout stays fully usable while the session is open.
    ctx.project().transition_card(&keys[0].to_string(), "Approve").unwrap();
    ctx.project().sessions().discard_session(&session.id).unwrap();
}
