//! Git-worktree edit sessions.
//!
//! A session gives a long-running edit workflow its own checkout on a side
//! branch, so it never blocks (or is blocked by) the project lock. Committing
//! promotes the side branch into the base branch; discarding prunes the
//! worktree and deletes the branch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use git2::{BranchType, IndexAddOption, Repository, Signature, WorktreeAddOptions,
    WorktreePruneOptions};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::domain::CardKey;
use crate::error::CardoError;

/// Directory under `.cards/` holding session worktrees.
const WORKTREES_DIR: &str = ".worktrees";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Committed,
    Discarded,
}

/// One edit session as reported to callers.
#[derive(Debug, Clone)]
pub struct EditSession {
    pub id: String,
    pub card_key: CardKey,
    pub worktree_path: PathBuf,
    pub status: SessionStatus,
    branch: String,
    base_branch: String,
}

/// Manages edit sessions over one git repository.
pub struct EditSessionManager {
    repo_root: PathBuf,
    sessions: Mutex<BTreeMap<String, EditSession>>,
}

fn git_err(operation: &str) -> impl Fn(git2::Error) -> CardoError + '_ {
    move |e| CardoError::Git { operation: operation.to_string(), details: e.message().to_string() }
}

impl EditSessionManager {
    pub fn new(repo_root: &Path) -> Self {
        Self { repo_root: repo_root.to_path_buf(), sessions: Mutex::new(BTreeMap::new()) }
    }

    fn open_repo(&self) -> Result<Repository, CardoError> {
        Repository::discover(&self.repo_root).map_err(git_err("open repository"))
    }

    fn mint_id(card_key: &CardKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(card_key.as_str().as_bytes());
        hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        let digest = hasher.finalize();
        digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
    }

    /// Create a worktree on a fresh side branch from the current HEAD.
    pub fn start_session(&self, card_key: &CardKey) -> Result<EditSession, CardoError> {
        let repo = self.open_repo()?;
        let head = repo.head().map_err(git_err("read HEAD"))?;
        let base_branch = head
            .shorthand()
            .ok_or_else(|| CardoError::Git {
                operation: "read HEAD".into(),
                details: "HEAD is not a named branch".into(),
            })?
            .to_string();
        let head_commit = head.peel_to_commit().map_err(git_err("resolve HEAD commit"))?;

        let mut id = Self::mint_id(card_key);
        {
            let sessions = self.sessions.lock();
            while sessions.contains_key(&id) {
                id = Self::mint_id(card_key);
            }
        }
        let branch_name = format!("edit/{id}");
        let branch = repo
            .branch(&branch_name, &head_commit, false)
            .map_err(git_err("create session branch"))?;

        let worktree_path = self
            .repo_root
            .join(crate::paths::CARDS_DIR)
            .join(WORKTREES_DIR)
            .join(&id);
        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CardoError::write(parent, e))?;
        }
        let mut options = WorktreeAddOptions::new();
        options.reference(Some(branch.get()));
        repo.worktree(&id, &worktree_path, Some(&options))
            .map_err(git_err("create worktree"))?;

        let session = EditSession {
            id: id.clone(),
            card_key: card_key.clone(),
            worktree_path,
            status: SessionStatus::Active,
            branch: branch_name,
            base_branch,
        };
        info!(session = %id, card = %card_key, "edit session started");
        self.sessions.lock().insert(id, session.clone());
        Ok(session)
    }

    fn active_session(&self, id: &str) -> Result<EditSession, CardoError> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(id)
            .ok_or_else(|| CardoError::SessionNotFound(id.to_string()))?;
        if session.status != SessionStatus::Active {
            return Err(CardoError::SessionNotFound(id.to_string()));
        }
        Ok(session.clone())
    }

    /// Commit the worktree's changes and promote them to the base branch.
    ///
    /// Promotion is a fast-forward; a base branch that moved since the
    /// session started fails and leaves the session branch for manual merge.
    pub fn commit_session(&self, id: &str, message: &str) -> Result<(), CardoError> {
        let session = self.active_session(id)?;
        let worktree_repo =
            Repository::open(&session.worktree_path).map_err(git_err("open worktree"))?;

        let mut index = worktree_repo.index().map_err(git_err("read worktree index"))?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .map_err(git_err("stage worktree changes"))?;
        index.write().map_err(git_err("write worktree index"))?;
        let tree_id = index.write_tree().map_err(git_err("write worktree tree"))?;
        let tree = worktree_repo.find_tree(tree_id).map_err(git_err("find worktree tree"))?;

        let parent = worktree_repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(git_err("resolve worktree HEAD"))?;
        let signature = worktree_repo
            .signature()
            .or_else(|_| Signature::now("cardo", "cardo@localhost"))
            .map_err(git_err("build signature"))?;
        let commit_id = worktree_repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])
            .map_err(git_err("commit session"))?;

        // Promote: fast-forward the base branch onto the session commit.
        let repo = self.open_repo()?;
        let base = repo
            .find_branch(&session.base_branch, BranchType::Local)
            .map_err(git_err("find base branch"))?;
        let base_commit = base.get().peel_to_commit().map_err(git_err("resolve base branch"))?;
        let is_ff = repo
            .graph_descendant_of(commit_id, base_commit.id())
            .map_err(git_err("check ancestry"))?
            || commit_id == base_commit.id();
        if !is_ff {
            return Err(CardoError::Git {
                operation: "promote session".into(),
                details: format!(
                    "base branch '{}' moved since the session started",
                    session.base_branch
                ),
            });
        }
        base.into_reference()
            .set_target(commit_id, &format!("edit session {id} promoted"))
            .map_err(git_err("promote session"))?;

        self.cleanup(&repo, &session)?;
        let mut sessions = self.sessions.lock();
        if let Some(stored) = sessions.get_mut(id) {
            stored.status = SessionStatus::Committed;
        }
        info!(session = %id, "edit session committed");
        Ok(())
    }

    /// Remove the worktree and its branch without keeping any changes.
    pub fn discard_session(&self, id: &str) -> Result<(), CardoError> {
        let session = self.active_session(id)?;
        let repo = self.open_repo()?;
        self.cleanup(&repo, &session)?;
        let mut sessions = self.sessions.lock();
        if let Some(stored) = sessions.get_mut(id) {
            stored.status = SessionStatus::Discarded;
        }
        info!(session = %id, "edit session discarded");
        Ok(())
    }

    /// Discard every active session; used when the project closes.
    pub fn abort_all(&self) {
        let ids: Vec<String> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .map(|s| s.id.clone())
            .collect();
        for id in ids {
            let _ = self.discard_session(&id);
        }
    }

    pub fn list_sessions(&self) -> Vec<EditSession> {
        self.sessions.lock().values().cloned().collect()
    }

    fn cleanup(&self, repo: &Repository, session: &EditSession) -> Result<(), CardoError> {
        let worktree = repo.find_worktree(&session.id).map_err(git_err("find worktree"))?;
        let mut options = WorktreePruneOptions::new();
        options.valid(true).working_tree(true);
        worktree.prune(Some(&mut options)).map_err(git_err("prune worktree"))?;
        let mut branch = repo
            .find_branch(&session.branch, BranchType::Local)
            .map_err(git_err("find session branch"))?;
        branch.delete().map_err(git_err("delete session branch"))?;
        Ok(())
    }
}
