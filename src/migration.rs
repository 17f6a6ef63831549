//! Versioned schema migrations.
//!
//! Migrations form an ordered chain of steps, each moving a project one
//! schema version forward. Every step checks its preconditions in `before`;
//! a failing check bypasses `migrate` and aborts the run with the project
//! left at the last successfully reached version.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::ConfigStore;
use crate::error::CardoError;
use crate::paths::ProjectPaths;
use crate::resources::collect_files;
use crate::schema;

/// Result of one migration hook.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl StepOutcome {
    pub fn ok() -> Self {
        Self { success: true, message: None }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()) }
    }
}

/// One step of the migration chain.
pub trait MigrationStep: Send + Sync {
    /// Schema version a project is at after this step.
    fn target_version(&self) -> u32;

    fn description(&self) -> &str;

    /// Precondition check; failure bypasses `migrate`.
    fn before(&self, project_root: &Path) -> StepOutcome;

    fn migrate(&self, project_root: &Path) -> StepOutcome;
}

/// v1 → v2: hubs became part of the configuration, and resources are
/// snapshotted under `.cards/<version>/resources/`.
struct HubsAndSnapshotMigration;

impl MigrationStep for HubsAndSnapshotMigration {
    fn target_version(&self) -> u32 {
        2
    }

    fn description(&self) -> &str {
        "add hub registry to configuration and snapshot versioned resources"
    }

    fn before(&self, project_root: &Path) -> StepOutcome {
        let config = ProjectPaths::new(project_root).config_file();
        match schema::read_json(&config) {
            Ok(_) => StepOutcome::ok(),
            Err(e) => StepOutcome::fail(format!("configuration is not readable: {e}")),
        }
    }

    fn migrate(&self, project_root: &Path) -> StepOutcome {
        let paths = ProjectPaths::new(project_root);
        let config_path = paths.config_file();
        let mut value = match schema::read_json(&config_path) {
            Ok(value) => value,
            Err(e) => return StepOutcome::fail(e.to_string()),
        };
        if let Some(object) = value.as_object_mut() {
            object
                .entry("hubs")
                .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        }
        if let Err(e) = schema::write_json(&config_path, &value) {
            return StepOutcome::fail(e.to_string());
        }

        let snapshot = paths.versioned_resources_dir(self.target_version());
        if let Err(e) = copy_tree(&paths.local_dir(), &snapshot) {
            return StepOutcome::fail(e.to_string());
        }
        StepOutcome::ok()
    }
}

/// The chain, in ascending version order.
pub fn all_migrations() -> Vec<Box<dyn MigrationStep>> {
    vec![Box::new(HubsAndSnapshotMigration)]
}

/// Runs the migration chain for one project.
pub struct MigrationRunner {
    steps: Vec<Box<dyn MigrationStep>>,
    timeout: Option<Duration>,
    backup_dir: Option<PathBuf>,
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self { steps: all_migrations(), timeout: None, backup_dir: None }
    }

    /// Replace the built-in chain; steps must be in ascending version order.
    pub fn with_steps(steps: Vec<Box<dyn MigrationStep>>) -> Self {
        Self { steps, timeout: None, backup_dir: None }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Copy `.cards/` into this directory (with a checksum manifest) before
    /// running any step.
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Latest schema version this chain can reach.
    pub fn latest_version(&self) -> u32 {
        self.steps.iter().map(|s| s.target_version()).max().unwrap_or(0)
    }

    /// Migrate from the current version to `target` (`None` = latest).
    ///
    /// Returns the version the project ends at. The version only advances
    /// past steps that completed; the first failure aborts the run.
    pub fn run(
        &self,
        project_root: &Path,
        current: u32,
        target: Option<u32>,
    ) -> Result<u32, CardoError> {
        let latest = self.latest_version().max(current);
        let requested = target.unwrap_or(latest);

        if requested < current {
            return Err(CardoError::DowngradeRefused { from: current, to: requested });
        }
        if requested == current {
            return Ok(current);
        }
        // An explicit target must be a version some step actually produces;
        // anything else would leave the chain mid-air.
        if target.is_some()
            && !self.steps.iter().any(|s| s.target_version() == requested)
        {
            return Err(CardoError::VersionSkipped { from: current, to: requested });
        }

        let chain: Vec<&dyn MigrationStep> = self
            .steps
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| s.target_version() > current && s.target_version() <= requested)
            .collect();
        if chain.is_empty() {
            return Err(CardoError::VersionSkipped { from: current, to: requested });
        }

        if let Some(backup_dir) = &self.backup_dir {
            backup_cards(project_root, backup_dir)?;
        }

        let started = Instant::now();
        let mut reached = current;
        for step in chain {
            if let Some(timeout) = self.timeout
                && started.elapsed() > timeout
            {
                return Err(CardoError::Timeout(format!(
                    "migration to version {}",
                    step.target_version()
                )));
            }

            let version = step.target_version();
            info!(version, description = step.description(), "running migration step");

            let before = step.before(project_root);
            if !before.success {
                return Err(CardoError::MigrationFailed {
                    version,
                    message: before
                        .message
                        .unwrap_or_else(|| "precondition check failed".into()),
                });
            }

            let outcome = step.migrate(project_root);
            if !outcome.success {
                return Err(CardoError::MigrationFailed {
                    version,
                    message: outcome.message.unwrap_or_else(|| "migration failed".into()),
                });
            }

            let mut config = ConfigStore::load(&ProjectPaths::new(project_root).config_file())?;
            config.set_schema_version(version)?;
            reached = version;
        }
        Ok(reached)
    }
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), CardoError> {
    if !from.exists() {
        return Ok(());
    }
    let mut files = Vec::new();
    collect_files(from, &mut |path| files.push(path.to_path_buf()))?;
    for file in files {
        let relative = file.strip_prefix(from).expect("walked under root");
        let dest = to.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CardoError::write(parent, e))?;
        }
        fs::copy(&file, &dest).map_err(|e| CardoError::write(&dest, e))?;
    }
    Ok(())
}

/// Copy `.cards/` aside and record a sha256 per file, so a failed migration
/// can be diffed against the pre-migration state.
fn backup_cards(project_root: &Path, backup_dir: &Path) -> Result<(), CardoError> {
    let source = ProjectPaths::new(project_root).cards_dir();
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let dest = backup_dir.join(format!("cards-{stamp}"));
    copy_tree(&source, &dest)?;

    let mut manifest = serde_json::Map::new();
    let mut files = Vec::new();
    if dest.exists() {
        collect_files(&dest, &mut |path| files.push(path.to_path_buf()))?;
    }
    for file in files {
        let bytes = fs::read(&file).map_err(|e| CardoError::read(&file, e))?;
        let digest = Sha256::digest(&bytes);
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let relative = file.strip_prefix(&dest).expect("walked under root");
        manifest.insert(relative.to_string_lossy().into_owned(), hex.into());
    }
    schema::write_json(&dest.join("manifest.json"), &serde_json::Value::Object(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingStep {
        version: u32,
        fail_before: bool,
        fail_migrate: bool,
        ran: std::sync::Arc<AtomicBool>,
    }

    impl MigrationStep for RecordingStep {
        fn target_version(&self) -> u32 {
            self.version
        }

        fn description(&self) -> &str {
            "recording step"
        }

        fn before(&self, _root: &Path) -> StepOutcome {
            if self.fail_before {
                StepOutcome::fail("before failed")
            } else {
                StepOutcome::ok()
            }
        }

        fn migrate(&self, _root: &Path) -> StepOutcome {
            self.ran.store(true, Ordering::SeqCst);
            if self.fail_migrate {
                StepOutcome::fail("migrate failed")
            } else {
                StepOutcome::ok()
            }
        }
    }

    fn project_with_version(dir: &Path, version: u32) -> ProjectPaths {
        let paths = ProjectPaths::new(dir);
        let raw = serde_json::json!({
            "schemaVersion": version,
            "cardKeyPrefix": "demo",
            "name": "Demo",
            "modules": [],
            "hubs": []
        });
        schema::write_json(&paths.config_file(), &raw).unwrap();
        paths
    }

    fn step(
        version: u32,
        fail_before: bool,
        fail_migrate: bool,
    ) -> (Box<dyn MigrationStep>, std::sync::Arc<AtomicBool>) {
        let ran = std::sync::Arc::new(AtomicBool::new(false));
        (
            Box::new(RecordingStep {
                version,
                fail_before,
                fail_migrate,
                ran: std::sync::Arc::clone(&ran),
            }),
            ran,
        )
    }

    #[test]
    fn downgrade_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        project_with_version(dir.path(), 3);
        let runner = MigrationRunner::with_steps(vec![step(2, false, false).0]);
        let err = runner.run(dir.path(), 3, Some(2)).unwrap_err();
        assert!(matches!(err, CardoError::DowngradeRefused { from: 3, to: 2 }));
    }

    #[test]
    fn unknown_explicit_target_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        project_with_version(dir.path(), 1);
        let runner = MigrationRunner::with_steps(vec![step(2, false, false).0]);
        let err = runner.run(dir.path(), 1, Some(5)).unwrap_err();
        assert!(matches!(err, CardoError::VersionSkipped { from: 1, to: 5 }));
    }

    #[test]
    fn before_failure_bypasses_migrate() {
        let dir = tempfile::tempdir().unwrap();
        project_with_version(dir.path(), 1);
        let (s, ran) = step(2, true, false);
        let runner = MigrationRunner::with_steps(vec![s]);
        let err = runner.run(dir.path(), 1, Some(2)).unwrap_err();
        assert!(matches!(err, CardoError::MigrationFailed { version: 2, .. }));
        assert!(!ran.load(Ordering::SeqCst), "migrate must not run");

        let config = ConfigStore::load(&ProjectPaths::new(dir.path()).config_file()).unwrap();
        assert_eq!(config.config().schema_version, Some(1));
    }

    #[test]
    fn failure_keeps_completed_steps() {
        let dir = tempfile::tempdir().unwrap();
        project_with_version(dir.path(), 1);
        let (ok_step, _) = step(2, false, false);
        let (bad_step, _) = step(3, false, true);
        let runner = MigrationRunner::with_steps(vec![ok_step, bad_step]);
        let err = runner.run(dir.path(), 1, None).unwrap_err();
        assert!(matches!(err, CardoError::MigrationFailed { version: 3, .. }));

        let config = ConfigStore::load(&ProjectPaths::new(dir.path()).config_file()).unwrap();
        assert_eq!(config.config().schema_version, Some(2));
    }

    #[test]
    fn migrating_to_latest_runs_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        project_with_version(dir.path(), 1);
        let (first, first_ran) = step(2, false, false);
        let (second, second_ran) = step(3, false, false);
        let runner = MigrationRunner::with_steps(vec![first, second]);
        let reached = runner.run(dir.path(), 1, None).unwrap();
        assert_eq!(reached, 3);
        assert!(first_ran.load(Ordering::SeqCst));
        assert!(second_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn current_version_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        project_with_version(dir.path(), 2);
        let runner = MigrationRunner::with_steps(vec![step(2, false, false).0]);
        assert_eq!(runner.run(dir.path(), 2, Some(2)).unwrap(), 2);
    }

    #[test]
    fn builtin_chain_reaches_current_schema() {
        let runner = MigrationRunner::new();
        assert_eq!(runner.latest_version(), crate::config::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn backup_writes_a_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        project_with_version(dir.path(), 1);
        let (s, _) = step(2, false, false);
        let runner =
            MigrationRunner::with_steps(vec![s]).backup_dir(backups.path().to_path_buf());
        runner.run(dir.path(), 1, Some(2)).unwrap();

        let entries: Vec<_> = fs::read_dir(backups.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let backup_root = entries[0].as_ref().unwrap().path();
        assert!(backup_root.join("manifest.json").exists());
    }
}
