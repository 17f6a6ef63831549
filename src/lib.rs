//! cardo: a project data engine for file-backed card repositories.
//!
//! A project is a directory: a `cardRoot/` tree of card directories plus
//! `.cards/` resources (card types, workflows, field types, link types,
//! templates, reports, graph models and views, calculations), with imported
//! projects mirrored read-only under `.cards/modules/`. The engine keeps
//! typed caches over that tree, mutates it through writer-locked commands,
//! and mirrors it into an embedded logic solver for queries.

pub mod cache;
pub mod commands;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod lock;
pub mod migration;
pub mod paths;
pub mod project;
pub mod resources;
pub mod schema;
pub mod sessions;
pub mod watcher;

pub use commands::{ActionResult, ChangeEvent, CommandManager};
pub use config::{CURRENT_SCHEMA_VERSION, ConfigStore, ProjectConfig};
pub use domain::{Card, CardKey, CardMetadata, Rank, ResourceName, ResourceType};
pub use engine::{CalculationEngine, QueryResult, ResultRow};
pub use error::{CardoError, ErrorKind};
pub use migration::{MigrationRunner, MigrationStep, StepOutcome};
pub use project::Project;
pub use sessions::{EditSession, EditSessionManager, SessionStatus};
