//! The project aggregate: configuration, caches, engine, watcher and lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CardCache, ResourceCache, ResourceScope};
use crate::commands::ChangeEvent;
use crate::config::ConfigStore;
use crate::domain::{CardKey, ResourceType};
use crate::engine::{CONTEXT_LOCAL_APP, CalculationEngine, EngineInputs, QueryResult};
use crate::error::CardoError;
use crate::lock::ProjectLock;
use crate::paths::ProjectPaths;
use crate::resources::ResourceContext;
use crate::sessions::EditSessionManager;
use crate::watcher::ContentWatcher;

/// Callback invoked after every successful mutation.
pub type EventHook = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// The data guarded by the project lock.
pub struct ProjectState {
    pub config: ConfigStore,
    pub resources: ResourceCache,
    pub cards: CardCache,
}

impl ProjectState {
    pub(crate) fn engine_inputs(&self) -> EngineInputs<'_> {
        EngineInputs {
            config: self.config.config(),
            resources: &self.resources,
            cards: &self.cards,
        }
    }

    pub(crate) fn local_prefix(&self) -> String {
        self.config.card_key_prefix().to_string()
    }
}

/// One open project; exactly one instance should exist per path.
pub struct Project {
    paths: ProjectPaths,
    pub(crate) lock: ProjectLock<ProjectState>,
    pub(crate) engine: CalculationEngine,
    sessions: EditSessionManager,
    watcher: Mutex<Option<ContentWatcher>>,
    event_hook: parking_lot::RwLock<Option<EventHook>>,
    closed: AtomicBool,
}

impl Project {
    /// Open an existing project rooted at `path`.
    pub fn open(path: &Path) -> Result<Self, CardoError> {
        let paths = ProjectPaths::new(path);
        let config = ConfigStore::load(&paths.config_file())?;
        let state = Self::build_state(&paths, config)?;
        Ok(Self {
            paths: paths.clone(),
            lock: ProjectLock::new(state),
            engine: CalculationEngine::new(),
            sessions: EditSessionManager::new(paths.root()),
            watcher: Mutex::new(None),
            event_hook: parking_lot::RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Scaffold a new project on disk, then open it.
    pub fn create(path: &Path, name: &str, prefix: &str) -> Result<Self, CardoError> {
        let paths = ProjectPaths::new(path);
        if paths.config_file().exists() {
            return Err(CardoError::InvalidInput(format!(
                "A project already exists at '{}'",
                path.display()
            )));
        }
        for dir in [paths.card_root(), paths.local_dir(), paths.modules_dir()] {
            fs::create_dir_all(&dir).map_err(|e| CardoError::write(&dir, e))?;
        }
        for rt in ResourceType::ALL {
            let dir = paths.local_dir().join(rt.as_str());
            fs::create_dir_all(&dir).map_err(|e| CardoError::write(&dir, e))?;
        }
        ConfigStore::create(&paths.config_file(), name, prefix)?;
        Self::open(path)
    }

    pub(crate) fn build_state(
        paths: &ProjectPaths,
        config: ConfigStore,
    ) -> Result<ProjectState, CardoError> {
        let ctx = ResourceContext::new(paths.clone(), config.card_key_prefix());
        let mut resources = ResourceCache::new(ctx, &config.module_prefixes());
        resources.refresh()?;
        let mut cards = CardCache::new(paths.clone());
        cards.populate(Self::template_roots(&resources))?;
        Ok(ProjectState { config, resources, cards })
    }

    pub(crate) fn template_roots(resources: &ResourceCache) -> Vec<(String, PathBuf)> {
        resources
            .resource_names(ResourceType::Templates, ResourceScope::All)
            .into_iter()
            .filter_map(|name| {
                let template = resources.template(&name).ok()?;
                Some((name.to_string(), template.cards_root()))
            })
            .collect()
    }

    /// Bring caches up to date; regenerates the engine when anything was
    /// stale (the watcher invalidation path lands here).
    pub(crate) fn refresh_state(
        engine: &CalculationEngine,
        state: &mut ProjectState,
    ) -> Result<(), CardoError> {
        let was_stale = state.resources.is_stale() || state.cards.is_stale();
        state.resources.refresh()?;
        state.cards.sync_templates(Self::template_roots(&state.resources));
        state.cards.refresh_if_stale()?;
        if was_stale && engine.is_initialised() {
            engine.generate(&state.engine_inputs())?;
        }
        Ok(())
    }

    /// Refresh caches under the writer lock when the watcher marked them
    /// stale.
    pub fn refresh(&self) -> Result<(), CardoError> {
        let stale = self
            .lock
            .with_reader(|state| Ok(state.resources.is_stale() || state.cards.is_stale()))?;
        if stale {
            self.lock
                .with_writer("refresh caches", |state, _| Self::refresh_state(&self.engine, state))?;
        }
        Ok(())
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn sessions(&self) -> &EditSessionManager {
        &self.sessions
    }

    pub fn card_key_prefix(&self) -> Result<String, CardoError> {
        self.lock.with_reader(|state| Ok(state.local_prefix()))
    }

    /// Register a hub URL in the configuration.
    pub fn add_hub(&self, url: &str) -> Result<(), CardoError> {
        self.lock.with_writer("add hub", |state, _| state.config.add_hub(url))
    }

    /// Remove a hub URL from the configuration.
    pub fn remove_hub(&self, url: &str) -> Result<(), CardoError> {
        self.lock.with_writer("remove hub", |state, _| state.config.remove_hub(url))
    }

    /// Install the host's change-event callback.
    pub fn set_event_hook(&self, hook: EventHook) {
        *self.event_hook.write() = Some(hook);
    }

    pub(crate) fn emit(&self, event: &ChangeEvent) {
        debug!(?event, "change event");
        if let Some(hook) = self.event_hook.read().as_ref() {
            hook(event);
        }
    }

    pub(crate) fn ensure_engine(&self, state: &ProjectState) -> Result<(), CardoError> {
        if !self.engine.is_initialised() {
            self.engine.generate(&state.engine_inputs())?;
        }
        Ok(())
    }

    /// A full card view, body included.
    pub fn card(&self, key: &CardKey) -> Result<crate::domain::Card, CardoError> {
        self.refresh()?;
        self.lock.with_reader(|state| state.cards.card(key))
    }

    /// Keys of the cards directly under the card root, in sibling order.
    pub fn root_cards(&self) -> Result<Vec<CardKey>, CardoError> {
        self.refresh()?;
        self.lock.with_reader(|state| {
            Ok(state
                .cards
                .cards(None)?
                .iter()
                .filter(|r| r.parent.is_none())
                .map(|r| r.key.clone())
                .collect())
        })
    }

    /// Run a named query in the `localApp` context.
    pub fn run_query(&self, name: &str, params: Option<&Value>) -> Result<QueryResult, CardoError> {
        self.run_query_in_context(name, CONTEXT_LOCAL_APP, &[], params)
    }

    /// Run a named query with an explicit context tag and context cards.
    pub fn run_query_in_context(
        &self,
        name: &str,
        context_tag: &str,
        card_keys: &[String],
        params: Option<&Value>,
    ) -> Result<QueryResult, CardoError> {
        self.refresh()?;
        self.lock.with_reader(|state| {
            self.ensure_engine(state)?;
            self.engine.run_query(name, context_tag, card_keys, params)
        })
    }

    /// Run an ad-hoc logic program; returns raw shown atoms.
    pub fn run_logic_program(&self, text: &str) -> Result<Vec<String>, CardoError> {
        self.refresh()?;
        self.lock.with_reader(|state| {
            self.ensure_engine(state)?;
            self.engine.run_logic_program(text)
        })
    }

    /// Expand a graph view over a graph model into DOT source.
    pub fn run_graph(
        &self,
        model: &str,
        view: &str,
        context_tag: &str,
    ) -> Result<String, CardoError> {
        let model = crate::domain::ResourceName::parse(model)?;
        let view = crate::domain::ResourceName::parse(view)?;
        self.refresh()?;
        self.lock.with_reader(|state| {
            self.ensure_engine(state)?;
            self.engine.run_graph(&state.engine_inputs(), &model, &view, context_tag)
        })
    }

    /// Write the selected logic programs (plus an optional query) to `dest`.
    pub fn export_logic_program(
        &self,
        dest: &Path,
        categories: &[String],
        query: Option<&str>,
    ) -> Result<(), CardoError> {
        self.refresh()?;
        self.lock.with_reader(|state| {
            self.ensure_engine(state)?;
            self.engine.export_logic_program(dest, categories, query)
        })
    }

    /// Start watching the project tree for out-of-band changes.
    pub fn start_watching(self: &Arc<Self>) -> Result<(), CardoError> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        let watcher = ContentWatcher::start(
            self.paths.root(),
            Box::new(move |path| {
                if let Some(project) = weak.upgrade() {
                    project.handle_fs_change(path);
                }
            }),
        )?;
        *slot = Some(watcher);
        Ok(())
    }

    /// Route one changed path into the minimal cache invalidation.
    fn handle_fs_change(&self, path: &Path) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        // Our own atomic writes go through dot-prefixed temp files; session
        // worktrees and git internals are not project content.
        if name.starts_with('.') && name.ends_with(".tmp") {
            return;
        }
        if path.components().any(|c| {
            matches!(c.as_os_str().to_str(), Some(".git") | Some(".worktrees"))
        }) {
            return;
        }

        let result = self.lock.with_writer("watcher invalidation", |state, _| {
            if self.paths.in_card_root(path) {
                state.cards.changed();
            } else if path.starts_with(self.paths.cards_dir()) {
                state.resources.handle_file_system_change(path);
                // Template content changes card partitions too.
                state.cards.changed();
            }
            Ok(())
        });
        if let Err(error) = result {
            warn!(%error, "watcher invalidation failed");
        }
    }

    /// Stop the watcher, abort sessions and close the engine. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
        self.lock.cancel_current_writer();
        self.sessions.abort_all();
        self.engine.close();
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve a card key argument.
pub(crate) fn parse_card_key(key: &str) -> Result<CardKey, CardoError> {
    CardKey::new(key)
}
