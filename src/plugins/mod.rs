//! Lifecycle participants and the ordered registry they live in.
//!
//! Setup and preload run in registration order, teardown in reverse. The
//! process-wide registry is meant to be filled before the first application
//! is built; each application works from a snapshot taken at construction.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::Result;
use crate::runtime::Application;

pub mod series;

pub use series::{Done as PreloadDone, SeriesTask, run_series};

pub type SetupHook = Arc<dyn Fn(&Application) -> Result<()> + Send + Sync>;
pub type PreloadHook = Arc<dyn Fn(&Application, PreloadDone) -> Result<()> + Send + Sync>;
pub type TeardownHook = Arc<dyn Fn(&Application) -> Result<()> + Send + Sync>;

/// One plugin: a name for diagnostics plus up to three hooks. Missing
/// `setup`/`teardown` hooks behave as no-ops; a missing `preload` hook means
/// the plugin does not take part in the preload series.
#[derive(Clone)]
pub struct PluginEntry {
    name: String,
    setup: Option<SetupHook>,
    preload: Option<PreloadHook>,
    teardown: Option<TeardownHook>,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .field("setup", &self.setup.is_some())
            .field("preload", &self.preload.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

impl PluginEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            preload: None,
            teardown: None,
        }
    }

    pub fn setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Application) -> Result<()> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(hook));
        self
    }

    pub fn preload<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Application, PreloadDone) -> Result<()> + Send + Sync + 'static,
    {
        self.preload = Some(Arc::new(hook));
        self
    }

    pub fn teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Application) -> Result<()> + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_preload(&self) -> bool {
        self.preload.is_some()
    }

    pub(crate) fn run_setup(&self, app: &Application) -> Result<()> {
        match &self.setup {
            Some(hook) => hook(app),
            None => Ok(()),
        }
    }

    pub(crate) fn preload_hook(&self) -> Option<PreloadHook> {
        self.preload.clone()
    }

    pub(crate) fn run_teardown(&self, app: &Application) -> Result<()> {
        match &self.teardown {
            Some(hook) => hook(app),
            None => Ok(()),
        }
    }
}

/// Ordered list of plugins. Entries are never removed.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: PluginEntry) {
        self.entries.push(entry);
    }

    pub fn with_plugin(mut self, entry: PluginEntry) -> Self {
        self.register(entry);
        self
    }

    pub fn for_each_in_order<F>(&self, f: F)
    where
        F: FnMut(&PluginEntry),
    {
        self.entries.iter().for_each(f);
    }

    pub fn for_each_in_reverse_order<F>(&self, f: F)
    where
        F: FnMut(&PluginEntry),
    {
        self.entries.iter().rev().for_each(f);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }
}

static GLOBAL_PLUGINS: Mutex<Vec<PluginEntry>> = Mutex::new(Vec::new());

/// Append `entry` to the process-wide registry used by [`Application::new`].
pub fn register(entry: PluginEntry) {
    GLOBAL_PLUGINS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(entry);
}

/// Copy of the process-wide registry as it stands right now.
pub fn global_snapshot() -> PluginRegistry {
    let entries = GLOBAL_PLUGINS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    PluginRegistry { entries }
}
