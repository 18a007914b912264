//! Store configuration: built-in defaults, then an optional config file, then
//! `TEMPORA_*` environment variables (e.g. `TEMPORA_BACKEND=sqlite`,
//! `TEMPORA_SQLITE_PATH=/var/lib/tempora.db`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConnectionError, ConnectionResult};
use crate::persist::{DEFAULT_BUSY_TIMEOUT_MS, PersistenceMode, Persistor};
use crate::storage::{DEFAULT_PAGE_SIZE, MemoryStorage, Storage};

pub const ENV_PREFIX: &str = "TEMPORA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Database file for the sqlite backend; in-memory sqlite when absent.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
    /// How many entries a scan fetches from the backend at a time.
    pub scan_page_size: usize,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            sqlite_path: None,
            scan_page_size: DEFAULT_PAGE_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `path` (if given and present) and then by the
    /// environment.
    pub fn load(path: Option<&Path>) -> ConnectionResult<Self> {
        let mut builder = Self::defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Self::finish(config)
    }

    /// Defaults overridden by the given file only, which must exist.
    pub fn from_file(path: &Path) -> ConnectionResult<Self> {
        let config = Self::defaults()?.add_source(File::from(path)).build()?;
        Self::finish(config)
    }

    fn defaults() -> ConnectionResult<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Self::default();
        Ok(Config::builder()
            .set_default("backend", "memory")?
            .set_default("scan_page_size", defaults.scan_page_size as i64)?
            .set_default("busy_timeout_ms", defaults.busy_timeout_ms as i64)?)
    }

    fn finish(config: Config) -> ConnectionResult<Self> {
        let loaded: StoreConfig = config.try_deserialize()?;
        if loaded.scan_page_size == 0 {
            return Err(ConnectionError::Config("scan_page_size must be at least 1".into()));
        }
        Ok(loaded)
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Sqlite,
            sqlite_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// The backend this configuration selects.
    pub fn open_storage(&self) -> ConnectionResult<Arc<dyn Storage>> {
        let storage: Arc<dyn Storage> = match self.backend {
            BackendKind::Memory => Arc::new(MemoryStorage::with_page_size(self.scan_page_size)),
            BackendKind::Sqlite => {
                let mode = match &self.sqlite_path {
                    Some(path) => PersistenceMode::File(path.clone()),
                    None => PersistenceMode::InMemory,
                };
                Arc::new(Persistor::with_options(mode, self.scan_page_size, self.busy_timeout_ms)?)
            }
        };
        info!(backend = ?self.backend, path = ?self.sqlite_path, "storage opened");
        Ok(storage)
    }
}
