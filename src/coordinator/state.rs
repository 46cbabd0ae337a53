//! Shared coordinator state handed to every handler

use crate::config::{ClassifierConfig, CoordinatorConfig};
use crate::coordinator::registry::WorkerRegistry;
use crate::state::Blacklist;
use crate::storage::{SqliteStorage, Storage, StorageError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub struct AppState {
    storage: Arc<Mutex<SqliteStorage>>,
    workers: Arc<Mutex<WorkerRegistry>>,
    /// Static list and blacklist file, plus database flags mirrored on demand
    pub blacklist: Arc<Blacklist>,
    pub config: Arc<CoordinatorConfig>,
}

impl AppState {
    pub fn new(
        storage: SqliteStorage,
        config: CoordinatorConfig,
        classifier: &ClassifierConfig,
    ) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            workers: Arc::new(Mutex::new(WorkerRegistry::new())),
            blacklist: Arc::new(Blacklist::new(classifier)),
            config: Arc::new(config),
        }
    }

    /// Locks the database; never hold the guard across an await
    pub fn storage(&self) -> MutexGuard<'_, SqliteStorage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn workers(&self) -> MutexGuard<'_, WorkerRegistry> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reloads the blacklist file if stale and mirrors the database flags
    pub async fn sync_blacklist(&self) -> Result<(), StorageError> {
        self.blacklist.refresh_or_warn().await;
        let flagged = self.storage().blacklisted_domains()?;
        self.blacklist.replace_pushed(flagged);
        Ok(())
    }
}
