use crate::error::{StorageError, StorageResult};
use crate::file;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::Mutex as AsyncMutex;
use tagbridge_core::constants::DEFAULT_ALIAS_FILE;
use tagbridge_core::{AliasLookup, AliasTable, Identifier};
use tracing::{debug, error, info};

/// Alias store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path to the JSON alias file
    pub path: PathBuf,

    /// Whether to write an empty table when the file doesn't exist
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_ALIAS_FILE),
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    /// Create a new store configuration with the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set whether to create the file if it doesn't exist
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

type ChangeListener = Arc<dyn Fn(&AliasTable) + Send + Sync>;

/// Owner of the identifier → alias table.
///
/// Reads are served from memory and never wait on disk. Mutations are
/// serialized by an async write gate: each one builds the next table on a
/// copy, writes that copy to disk, and only then installs it. A failed write
/// therefore leaves every key at its previous value.
///
/// The write, the install and the change notification run together on the
/// blocking pool while holding the gate, so a caller that stops waiting
/// cannot leave the file ahead of memory.
///
/// # Example
///
/// ```no_run
/// use tagbridge_storage::{AliasStore, StoreConfig};
/// use tagbridge_core::Identifier;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = AliasStore::open(StoreConfig::new("aliases.json"))?;
///
/// store.on_change(|table| println!("{} aliases", table.len()));
/// store.assign(Identifier::new("04ABCDEF")?, "Front door").await?;
///
/// assert_eq!(store.get(&Identifier::new("04ABCDEF")?).as_deref(), Some("Front door"));
/// # Ok(())
/// # }
/// ```
pub struct AliasStore {
    path: PathBuf,
    state: Arc<SharedState>,
    write_gate: Arc<AsyncMutex<()>>,
}

struct SharedState {
    table: RwLock<AliasTable>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl SharedState {
    /// Write `next` to `path`, then install it and notify listeners.
    fn persist(&self, operation: &'static str, path: &Path, next: AliasTable) -> StorageResult<()> {
        if let Err(e) = file::write_atomic(path, &next) {
            error!(
                operation,
                path = %path.display(),
                error = %e,
                "Failed to persist alias table, change discarded"
            );
            return Err(e);
        }

        *self.table.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        info!(operation, aliases = next.len(), "Alias table saved");

        let listeners: Vec<ChangeListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(&next);
        }
        Ok(())
    }
}

impl std::fmt::Debug for AliasStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasStore")
            .field("path", &self.path)
            .field("aliases", &self.read_table().len())
            .finish_non_exhaustive()
    }
}

impl AliasStore {
    /// Load the table from disk, creating the file if configured to.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be read or written.
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!("Failed to create alias directory: {}", e))
            })?;
        }

        let table = file::load(&config.path, config.create_if_missing)?;
        info!(
            path = %config.path.display(),
            aliases = table.len(),
            "Alias table loaded"
        );

        Ok(Self {
            path: config.path,
            state: Arc::new(SharedState {
                table: RwLock::new(table),
                listeners: Mutex::new(Vec::new()),
            }),
            write_gate: Arc::new(AsyncMutex::new(())),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current alias for `identifier`.
    pub fn get(&self, identifier: &Identifier) -> Option<String> {
        self.read_table().get(identifier).cloned()
    }

    /// Copy of the whole table.
    pub fn snapshot(&self) -> AliasTable {
        self.read_table().clone()
    }

    /// Number of named identifiers.
    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }

    /// Register a listener called with the new table after every successful
    /// mutation. Batches notify once.
    pub fn on_change(&self, listener: impl Fn(&AliasTable) + Send + Sync + 'static) {
        self.state
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Insert or overwrite one alias.
    ///
    /// # Errors
    ///
    /// Returns an error if the table could not be persisted; the previous
    /// alias (or its absence) is kept.
    pub async fn assign(&self, identifier: Identifier, name: impl Into<String>) -> StorageResult<()> {
        let name = name.into();
        self.commit("assign", move |table| {
            debug!(identifier = %identifier, name = %name, "Assigning alias");
            table.insert(identifier, name);
            (true, ())
        })
        .await
    }

    /// Give every identifier in `identifiers` the same alias, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the table could not be persisted; none of the
    /// identifiers are changed.
    pub async fn assign_batch(
        &self,
        identifiers: impl IntoIterator<Item = Identifier>,
        name: impl Into<String>,
    ) -> StorageResult<()> {
        let identifiers: Vec<Identifier> = identifiers.into_iter().collect();
        let name = name.into();
        self.commit("assign_batch", move |table| {
            debug!(count = identifiers.len(), name = %name, "Assigning alias batch");
            for identifier in identifiers {
                table.insert(identifier, name.clone());
            }
            (true, ())
        })
        .await
    }

    /// Remove one alias. Returns whether the table changed.
    ///
    /// Removing an unknown identifier writes nothing and notifies nobody.
    ///
    /// # Errors
    ///
    /// Returns an error if the table could not be persisted; the alias is kept.
    pub async fn remove(&self, identifier: &Identifier) -> StorageResult<bool> {
        self.commit("remove", |table| {
            let changed = table.remove(identifier).is_some();
            (changed, changed)
        })
        .await
    }

    /// Remove several aliases. Returns whether at least one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table could not be persisted; all aliases are kept.
    pub async fn remove_batch(
        &self,
        identifiers: impl IntoIterator<Item = Identifier>,
    ) -> StorageResult<bool> {
        let identifiers: Vec<Identifier> = identifiers.into_iter().collect();
        self.commit("remove_batch", move |table| {
            let mut changed = false;
            for identifier in &identifiers {
                changed |= table.remove(identifier).is_some();
            }
            (changed, changed)
        })
        .await
    }

    /// Apply `mutate` to a copy of the table, persist it and install it.
    ///
    /// `mutate` reports whether it changed anything; unchanged tables are
    /// neither written nor announced.
    async fn commit<T>(
        &self,
        operation: &'static str,
        mutate: impl FnOnce(&mut AliasTable) -> (bool, T),
    ) -> StorageResult<T> {
        let gate = self.write_gate.clone().lock_owned().await;

        let mut next = self.snapshot();
        let (changed, output) = mutate(&mut next);
        if !changed {
            debug!(operation, "No alias changed, skipping write");
            return Ok(output);
        }

        let path = self.path.clone();
        let state = self.state.clone();
        tokio::task::spawn_blocking(move || {
            let _gate = gate;
            state.persist(operation, &path, next)
        })
        .await
        .map_err(|e| StorageError::Internal(format!("persistence task failed: {}", e)))??;

        Ok(output)
    }

    fn read_table(&self) -> RwLockReadGuard<'_, AliasTable> {
        self.state.table.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AliasLookup for AliasStore {
    fn lookup(&self, identifier: &Identifier) -> Option<String> {
        self.get(identifier)
    }
}
