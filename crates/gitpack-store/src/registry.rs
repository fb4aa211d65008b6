//! Bounded registry of per-repository pack stores.
//!
//! Stores are cached in an LRU keyed by the repository directory as given.
//! Concurrent first-time suspending initializations of the same directory
//! share one build; the in-flight entry is removed once that build finishes,
//! whether it succeeded or not.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use gitpack_pack::{ObjectIo, TokioIo};
use lru::LruCache;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::PackStore;

type BuildResult = Result<Arc<PackStore>, Arc<StoreError>>;
type SharedBuild = Shared<BoxFuture<'static, BuildResult>>;

struct RegistryState {
    stores: Mutex<LruCache<PathBuf, Arc<PackStore>>>,
    in_flight: Mutex<HashMap<PathBuf, SharedBuild>>,
}

impl RegistryState {
    /// Look up a cached store, marking it most recently used.
    fn cached(&self, dir: &Path) -> Option<Arc<PackStore>> {
        self.stores
            .lock()
            .expect("lock poisoned")
            .get(dir)
            .map(Arc::clone)
    }

    /// Insert a freshly built store unless one is already cached for `dir`,
    /// in which case the cached store is kept and returned.
    fn insert(&self, dir: &Path, store: Arc<PackStore>) -> Arc<PackStore> {
        let mut stores = self.stores.lock().expect("lock poisoned");
        if let Some(existing) = stores.get(dir) {
            return Arc::clone(existing);
        }
        if let Some((evicted, _)) = stores.push(dir.to_path_buf(), Arc::clone(&store)) {
            tracing::debug!(dir = %evicted.display(), "evicted pack store");
        }
        store
    }
}

/// Caller-owned cache of [`PackStore`]s, one per repository directory.
///
/// ```no_run
/// # async fn run() -> gitpack_store::StoreResult<()> {
/// use gitpack_store::{StoreConfig, StoreRegistry};
///
/// let registry = StoreRegistry::new(StoreConfig::default())?;
/// let store = registry.initialize("repo/.git".as_ref()).await?;
/// let commit = store
///     .resolve_hex("2ff1a0a3d1b2e9e0b5f8c1e6a7d4c3b2a1f0e9d8")
///     .await?;
/// # let _ = commit;
/// # Ok(())
/// # }
/// ```
pub struct StoreRegistry {
    state: Arc<RegistryState>,
    io: Arc<dyn ObjectIo>,
    config: StoreConfig,
}

impl StoreRegistry {
    /// Registry reading repositories through tokio's filesystem API.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        Self::with_io(Arc::new(TokioIo), config)
    }

    /// Registry whose suspending operations go through `io`.
    pub fn with_io(io: Arc<dyn ObjectIo>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.registry_capacity)
            .ok_or_else(|| StoreError::Config("registry_capacity must be at least 1".into()))?;
        Ok(Self {
            state: Arc::new(RegistryState {
                stores: Mutex::new(LruCache::new(capacity)),
                in_flight: Mutex::new(HashMap::new()),
            }),
            io,
            config,
        })
    }

    /// Return the store for `dir`, building it on first use.
    ///
    /// Concurrent calls for a directory that is not cached yet wait on a
    /// single build and all receive its result.
    pub async fn initialize(&self, dir: &Path) -> StoreResult<Arc<PackStore>> {
        if let Some(store) = self.state.cached(dir) {
            tracing::debug!(dir = %dir.display(), "pack store cache hit");
            return Ok(store);
        }

        let build = {
            let mut in_flight = self.state.in_flight.lock().expect("lock poisoned");
            // A build may have finished between the first check and taking the lock.
            if let Some(store) = self.state.cached(dir) {
                return Ok(store);
            }
            in_flight
                .entry(dir.to_path_buf())
                .or_insert_with(|| self.start_build(dir))
                .clone()
        };
        build.await.map_err(StoreError::from_shared)
    }

    /// Blocking counterpart of [`StoreRegistry::initialize`].
    ///
    /// Shares the LRU with suspending callers but not their in-flight
    /// builds; if both build the same directory, the first store cached wins.
    pub fn initialize_blocking(&self, dir: &Path) -> StoreResult<Arc<PackStore>> {
        if let Some(store) = self.state.cached(dir) {
            tracing::debug!(dir = %dir.display(), "pack store cache hit");
            return Ok(store);
        }
        tracing::debug!(dir = %dir.display(), "building pack store (blocking)");
        let store = PackStore::load_blocking(Arc::clone(&self.io), dir, self.config.clone())?;
        Ok(self.state.insert(dir, Arc::new(store)))
    }

    fn start_build(&self, dir: &Path) -> SharedBuild {
        let state = Arc::clone(&self.state);
        let io = Arc::clone(&self.io);
        let config = self.config.clone();
        let dir = dir.to_path_buf();
        tracing::debug!(dir = %dir.display(), "building pack store");

        async move {
            let result = match PackStore::load(io, &dir, config).await {
                Ok(store) => Ok(state.insert(&dir, Arc::new(store))),
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "pack store build failed");
                    Err(Arc::new(e))
                }
            };
            state.in_flight.lock().expect("lock poisoned").remove(&dir);
            result
        }
        .boxed()
        .shared()
    }

    /// Configuration every store built by this registry uses.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of cached stores.
    pub fn len(&self) -> usize {
        self.state.stores.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached stores.
    pub fn capacity(&self) -> usize {
        self.state.stores.lock().expect("lock poisoned").cap().get()
    }

    /// Check whether a store for `dir` is cached, without promoting it.
    pub fn contains(&self, dir: &Path) -> bool {
        self.state.stores.lock().expect("lock poisoned").contains(dir)
    }

    /// Number of builds currently in progress.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.lock().expect("lock poisoned").len()
    }

    /// Drop every cached store. Handles already returned stay usable.
    pub fn clear(&self) {
        let mut stores = self.state.stores.lock().expect("lock poisoned");
        tracing::debug!(stores = stores.len(), "clearing pack store registry");
        stores.clear();
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.len())
            .field("in_flight", &self.in_flight())
            .field("config", &self.config)
            .finish()
    }
}
