use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use gitpack_pack::{IndexMap, ObjectIo, PackIndex, StdIo, PACK_EXTENSION};
use gitpack_types::{ObjectId, ObjectLocation};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// Read-only view of one repository's `objects/pack/` directory.
///
/// The index map and the pack list are fixed at construction. Resolved
/// objects are memoized per `(pack, offset)` for the lifetime of the store
/// and never overwritten.
pub struct PackStore {
    dir: PathBuf,
    pack_dir: PathBuf,
    packs: Vec<String>,
    index: IndexMap,
    decoded: Mutex<HashMap<ObjectLocation, Bytes>>,
    pub(crate) io: Arc<dyn ObjectIo>,
    pub(crate) config: StoreConfig,
}

impl PackStore {
    /// Load every index file under `dir/objects/pack` through `io`.
    ///
    /// A missing or unreadable pack directory, or one without index files,
    /// produces an empty store rather than an error.
    pub async fn load(io: Arc<dyn ObjectIo>, dir: &Path, config: StoreConfig) -> StoreResult<Self> {
        let reader = Arc::clone(&io);
        Self::load_via(reader.as_ref(), io, dir, config).await
    }

    /// Blocking counterpart of [`PackStore::load`]; index files are read
    /// with `std::fs` while the store keeps `io` for suspending lookups.
    pub fn load_blocking(io: Arc<dyn ObjectIo>, dir: &Path, config: StoreConfig) -> StoreResult<Self> {
        futures::executor::block_on(Self::load_via(&StdIo, io, dir, config))
    }

    async fn load_via(
        reader: &dyn ObjectIo,
        io: Arc<dyn ObjectIo>,
        dir: &Path,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        let pack_dir = pack_dir_of(dir);
        let listed = match reader.list_index_files(&pack_dir).await {
            Ok(listed) => listed,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(dir = %dir.display(), "no pack directory");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(dir = %pack_dir.display(), error = %e, "pack directory unreadable");
                Vec::new()
            }
        };

        let mut index = IndexMap::new();
        let mut packs = Vec::with_capacity(listed.len());
        for (position, path) in listed.iter().enumerate() {
            let data = reader.read_index(path).await.map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let parsed = PackIndex::from_bytes(&data).map_err(|source| StoreError::Index {
                path: path.clone(),
                source,
            })?;
            let pack = u32::try_from(position)
                .map_err(|_| StoreError::Config("more than u32::MAX pack files".into()))?;
            let inserted = parsed.merge_into(pack, &mut index);
            tracing::trace!(
                path = %path.display(),
                version = parsed.version,
                objects = parsed.object_count(),
                inserted,
                "parsed pack index"
            );
            packs.push(base_name(path));
        }

        tracing::debug!(
            dir = %dir.display(),
            packs = packs.len(),
            objects = index.len(),
            "loaded pack store"
        );
        Ok(Self::from_parts(dir.to_path_buf(), packs, index, io, config))
    }

    /// Assemble a store from an already merged index.
    pub fn from_parts(
        dir: PathBuf,
        packs: Vec<String>,
        index: IndexMap,
        io: Arc<dyn ObjectIo>,
        config: StoreConfig,
    ) -> Self {
        Self {
            pack_dir: pack_dir_of(&dir),
            dir,
            packs,
            index,
            decoded: Mutex::new(HashMap::new()),
            io,
            config,
        }
    }

    /// Resolve an object to its fully reconstructed bytes.
    pub async fn resolve(&self, id: &ObjectId) -> StoreResult<Bytes> {
        self.resolve_with(self.io.as_ref(), id).await
    }

    /// Blocking counterpart of [`PackStore::resolve`], reading packs with
    /// `std::fs` rather than the store's `io`. Both paths share the decoded
    /// cache. Intended for callers outside an async context.
    pub fn resolve_blocking(&self, id: &ObjectId) -> StoreResult<Bytes> {
        futures::executor::block_on(self.resolve_with(&StdIo, id))
    }

    /// Parse a 40-character hex hash and resolve it.
    pub async fn resolve_hex(&self, hex: &str) -> StoreResult<Bytes> {
        let id = parse_hash(hex)?;
        self.resolve(&id).await
    }

    /// Blocking counterpart of [`PackStore::resolve_hex`].
    pub fn resolve_hex_blocking(&self, hex: &str) -> StoreResult<Bytes> {
        let id = parse_hash(hex)?;
        self.resolve_blocking(&id)
    }

    /// Repository directory this store was built for.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `false` when the repository has no index files at all.
    pub fn has_pack_files(&self) -> bool {
        !self.packs.is_empty()
    }

    /// Pack base names; a name's position is its pack number.
    pub fn pack_names(&self) -> &[String] {
        &self.packs
    }

    /// Number of distinct objects across all indexes.
    pub fn object_count(&self) -> usize {
        self.index.len()
    }

    /// Check whether an object is indexed.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains_key(id)
    }

    /// Where an object lives, if indexed.
    pub fn location(&self, id: &ObjectId) -> Option<ObjectLocation> {
        self.index.get(id).copied()
    }

    /// All indexed ids with their locations, sorted by id.
    pub fn objects(&self) -> Vec<(ObjectId, ObjectLocation)> {
        let mut all: Vec<_> = self.index.iter().map(|(id, loc)| (*id, *loc)).collect();
        all.sort();
        all
    }

    /// Number of fully resolved objects held in memory.
    pub fn cached_objects(&self) -> usize {
        self.decoded.lock().expect("lock poisoned").len()
    }

    pub(crate) fn cached(&self, location: ObjectLocation) -> Option<Bytes> {
        self.decoded
            .lock()
            .expect("lock poisoned")
            .get(&location)
            .cloned()
    }

    /// Record a resolved object. The first value stored for a location wins
    /// and is the one returned.
    pub(crate) fn remember(&self, location: ObjectLocation, bytes: Bytes) -> Bytes {
        self.decoded
            .lock()
            .expect("lock poisoned")
            .entry(location)
            .or_insert(bytes)
            .clone()
    }

    pub(crate) fn pack_path(&self, location: ObjectLocation) -> StoreResult<PathBuf> {
        let name = self
            .packs
            .get(location.pack as usize)
            .ok_or_else(|| StoreError::CorruptPack {
                location,
                reason: format!("no pack file numbered {}", location.pack),
            })?;
        Ok(self.pack_dir.join(format!("{name}.{PACK_EXTENSION}")))
    }
}

impl std::fmt::Debug for PackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackStore")
            .field("dir", &self.dir)
            .field("packs", &self.packs.len())
            .field("objects", &self.index.len())
            .field("cached", &self.cached_objects())
            .finish()
    }
}

fn pack_dir_of(dir: &Path) -> PathBuf {
    dir.join("objects").join("pack")
}

/// `pack-<hash>` for `…/pack-<hash>.idx`.
fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parse_hash(hex: &str) -> StoreResult<ObjectId> {
    ObjectId::from_hex(hex).map_err(|source| StoreError::InvalidHash {
        input: hex.to_string(),
        source,
    })
}
