//! Object resolution: header dispatch, payload inflation and delta patching.
//!
//! Delta chains resolve depth-first. A delta's base is fully reconstructed
//! (and cached) before the delta's own payload is inflated, and at most one
//! pack handle is open at a time along the chain.

use std::path::Path;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use gitpack_delta::apply_delta;
use gitpack_pack::{inflate_at, DeltaBase, EntryHeader, ObjectIo, PackError, PackHandle};
use gitpack_types::{ObjectId, ObjectKind, ObjectLocation};

use crate::error::{StoreError, StoreResult};
use crate::store::PackStore;

impl PackStore {
    pub(crate) async fn resolve_with(&self, io: &dyn ObjectIo, id: &ObjectId) -> StoreResult<Bytes> {
        let location = self.location(id).ok_or(StoreError::NotFound(*id))?;
        self.resolve_at(io, location, 0).await
    }

    /// Resolve the entry at `location`. `depth` counts the delta links
    /// already followed to get here.
    fn resolve_at<'a>(
        &'a self,
        io: &'a dyn ObjectIo,
        location: ObjectLocation,
        depth: usize,
    ) -> BoxFuture<'a, StoreResult<Bytes>> {
        async move {
            if let Some(hit) = self.cached(location) {
                tracing::debug!(%location, "decoded object cache hit");
                return Ok(hit);
            }
            let limit = self.config.max_delta_depth;
            if depth > limit {
                return Err(StoreError::DeltaChainTooDeep { location, limit });
            }

            let path = self.pack_path(location)?;
            let mut handle = open_pack(io, &path).await?;
            let lookahead = handle
                .read_at(location.offset, self.config.lookahead)
                .await
                .map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
            let header = decode_header(&lookahead, location)?;

            let bytes = match (header.kind, header.base) {
                (ObjectKind::Commit | ObjectKind::Tag, _) => {
                    self.inflate(handle.as_mut(), &path, &header).await?
                }
                (ObjectKind::Tree | ObjectKind::Blob, _) if self.config.decode_trees_and_blobs => {
                    self.inflate(handle.as_mut(), &path, &header).await?
                }
                (ObjectKind::Tree | ObjectKind::Blob, _) => {
                    return Err(StoreError::InvalidObjectType {
                        code: header.kind.code(),
                        location,
                    });
                }
                (_, Some(base)) => {
                    drop(handle);
                    let base_location = self.base_location(location, base)?;
                    let base_bytes = self.resolve_at(io, base_location, depth + 1).await?;

                    let mut handle = open_pack(io, &path).await?;
                    let delta = self.inflate(handle.as_mut(), &path, &header).await?;
                    drop(handle);
                    apply_delta(&base_bytes, &delta)
                        .map_err(|source| StoreError::Delta { location, source })?
                }
                (_, None) => {
                    return Err(StoreError::CorruptPack {
                        location,
                        reason: format!("{} entry without a base reference", header.kind),
                    });
                }
            };

            tracing::trace!(%location, kind = %header.kind, len = bytes.len(), depth, "resolved entry");
            Ok(self.remember(location, Bytes::from(bytes)))
        }
        .boxed()
    }

    /// Where a delta's base entry lives. Backward distances stay within the
    /// delta's own pack; base ids go through the merged index.
    fn base_location(&self, location: ObjectLocation, base: DeltaBase) -> StoreResult<ObjectLocation> {
        match base {
            DeltaBase::Backward(distance) => {
                if distance == 0 || distance > location.offset {
                    return Err(StoreError::CorruptPack {
                        location,
                        reason: format!("OFS_DELTA distance {distance} does not point before the entry"),
                    });
                }
                Ok(ObjectLocation::new(location.pack, location.offset - distance))
            }
            DeltaBase::Id(id) => self.location(&id).ok_or(StoreError::NotFound(id)),
        }
    }

    async fn inflate(
        &self,
        handle: &mut dyn PackHandle,
        path: &Path,
        header: &EntryHeader,
    ) -> StoreResult<Vec<u8>> {
        inflate_at(
            handle,
            header.payload_offset,
            header.declared_size,
            self.config.inflate_growth,
        )
        .await
        .map_err(|e| match e {
            PackError::Io(source) => StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => StoreError::Pack(other),
        })
    }
}

async fn open_pack(io: &dyn ObjectIo, path: &Path) -> StoreResult<Box<dyn PackHandle>> {
    io.open_pack(path).await.map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_header(lookahead: &[u8], location: ObjectLocation) -> StoreResult<EntryHeader> {
    EntryHeader::decode(lookahead, location.offset).map_err(|e| match e {
        PackError::InvalidObjectType { code, .. } => StoreError::InvalidObjectType { code, location },
        other => StoreError::Pack(other),
    })
}
