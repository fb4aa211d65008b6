//! Filesystem access behind a single capability trait.
//!
//! Resolution and store building are written once against [`ObjectIo`].
//! [`TokioIo`] performs real non-blocking I/O; [`StdIo`] performs blocking
//! I/O inside `async fn`s that never suspend, so a future built on it can be
//! driven to completion by a trivial executor.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Extension of pack index files.
pub const INDEX_EXTENSION: &str = "idx";
/// Extension of pack data files.
pub const PACK_EXTENSION: &str = "pack";

/// An open pack file. Dropping the handle closes the file.
#[async_trait]
pub trait PackHandle: Send {
    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Returns fewer than `len` bytes only when the file ends first.
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>>;
}

/// Read-only filesystem operations used by the store.
#[async_trait]
pub trait ObjectIo: Send + Sync {
    /// List the `*.idx` files directly inside `pack_dir`, sorted by name.
    async fn list_index_files(&self, pack_dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Read a whole index file.
    async fn read_index(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Open a pack file for positional reads.
    async fn open_pack(&self, path: &Path) -> io::Result<Box<dyn PackHandle>>;
}

fn is_index_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == INDEX_EXTENSION)
}

/// Non-blocking I/O on the tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioIo;

struct TokioPackHandle {
    file: tokio::fs::File,
}

#[async_trait]
impl PackHandle for TokioPackHandle {
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::new();
        (&mut self.file).take(len as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

#[async_trait]
impl ObjectIo for TokioIo {
    async fn list_index_files(&self, pack_dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut dir = tokio::fs::read_dir(pack_dir).await?;
        let mut found = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if is_index_file(&path) && entry.file_type().await?.is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    async fn read_index(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn open_pack(&self, path: &Path) -> io::Result<Box<dyn PackHandle>> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(TokioPackHandle { file }))
    }
}

/// Blocking I/O through `std::fs`. Its futures complete on first poll.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdIo;

struct StdPackHandle {
    file: std::fs::File,
}

#[async_trait]
impl PackHandle for StdPackHandle {
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        use std::io::{Read, Seek};

        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        (&mut self.file).take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

#[async_trait]
impl ObjectIo for StdIo {
    async fn list_index_files(&self, pack_dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(pack_dir)? {
            let entry = entry?;
            let path = entry.path();
            if is_index_file(&path) && entry.file_type()?.is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    async fn read_index(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    async fn open_pack(&self, path: &Path) -> io::Result<Box<dyn PackHandle>> {
        let file = std::fs::File::open(path)?;
        Ok(Box::new(StdPackHandle { file }))
    }
}
