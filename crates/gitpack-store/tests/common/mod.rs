//! Fixture builder writing real git pack and index files.

#![allow(dead_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use gitpack_pack::{ObjectIo, PackHandle, TokioIo};
use gitpack_types::ObjectId;
use sha1::{Digest, Sha1};

pub const COMMIT: u8 = 1;
pub const TREE: u8 = 2;
pub const BLOB: u8 = 3;
pub const TAG: u8 = 4;
pub const OFS_DELTA: u8 = 6;
pub const REF_DELTA: u8 = 7;

/// Git object id of `content` stored as `kind` ("commit", "blob", ...).
pub fn git_id(kind: &str, content: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(format!("{kind} {}\0", content.len()).as_bytes());
    hasher.update(content);
    ObjectId::from_slice(&hasher.finalize()).unwrap()
}

fn type_name(code: u8) -> &'static str {
    match code {
        COMMIT => "commit",
        TREE => "tree",
        BLOB => "blob",
        TAG => "tag",
        _ => panic!("no object name for type {code}"),
    }
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Bytes deflate cannot shrink much.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

pub fn commit_text(n: usize) -> Vec<u8> {
    format!(
        "tree {}\nauthor Dev <dev@example.com> {} +0000\ncommitter Dev <dev@example.com> {} +0000\n\nchange number {n}\n",
        "4b825dc642cb6eb9a060e54bf8d69288fbee4904",
        1_700_000_000 + n,
        1_700_000_000 + n
    )
    .into_bytes()
}

fn size_header(code: u8, mut size: u64) -> Vec<u8> {
    let mut byte = (code << 4) | (size & 0x0f) as u8;
    size >>= 4;
    let mut out = Vec::new();
    while size != 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
    out
}

fn backward_offset(mut distance: u64) -> Vec<u8> {
    let mut out = vec![(distance & 0x7f) as u8];
    distance >>= 7;
    while distance != 0 {
        distance -= 1;
        out.push(0x80 | (distance & 0x7f) as u8);
        distance >>= 7;
    }
    out.reverse();
    out
}

fn size_varint(mut n: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// The two size varints that open a delta.
pub fn delta_header(base_size: u64, result_size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    size_varint(base_size, &mut out);
    size_varint(result_size, &mut out);
    out
}

/// Delta turning `base` into `target`: copy the shared prefix, insert the rest.
pub fn make_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut out = delta_header(base.len() as u64, target.len() as u64);

    let shared = base
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count();
    let mut copied = 0usize;
    while copied < shared {
        let len = (shared - copied).min(0xffff);
        let mut op = 0x80u8;
        let mut args = Vec::new();
        for (i, byte) in (copied as u32).to_le_bytes().iter().enumerate() {
            if *byte != 0 {
                op |= 1 << i;
                args.push(*byte);
            }
        }
        for (i, byte) in (len as u32).to_le_bytes()[..2].iter().enumerate() {
            if *byte != 0 {
                op |= 0x10 << i;
                args.push(*byte);
            }
        }
        out.push(op);
        out.extend_from_slice(&args);
        copied += len;
    }
    for chunk in target[shared..].chunks(127) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdxVersion {
    V1,
    V2,
}

/// One pack file under construction.
pub struct PackBuilder {
    data: Vec<u8>,
    count: u32,
    indexed: Vec<(ObjectId, u64)>,
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackBuilder {
    pub fn new() -> Self {
        let mut data = b"PACK".to_vec();
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        Self {
            data,
            count: 0,
            indexed: Vec::new(),
        }
    }

    /// Offset the next entry will be written at.
    pub fn next_offset(&self) -> u64 {
        self.data.len() as u64
    }

    /// Append an entry with an explicit header. `id` is what the index lists
    /// for it, if anything.
    pub fn raw_entry(
        &mut self,
        id: Option<ObjectId>,
        code: u8,
        declared: u64,
        base: &[u8],
        payload: &[u8],
    ) -> u64 {
        let offset = self.next_offset();
        self.data.extend_from_slice(&size_header(code, declared));
        self.data.extend_from_slice(base);
        self.data.extend_from_slice(&zlib(payload));
        self.count += 1;
        if let Some(id) = id {
            self.indexed.push((id, offset));
        }
        offset
    }

    /// Append a non-delta object and return its id and offset.
    pub fn add_full(&mut self, code: u8, content: &[u8]) -> (ObjectId, u64) {
        self.add_full_with_declared(code, content, content.len() as u64)
    }

    /// Like [`PackBuilder::add_full`], but lie about the inflated size.
    pub fn add_full_with_declared(&mut self, code: u8, content: &[u8], declared: u64) -> (ObjectId, u64) {
        let id = git_id(type_name(code), content);
        let offset = self.raw_entry(Some(id), code, declared, &[], content);
        (id, offset)
    }

    /// Append an OFS_DELTA reconstructing `target` (of kind `code`) from the
    /// entry at `base_offset` holding `base`.
    pub fn add_ofs_delta(&mut self, code: u8, base_offset: u64, base: &[u8], target: &[u8]) -> (ObjectId, u64) {
        let id = git_id(type_name(code), target);
        let delta = make_delta(base, target);
        let distance = self.next_offset() - base_offset;
        let offset = self.raw_entry(Some(id), OFS_DELTA, delta.len() as u64, &backward_offset(distance), &delta);
        (id, offset)
    }

    /// Append a REF_DELTA reconstructing `target` from the object `base_id`.
    pub fn add_ref_delta(&mut self, code: u8, base_id: ObjectId, base: &[u8], target: &[u8]) -> (ObjectId, u64) {
        let id = git_id(type_name(code), target);
        let delta = make_delta(base, target);
        let offset = self.raw_entry(Some(id), REF_DELTA, delta.len() as u64, base_id.as_bytes(), &delta);
        (id, offset)
    }

    /// Append an OFS_DELTA with an arbitrary backward distance.
    pub fn add_raw_ofs_delta(&mut self, id: ObjectId, distance: u64, delta: &[u8]) -> u64 {
        self.raw_entry(Some(id), OFS_DELTA, delta.len() as u64, &backward_offset(distance), delta)
    }

    /// Append a REF_DELTA with an arbitrary base id.
    pub fn add_raw_ref_delta(&mut self, id: ObjectId, base_id: ObjectId, delta: &[u8]) -> u64 {
        self.raw_entry(Some(id), REF_DELTA, delta.len() as u64, base_id.as_bytes(), delta)
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Write `<repo>/objects/pack/<name>.pack` and `<name>.idx`.
    pub fn write(&self, repo: &Path, name: &str, version: IdxVersion) -> PathBuf {
        let dir = pack_dir(repo);
        std::fs::create_dir_all(&dir).unwrap();

        let mut data = self.data.clone();
        data[8..12].copy_from_slice(&self.count.to_be_bytes());
        data.extend_from_slice(&[0u8; 20]);
        std::fs::write(dir.join(format!("{name}.pack")), data).unwrap();

        let idx = match version {
            IdxVersion::V1 => idx_v1(&self.indexed),
            IdxVersion::V2 => idx_v2(&self.indexed),
        };
        let idx_path = dir.join(format!("{name}.idx"));
        std::fs::write(&idx_path, idx).unwrap();
        idx_path
    }
}

pub fn pack_dir(repo: &Path) -> PathBuf {
    repo.join("objects").join("pack")
}

fn sorted(entries: &[(ObjectId, u64)]) -> Vec<(ObjectId, u64)> {
    let mut entries = entries.to_vec();
    entries.sort_by_key(|(id, _)| *id);
    entries
}

fn fanout(entries: &[(ObjectId, u64)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1024);
    for bucket in 0..=255u8 {
        let count = entries.iter().filter(|(id, _)| id.as_bytes()[0] <= bucket).count() as u32;
        out.extend_from_slice(&count.to_be_bytes());
    }
    out
}

pub fn idx_v1(entries: &[(ObjectId, u64)]) -> Vec<u8> {
    let entries = sorted(entries);
    let mut out = fanout(&entries);
    for (id, offset) in &entries {
        out.extend_from_slice(&(*offset as u32).to_be_bytes());
        out.extend_from_slice(id.as_bytes());
    }
    out.extend_from_slice(&[0u8; 40]);
    out
}

pub fn idx_v2(entries: &[(ObjectId, u64)]) -> Vec<u8> {
    let entries = sorted(entries);
    let mut out = vec![0xff, 0x74, 0x4f, 0x63, 0, 0, 0, 2];
    out.extend_from_slice(&fanout(&entries));
    for (id, _) in &entries {
        out.extend_from_slice(id.as_bytes());
    }
    out.extend(std::iter::repeat(0u8).take(entries.len() * 4));
    for (_, offset) in &entries {
        out.extend_from_slice(&(*offset as u32).to_be_bytes());
    }
    out.extend_from_slice(&[0u8; 40]);
    out
}

/// Counts every filesystem operation passing through it.
#[derive(Debug, Default)]
pub struct Counters {
    pub listings: AtomicUsize,
    pub index_reads: AtomicUsize,
    pub pack_opens: AtomicUsize,
    pub pack_reads: AtomicUsize,
}

impl Counters {
    pub fn snapshot(&self) -> [usize; 4] {
        [
            self.listings.load(Ordering::SeqCst),
            self.index_reads.load(Ordering::SeqCst),
            self.pack_opens.load(Ordering::SeqCst),
            self.pack_reads.load(Ordering::SeqCst),
        ]
    }
}

pub struct CountingIo {
    inner: TokioIo,
    pub counts: Arc<Counters>,
}

impl CountingIo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: TokioIo,
            counts: Arc::new(Counters::default()),
        })
    }
}

struct CountingHandle {
    inner: Box<dyn PackHandle>,
    counts: Arc<Counters>,
}

#[async_trait]
impl PackHandle for CountingHandle {
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.counts.pack_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_at(offset, len).await
    }
}

#[async_trait]
impl ObjectIo for CountingIo {
    async fn list_index_files(&self, pack_dir: &Path) -> io::Result<Vec<PathBuf>> {
        self.counts.listings.fetch_add(1, Ordering::SeqCst);
        self.inner.list_index_files(pack_dir).await
    }

    async fn read_index(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.counts.index_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_index(path).await
    }

    async fn open_pack(&self, path: &Path) -> io::Result<Box<dyn PackHandle>> {
        self.counts.pack_opens.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.open_pack(path).await?;
        Ok(Box::new(CountingHandle {
            inner,
            counts: Arc::clone(&self.counts),
        }))
    }
}
