use std::collections::HashMap;

use gitpack_types::{ObjectId, ObjectLocation, OBJECT_ID_LEN};

use crate::error::{PackError, PackResult};

/// Magic prefix of version 2+ index files (`\377tOc`).
pub const IDX_MAGIC: u32 = 0xff74_4f63;

const FANOUT_ENTRIES: usize = 256;
const FANOUT_SIZE: usize = FANOUT_ENTRIES * 4;
const V2_HEADER_SIZE: usize = 8;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Hash to location map merged from every index file of one repository.
pub type IndexMap = HashMap<ObjectId, ObjectLocation>;

/// Parsed pack index (`.idx`).
///
/// Layout, version 2 and later:
/// - `ff 74 4f 63` magic, 4-byte version
/// - Fan-out table: 256 cumulative counts, the last one is the object count
/// - Sorted object ids (20 bytes each)
/// - CRC32 table (4 bytes each, unused here)
/// - 32-bit offsets; high bit set means "index into the 64-bit table"
/// - 64-bit offsets for objects beyond 2 GiB
/// - Pack and index checksums (not read)
///
/// Version 1 has no header: the fan-out table is followed directly by
/// `(4-byte offset, 20-byte id)` pairs.
#[derive(Clone, Debug)]
pub struct PackIndex {
    pub version: u32,
    pub entries: Vec<(ObjectId, u64)>,
}

impl PackIndex {
    /// Parse raw index bytes.
    pub fn from_bytes(data: &[u8]) -> PackResult<Self> {
        let first = read_u32(data, 0, "header")?;
        if first == IDX_MAGIC {
            let version = read_u32(data, 4, "version")?;
            if version < 2 {
                return Err(PackError::UnsupportedIndexVersion(version));
            }
            Self::parse_v2(data, version)
        } else {
            Self::parse_v1(data)
        }
    }

    fn parse_v1(data: &[u8]) -> PackResult<Self> {
        let count = read_fanout(data, 0)?;
        let mut pos = FANOUT_SIZE;
        let needed = table_end(pos, count, 4 + OBJECT_ID_LEN)?;
        if data.len() < needed {
            return Err(PackError::CorruptIndex("v1 entry table truncated".into()));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = read_u32(data, pos, "v1 offset")?;
            let id = read_id(data, pos + 4)?;
            entries.push((id, u64::from(offset)));
            pos += 4 + OBJECT_ID_LEN;
        }

        Ok(Self {
            version: 1,
            entries,
        })
    }

    fn parse_v2(data: &[u8], version: u32) -> PackResult<Self> {
        let count = read_fanout(data, V2_HEADER_SIZE)?;
        let ids_start = V2_HEADER_SIZE + FANOUT_SIZE;
        let crc_start = table_end(ids_start, count, OBJECT_ID_LEN)?;
        let small_start = table_end(crc_start, count, 4)?;
        let large_start = table_end(small_start, count, 4)?;
        if data.len() < large_start {
            return Err(PackError::CorruptIndex("v2 offset table truncated".into()));
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let id = read_id(data, ids_start + i * OBJECT_ID_LEN)?;
            let small = read_u32(data, small_start + i * 4, "v2 offset")?;
            let offset = if small & LARGE_OFFSET_FLAG != 0 {
                let slot = (small & !LARGE_OFFSET_FLAG) as usize;
                let pos = slot
                    .checked_mul(8)
                    .and_then(|rel| rel.checked_add(large_start))
                    .ok_or_else(|| large_offset_error(slot))?;
                read_u64(data, pos).map_err(|_| large_offset_error(slot))?
            } else {
                u64::from(small)
            };
            entries.push((id, offset));
        }

        Ok(Self {
            version,
            entries,
        })
    }

    /// Total object count.
    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    /// Insert every entry into `map` as belonging to pack `pack`.
    ///
    /// Existing keys are left untouched, so when several packs carry the
    /// same object the lowest pack index wins. Returns the number of
    /// entries actually inserted.
    pub fn merge_into(&self, pack: u32, map: &mut IndexMap) -> usize {
        let mut inserted = 0;
        for (id, offset) in &self.entries {
            map.entry(*id).or_insert_with(|| {
                inserted += 1;
                ObjectLocation::new(pack, *offset)
            });
        }
        inserted
    }
}

fn large_offset_error(slot: usize) -> PackError {
    PackError::CorruptIndex(format!("64-bit offset slot {slot} out of bounds"))
}

/// Byte position just past a table of `count` records of `width` bytes.
fn table_end(start: usize, count: usize, width: usize) -> PackResult<usize> {
    count
        .checked_mul(width)
        .and_then(|len| len.checked_add(start))
        .ok_or_else(|| PackError::CorruptIndex(format!("object count {count} overflows")))
}

/// Read the fan-out table at `start`, check it is monotonic and return its
/// final (total) entry.
fn read_fanout(data: &[u8], start: usize) -> PackResult<usize> {
    if data.len() < start + FANOUT_SIZE {
        return Err(PackError::CorruptIndex("fan-out table truncated".into()));
    }
    let mut previous = 0u32;
    for slot in 0..FANOUT_ENTRIES {
        let count = read_u32(data, start + slot * 4, "fan-out")?;
        if count < previous {
            return Err(PackError::CorruptIndex(format!(
                "fan-out not monotonic at slot {slot}"
            )));
        }
        previous = count;
    }
    Ok(previous as usize)
}

fn read_u32(data: &[u8], pos: usize, what: &str) -> PackResult<u32> {
    data.get(pos..pos + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| PackError::CorruptIndex(format!("{what} truncated at byte {pos}")))
}

fn read_u64(data: &[u8], pos: usize) -> PackResult<u64> {
    data.get(pos..pos + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| PackError::CorruptIndex(format!("64-bit offset truncated at byte {pos}")))
}

fn read_id(data: &[u8], pos: usize) -> PackResult<ObjectId> {
    data.get(pos..pos + OBJECT_ID_LEN)
        .and_then(|b| ObjectId::from_slice(b).ok())
        .ok_or_else(|| PackError::CorruptIndex(format!("object id truncated at byte {pos}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(first: u8, fill: u8) -> ObjectId {
        let mut bytes = [fill; OBJECT_ID_LEN];
        bytes[0] = first;
        ObjectId::from_hash(bytes)
    }

    fn fanout(ids: &[ObjectId]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FANOUT_SIZE);
        for slot in 0..FANOUT_ENTRIES {
            let count = ids
                .iter()
                .filter(|id| (id.as_bytes()[0] as usize) <= slot)
                .count() as u32;
            buf.extend_from_slice(&count.to_be_bytes());
        }
        buf
    }

    fn v2_bytes(entries: &[(ObjectId, u64)]) -> Vec<u8> {
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|(id, _)| *id);
        let ids: Vec<ObjectId> = sorted.iter().map(|(id, _)| *id).collect();

        let mut buf = Vec::new();
        buf.extend_from_slice(&IDX_MAGIC.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&fanout(&ids));
        for id in &ids {
            buf.extend_from_slice(id.as_bytes());
        }
        for _ in &ids {
            buf.extend_from_slice(&0u32.to_be_bytes());
        }
        let mut large = Vec::new();
        for (_, offset) in &sorted {
            if *offset >= u64::from(LARGE_OFFSET_FLAG) {
                let slot = (large.len() as u32) | LARGE_OFFSET_FLAG;
                buf.extend_from_slice(&slot.to_be_bytes());
                large.push(*offset);
            } else {
                buf.extend_from_slice(&(*offset as u32).to_be_bytes());
            }
        }
        for offset in large {
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        buf.extend_from_slice(&[0u8; 40]);
        buf
    }

    fn v1_bytes(entries: &[(ObjectId, u32)]) -> Vec<u8> {
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|(id, _)| *id);
        let ids: Vec<ObjectId> = sorted.iter().map(|(id, _)| *id).collect();
        let mut buf = fanout(&ids);
        for (id, offset) in &sorted {
            buf.extend_from_slice(&offset.to_be_bytes());
            buf.extend_from_slice(id.as_bytes());
        }
        buf.extend_from_slice(&[0u8; 40]);
        buf
    }

    #[test]
    fn parse_v2_small_offsets() {
        let entries = vec![(id(0x10, 1), 12), (id(0xa0, 2), 345), (id(0x10, 3), 99)];
        let idx = PackIndex::from_bytes(&v2_bytes(&entries)).unwrap();
        assert_eq!(idx.version, 2);
        assert_eq!(idx.object_count(), 3);

        let mut map = IndexMap::new();
        assert_eq!(idx.merge_into(4, &mut map), 3);
        assert_eq!(map[&id(0xa0, 2)], ObjectLocation::new(4, 345));
        assert_eq!(map[&id(0x10, 3)], ObjectLocation::new(4, 99));
    }

    #[test]
    fn parse_v2_large_offsets() {
        let big = 0x1_2345_6789u64;
        let bigger = 0x7_0000_0000u64;
        let entries = vec![(id(1, 1), 12), (id(2, 2), big), (id(3, 3), bigger)];
        let idx = PackIndex::from_bytes(&v2_bytes(&entries)).unwrap();

        let mut map = IndexMap::new();
        idx.merge_into(0, &mut map);
        assert_eq!(map[&id(1, 1)].offset, 12);
        assert_eq!(map[&id(2, 2)].offset, big);
        assert_eq!(map[&id(3, 3)].offset, bigger);
    }

    #[test]
    fn parse_v2_large_offset_slot_out_of_bounds() {
        let mut data = v2_bytes(&[(id(1, 1), 12)]);
        data.truncate(data.len() - 40);
        let small_start = V2_HEADER_SIZE + FANOUT_SIZE + OBJECT_ID_LEN + 4;
        data[small_start..small_start + 4].copy_from_slice(&(LARGE_OFFSET_FLAG | 5).to_be_bytes());
        let err = PackIndex::from_bytes(&data).unwrap_err();
        assert!(matches!(err, PackError::CorruptIndex(msg) if msg.contains("slot 5")));
    }

    #[test]
    fn parse_v1() {
        let entries = vec![(id(0xff, 9), 4000u32), (id(0x00, 1), 12)];
        let idx = PackIndex::from_bytes(&v1_bytes(&entries)).unwrap();
        assert_eq!(idx.version, 1);

        let mut map = IndexMap::new();
        idx.merge_into(1, &mut map);
        assert_eq!(map[&id(0xff, 9)], ObjectLocation::new(1, 4000));
        assert_eq!(map[&id(0x00, 1)], ObjectLocation::new(1, 12));
    }

    #[test]
    fn parse_empty_v2() {
        let idx = PackIndex::from_bytes(&v2_bytes(&[])).unwrap();
        assert_eq!(idx.object_count(), 0);
    }

    #[test]
    fn merge_keeps_first_writer() {
        let shared = id(7, 7);
        let a = PackIndex::from_bytes(&v2_bytes(&[(shared, 100)])).unwrap();
        let b = PackIndex::from_bytes(&v2_bytes(&[(shared, 200), (id(8, 8), 300)])).unwrap();

        let mut map = IndexMap::new();
        assert_eq!(a.merge_into(0, &mut map), 1);
        assert_eq!(b.merge_into(1, &mut map), 1);
        assert_eq!(map[&shared], ObjectLocation::new(0, 100));
        assert_eq!(map[&id(8, 8)], ObjectLocation::new(1, 300));
    }

    #[test]
    fn versions_below_two_after_magic_are_rejected() {
        for version in [0u32, 1] {
            let mut data = Vec::new();
            data.extend_from_slice(&IDX_MAGIC.to_be_bytes());
            data.extend_from_slice(&version.to_be_bytes());
            let err = PackIndex::from_bytes(&data).unwrap_err();
            assert!(matches!(err, PackError::UnsupportedIndexVersion(v) if v == version));
        }
    }

    #[test]
    fn later_versions_use_the_v2_layout() {
        let mut data = v2_bytes(&[(id(0x42, 7), 512)]);
        data[4..8].copy_from_slice(&3u32.to_be_bytes());
        let idx = PackIndex::from_bytes(&data).unwrap();
        assert_eq!(idx.version, 3);
        let mut map = IndexMap::new();
        idx.merge_into(0, &mut map);
        assert_eq!(map[&id(0x42, 7)], ObjectLocation::new(0, 512));
    }

    #[test]
    fn truncated_fanout() {
        let err = PackIndex::from_bytes(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, PackError::CorruptIndex(_)));
    }

    #[test]
    fn truncated_offsets() {
        let mut data = v2_bytes(&[(id(1, 1), 12), (id(2, 2), 40)]);
        let cut = V2_HEADER_SIZE + FANOUT_SIZE + 2 * OBJECT_ID_LEN + 8 + 2;
        data.truncate(cut);
        let err = PackIndex::from_bytes(&data).unwrap_err();
        assert!(matches!(err, PackError::CorruptIndex(_)));
    }

    #[test]
    fn non_monotonic_fanout() {
        let mut data = v2_bytes(&[(id(1, 1), 12)]);
        // slot 0 claims more objects than slot 1
        data[V2_HEADER_SIZE..V2_HEADER_SIZE + 4].copy_from_slice(&5u32.to_be_bytes());
        let err = PackIndex::from_bytes(&data).unwrap_err();
        assert!(matches!(err, PackError::CorruptIndex(msg) if msg.contains("monotonic")));
    }

    #[test]
    fn too_short_for_header() {
        let err = PackIndex::from_bytes(&[0xff, 0x74]).unwrap_err();
        assert!(matches!(err, PackError::CorruptIndex(_)));
    }
}
