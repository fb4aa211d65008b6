use gitpack_delta::decode_backward_offset;
use gitpack_types::{ObjectId, ObjectKind, OBJECT_ID_LEN};

use crate::error::{PackError, PackResult};

/// Bytes read at an entry offset before decoding its header.
///
/// Large enough for a maximal size varint plus either a 10-byte backward
/// offset or a 20-byte base id.
pub const DEFAULT_LOOKAHEAD: usize = 32;

/// Base reference stored right after a delta entry's header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaBase {
    /// OFS_DELTA: distance back from the delta entry to its base entry.
    Backward(u64),
    /// REF_DELTA: object id of the base.
    Id(ObjectId),
}

/// Decoded header of one pack entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: ObjectKind,
    /// Inflated size recorded in the header. For deltas this is the size of
    /// the delta instruction stream, not of the final object.
    pub declared_size: u64,
    /// Absolute pack offset where the zlib stream begins.
    pub payload_offset: u64,
    pub base: Option<DeltaBase>,
}

impl EntryHeader {
    /// Decode the header of the entry at `entry_offset`; `buf` holds the
    /// bytes read from that offset.
    ///
    /// Byte 0: bit 7 continuation, bits 4-6 type code, bits 0-3 the low
    /// size bits. Each continuation byte contributes 7 more size bits,
    /// starting at bit 4.
    pub fn decode(buf: &[u8], entry_offset: u64) -> PackResult<Self> {
        let corrupt = |reason: &str| PackError::CorruptEntry {
            offset: entry_offset,
            reason: reason.to_string(),
        };

        let first = *buf.first().ok_or_else(|| corrupt("empty header"))?;
        let code = (first >> 4) & 0x07;
        let kind = ObjectKind::from_code(code).map_err(|_| PackError::InvalidObjectType {
            code,
            offset: entry_offset,
        })?;

        let mut size = u64::from(first & 0x0f);
        let mut shift = 4u32;
        let mut pos = 1usize;
        let mut byte = first;
        while byte & 0x80 != 0 {
            byte = *buf.get(pos).ok_or_else(|| corrupt("size varint truncated"))?;
            pos += 1;
            let part = u64::from(byte & 0x7f);
            if shift >= 64 || part.leading_zeros() < shift {
                return Err(corrupt("size varint overflows 64 bits"));
            }
            size |= part << shift;
            shift += 7;
        }

        let base = match kind {
            ObjectKind::OfsDelta => {
                let (distance, next) = decode_backward_offset(buf, pos)
                    .map_err(|e| corrupt(&format!("OFS_DELTA base: {e}")))?;
                pos = next;
                Some(DeltaBase::Backward(distance))
            }
            ObjectKind::RefDelta => {
                let raw = buf
                    .get(pos..pos + OBJECT_ID_LEN)
                    .ok_or_else(|| corrupt("REF_DELTA base id truncated"))?;
                pos += OBJECT_ID_LEN;
                let id = ObjectId::from_slice(raw).map_err(|e| corrupt(&e.to_string()))?;
                Some(DeltaBase::Id(id))
            }
            _ => None,
        };

        Ok(Self {
            kind,
            declared_size: size,
            payload_offset: entry_offset + pos as u64,
            base,
        })
    }
}
