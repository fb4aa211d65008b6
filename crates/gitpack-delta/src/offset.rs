use crate::error::{DeltaError, DeltaResult};

/// Decode the OFS_DELTA backward distance starting at `bytes[offset]`.
///
/// The first byte seeds the value with its low 7 bits. While the previous
/// byte has its high bit set, the next byte extends the value as
/// `((value + 1) << 7) | (next & 0x7f)`. The `+ 1` bias means no two
/// encodings decode to the same distance.
///
/// Returns the distance and the offset just past the last byte consumed.
pub fn decode_backward_offset(bytes: &[u8], offset: usize) -> DeltaResult<(u64, usize)> {
    let mut pos = offset;
    let mut byte = *bytes.get(pos).ok_or(DeltaError::OffsetTruncated(offset))?;
    pos += 1;

    let mut value = u64::from(byte & 0x7f);
    while byte & 0x80 != 0 {
        if value >= u64::MAX >> 7 {
            return Err(DeltaError::OffsetOverflow(offset));
        }
        byte = *bytes.get(pos).ok_or(DeltaError::OffsetTruncated(offset))?;
        pos += 1;
        value = ((value + 1) << 7) | u64::from(byte & 0x7f);
    }

    Ok((value, pos))
}
