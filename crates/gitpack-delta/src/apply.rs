use crate::error::{DeltaError, DeltaResult};

/// Read one of the little-endian base-128 sizes at the head of a delta.
fn read_size(delta: &[u8], pos: &mut usize) -> DeltaResult<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *delta.get(*pos).ok_or(DeltaError::Truncated(*pos))?;
        *pos += 1;
        if shift > 63 {
            return Err(DeltaError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Largest output a single copy instruction can produce.
const MAX_COPY: u64 = 0x10000;

/// Apply a git delta buffer to `base` and return the derived object.
///
/// The delta starts with the base size and the result size, then a stream
/// of instructions:
///
/// - high bit set: copy from base. Bits 0-3 select which little-endian
///   offset bytes follow, bits 4-6 which size bytes follow. A size of zero
///   means 0x10000.
/// - `0x01..=0x7f`: insert that many literal bytes from the delta.
/// - `0x00`: reserved, rejected.
///
/// The declared base size must equal `base.len()` and the produced output
/// must match the declared result size exactly.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> DeltaResult<Vec<u8>> {
    let mut pos = 0usize;
    let base_size = read_size(delta, &mut pos)?;
    let result_size = read_size(delta, &mut pos)?;
    if base_size != base.len() as u64 {
        return Err(DeltaError::BaseSizeMismatch {
            expected: base_size,
            actual: base.len() as u64,
        });
    }

    // Each instruction takes at least one delta byte, so the instruction
    // stream bounds the output no matter what the header declares.
    let reachable = ((delta.len() - pos) as u64).saturating_mul(MAX_COPY);
    let mut out = Vec::with_capacity(usize::try_from(result_size.min(reachable)).unwrap_or(0));
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        let chunk = if cmd & 0x80 != 0 {
            let (offset, size) = copy_params(delta, &mut pos, cmd)?;
            let end = offset
                .checked_add(size)
                .filter(|&end| end <= base.len() as u64)
                .ok_or(DeltaError::CopyOutOfRange {
                    offset,
                    size,
                    base_len: base.len(),
                })?;
            &base[offset as usize..end as usize]
        } else if cmd != 0 {
            let end = pos + usize::from(cmd);
            let literal = delta.get(pos..end).ok_or(DeltaError::Truncated(pos))?;
            pos = end;
            literal
        } else {
            return Err(DeltaError::ReservedInstruction);
        };

        if (out.len() + chunk.len()) as u64 > result_size {
            return Err(DeltaError::OutputOverrun(result_size));
        }
        out.extend_from_slice(chunk);
    }

    if out.len() as u64 != result_size {
        return Err(DeltaError::ResultSizeMismatch {
            expected: result_size,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}

/// Decode the optional offset and size bytes of a copy instruction.
fn copy_params(delta: &[u8], pos: &mut usize, cmd: u8) -> DeltaResult<(u64, u64)> {
    let mut offset = 0u64;
    for (bit, shift) in [(0x01u8, 0u32), (0x02, 8), (0x04, 16), (0x08, 24)] {
        if cmd & bit != 0 {
            let byte = *delta.get(*pos).ok_or(DeltaError::Truncated(*pos))?;
            *pos += 1;
            offset |= u64::from(byte) << shift;
        }
    }

    let mut size = 0u64;
    for (bit, shift) in [(0x10u8, 0u32), (0x20, 8), (0x40, 16)] {
        if cmd & bit != 0 {
            let byte = *delta.get(*pos).ok_or(DeltaError::Truncated(*pos))?;
            *pos += 1;
            size |= u64::from(byte) << shift;
        }
    }
    if size == 0 {
        size = 0x10000;
    }

    Ok((offset, size))
}
