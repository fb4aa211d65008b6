use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("delta truncated at byte {0}")]
    Truncated(usize),

    #[error("delta size varint overflows 64 bits")]
    VarintOverflow,

    #[error("delta base size mismatch: delta expects {expected}, base has {actual}")]
    BaseSizeMismatch { expected: u64, actual: u64 },

    #[error("delta result size mismatch: header declares {expected}, produced {actual}")]
    ResultSizeMismatch { expected: u64, actual: u64 },

    #[error("delta instruction 0x00 is reserved")]
    ReservedInstruction,

    #[error("delta copy {offset}+{size} exceeds base of {base_len} bytes")]
    CopyOutOfRange {
        offset: u64,
        size: u64,
        base_len: usize,
    },

    #[error("delta output exceeds declared result size {0}")]
    OutputOverrun(u64),

    #[error("backward offset at byte {0} is truncated")]
    OffsetTruncated(usize),

    #[error("backward offset at byte {0} overflows 64 bits")]
    OffsetOverflow(usize),
}

pub type DeltaResult<T> = Result<T, DeltaError>;
