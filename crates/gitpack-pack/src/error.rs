use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("corrupt pack index: {0}")]
    CorruptIndex(String),

    #[error("unsupported pack index version: {0}")]
    UnsupportedIndexVersion(u32),

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("invalid object type code {code} at offset {offset}")]
    InvalidObjectType { code: u8, offset: u64 },

    #[error("decompression failed at offset {offset}: {reason}")]
    Decompression { offset: u64, reason: String },

    #[error("payload at offset {offset} ends after {read} bytes before the stream completes")]
    TruncatedPayload { offset: u64, read: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
