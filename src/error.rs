use std::io;

use thiserror::Error;

use crate::chunk::ChunkType;
use crate::record::TextRecord;

/// Errors produced while reading or writing the container chunk stream.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Missing PNG signature")]
    Signature,

    #[error("Chunk length {len} exceeds maximum {max}")]
    TooLarge { len: u32, max: u32 },
}

/// Errors surfaced by the text record codec and the query/patch engines.
#[derive(Debug, Error)]
pub enum TextError {
    #[error("Unsupported text chunk type {0}")]
    UnsupportedKind(ChunkType),

    #[error("Invalid filter specified")]
    InvalidFilter,

    #[error("Invalid keyword pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The compressed value could not be inflated. `record` carries every field decoded
    /// before the value, with an empty value.
    #[error("Failed to inflate {} chunk {:?}: {source}", .record.kind, .record.keyword)]
    Inflate {
        record: Box<TextRecord>,
        #[source]
        source: io::Error,
    },

    #[error("Chunk stream dropped before the lookup completed")]
    Abandoned,

    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

impl TextError {
    /// The partially decoded record carried by an inflate failure.
    pub fn partial_record(&self) -> Option<&TextRecord> {
        match self {
            TextError::Inflate { record, .. } => Some(record.as_ref()),
            _ => None,
        }
    }
}
