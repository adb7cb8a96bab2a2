use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Terminator byte separating the null-terminated fields of a chunk payload.
pub const NUL: u8 = 0;

/// A 4-byte chunk type tag, e.g. `iTXt`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkType(pub [u8; 4]);

impl ChunkType {
    pub const TEXT: ChunkType = ChunkType(*b"tEXt");
    pub const ZTXT: ChunkType = ChunkType(*b"zTXt");
    pub const ITXT: ChunkType = ChunkType(*b"iTXt");
    /// Terminal marker, text chunks are inserted right before it.
    pub const IEND: ChunkType = ChunkType(*b"IEND");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn is_textual(&self) -> bool {
        matches!(*self, Self::TEXT | Self::ZTXT | Self::ITXT)
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::IEND
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkType({self})")
    }
}

impl FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("chunk type must be 4 bytes, got {s:?}"))?;
        Ok(ChunkType(tag))
    }
}

impl TryFrom<String> for ChunkType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChunkType> for String {
    fn from(value: ChunkType) -> Self {
        value.to_string()
    }
}

/// One tokenized container chunk. The CRC is not kept, it is recomputed on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_type: ChunkType,
    pub data: Bytes,
}

impl Chunk {
    pub fn new(chunk_type: ChunkType, data: impl Into<Bytes>) -> Self {
        Self {
            chunk_type,
            data: data.into(),
        }
    }

    pub fn terminal() -> Self {
        Self::new(ChunkType::IEND, Bytes::new())
    }

    pub fn is_terminal(&self) -> bool {
        self.chunk_type.is_terminal()
    }

    /// Raw keyword bytes, up to the first terminator.
    pub fn keyword_bytes(&self) -> &[u8] {
        &self.data[..field_end(&self.data)]
    }
}

/// Index of the first terminator byte in `data`, or `data.len()` if there is none.
pub fn field_end(data: &[u8]) -> usize {
    data.iter().position(|&b| b == NUL).unwrap_or(data.len())
}

/// Splits the leading keyword field off a text chunk payload.
pub fn split_keyword(data: &Bytes) -> (String, Bytes) {
    let pos = field_end(data);
    let keyword = String::from_utf8_lossy(&data[..pos]).into_owned();
    let rest = data.slice((pos + 1).min(data.len())..);
    (keyword, rest)
}
