//! Encoding and decoding of the three textual chunk payloads.
//!
//! Payload layouts (keyword is at most 79 bytes, `NUL` is a single zero byte):
//!
//! ```text
//! tEXt: keyword NUL value
//! zTXt: keyword NUL method(1) zlib(value)
//! iTXt: keyword NUL flag(1) method(1) language NUL translated NUL value-or-zlib(value)
//! ```
//!
//! Decoders receive the payload with the keyword already split off, see [`split_keyword`].
//!
//! [`split_keyword`]: crate::chunk::split_keyword

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkType, NUL, field_end};
use crate::deflate::{deflate, inflate};
use crate::error::TextError;

/// Longest keyword that is written, longer keywords are truncated.
pub const MAX_KEYWORD_LEN: usize = 79;

/// The only compression method defined for text chunks (zlib).
pub const COMPRESSION_METHOD_ZLIB: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "ChunkType", try_from = "ChunkType")]
pub enum TextKind {
    /// `tEXt`
    Plain,
    /// `zTXt`
    Compressed,
    /// `iTXt`
    International,
}

impl TextKind {
    pub fn chunk_type(self) -> ChunkType {
        match self {
            TextKind::Plain => ChunkType::TEXT,
            TextKind::Compressed => ChunkType::ZTXT,
            TextKind::International => ChunkType::ITXT,
        }
    }

    pub fn from_chunk_type(chunk_type: ChunkType) -> Option<Self> {
        match chunk_type {
            ChunkType::TEXT => Some(TextKind::Plain),
            ChunkType::ZTXT => Some(TextKind::Compressed),
            ChunkType::ITXT => Some(TextKind::International),
            _ => None,
        }
    }

    /// Decodes a payload whose keyword field has already been split off.
    pub fn decode(self, keyword: String, data: &[u8]) -> Result<TextRecord, TextError> {
        match self {
            TextKind::Plain => Ok(decode_plain(keyword, data)),
            TextKind::Compressed => decode_compressed(keyword, data),
            TextKind::International => decode_international(keyword, data),
        }
    }
}

impl fmt::Display for TextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.chunk_type(), f)
    }
}

impl From<TextKind> for ChunkType {
    fn from(kind: TextKind) -> Self {
        kind.chunk_type()
    }
}

impl TryFrom<ChunkType> for TextKind {
    type Error = TextError;

    fn try_from(chunk_type: ChunkType) -> Result<Self, Self::Error> {
        TextKind::from_chunk_type(chunk_type).ok_or(TextError::UnsupportedKind(chunk_type))
    }
}

/// A decoded textual metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    #[serde(rename = "type")]
    pub kind: TextKind,
    pub keyword: String,
    /// Always false for `tEXt` and always true for `zTXt`.
    pub compressed: bool,
    /// `None` for `tEXt`, or when the payload is too short to carry the byte.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_method: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated: Option<String>,
    pub value: String,
}

impl TextRecord {
    pub fn plain(keyword: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: TextKind::Plain,
            keyword: keyword.into(),
            compressed: false,
            compression_method: None,
            language: None,
            translated: None,
            value: value.into(),
        }
    }

    pub fn compressed(keyword: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: TextKind::Compressed,
            compressed: true,
            compression_method: Some(COMPRESSION_METHOD_ZLIB),
            ..Self::plain(keyword, value)
        }
    }

    pub fn international(keyword: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: TextKind::International,
            compression_method: Some(COMPRESSION_METHOD_ZLIB),
            ..Self::plain(keyword, value)
        }
    }

    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_translated(mut self, translated: impl Into<String>) -> Self {
        self.translated = Some(translated.into());
        self
    }

    /// Encodes the full chunk payload, keyword included.
    pub fn encode(&self) -> Bytes {
        let bytes = match self.kind {
            TextKind::Plain => encode_plain(self),
            TextKind::Compressed => encode_compressed(self),
            TextKind::International => encode_international(self),
        };
        bytes.into()
    }

    pub fn to_chunk(&self) -> Chunk {
        Chunk::new(self.kind.chunk_type(), self.encode())
    }
}

/// Caller supplied description of a record to write. A `None` value deletes the keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUpdate {
    /// Defaults to `iTXt` when absent.
    #[serde(rename = "type", default)]
    pub kind: Option<ChunkType>,
    pub keyword: String,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub translated: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl TextUpdate {
    pub fn new(keyword: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn delete(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: TextKind) -> Self {
        self.kind = Some(kind.chunk_type());
        self
    }

    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_translated(mut self, translated: impl Into<String>) -> Self {
        self.translated = Some(translated.into());
        self
    }

    /// Fills in the default `iTXt` type and resolves it to a codec.
    pub fn resolve_kind(&self) -> Result<TextKind, TextError> {
        TextKind::try_from(self.kind.unwrap_or(ChunkType::ITXT))
    }

    /// The record this update writes, or `None` for a deletion.
    pub fn to_record(&self) -> Result<Option<TextRecord>, TextError> {
        let kind = self.resolve_kind()?;
        Ok(self.value.clone().map(|value| self.build(kind, value)))
    }

    fn build(&self, kind: TextKind, value: String) -> TextRecord {
        match kind {
            TextKind::Plain => TextRecord::plain(self.keyword.clone(), value),
            TextKind::Compressed => TextRecord::compressed(self.keyword.clone(), value),
            TextKind::International => TextRecord {
                compressed: self.compressed,
                language: self.language.clone(),
                translated: self.translated.clone(),
                ..TextRecord::international(self.keyword.clone(), value)
            },
        }
    }
}

/// Encodes `update` as a standalone chunk without any stream. A missing value is written
/// as an empty value.
pub fn create_chunk(update: &TextUpdate) -> Result<Chunk, TextError> {
    let kind = update.resolve_kind()?;
    let record = update.build(kind, update.value.clone().unwrap_or_default());
    Ok(record.to_chunk())
}

/// Keyword bytes as written: cut at any terminator, then truncated to
/// [`MAX_KEYWORD_LEN`] on a character boundary.
pub(crate) fn keyword_field(keyword: &str) -> &[u8] {
    let keyword = null_terminated(keyword);
    if keyword.len() <= MAX_KEYWORD_LEN {
        return keyword.as_bytes();
    }
    let mut end = MAX_KEYWORD_LEN;
    while !keyword.is_char_boundary(end) {
        end -= 1;
    }
    &keyword.as_bytes()[..end]
}

fn null_terminated(text: &str) -> &str {
    // NUL is ASCII, so the cut is always a char boundary
    &text[..field_end(text.as_bytes())]
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn inflate_value(mut record: TextRecord, data: &[u8]) -> Result<TextRecord, TextError> {
    match inflate(data) {
        Ok(value) => {
            record.value = lossy(&value);
            Ok(record)
        }
        Err(source) => Err(TextError::Inflate {
            record: Box::new(record),
            source,
        }),
    }
}

fn decode_plain(keyword: String, data: &[u8]) -> TextRecord {
    TextRecord::plain(keyword, lossy(data))
}

fn decode_compressed(keyword: String, data: &[u8]) -> Result<TextRecord, TextError> {
    let record = TextRecord {
        compression_method: data.first().copied(),
        ..TextRecord::compressed(keyword, String::new())
    };
    inflate_value(record, data.get(1..).unwrap_or_default())
}

fn decode_international(keyword: String, data: &[u8]) -> Result<TextRecord, TextError> {
    let compressed = data.first() == Some(&1);
    let compression_method = data.get(1).copied();

    let rest = data.get(2..).unwrap_or_default();
    let pos = field_end(rest);
    let language = lossy(&rest[..pos]);

    let rest = rest.get(pos + 1..).unwrap_or_default();
    let pos = field_end(rest);
    let translated = lossy(&rest[..pos]);

    let rest = rest.get(pos + 1..).unwrap_or_default();
    let record = TextRecord {
        compressed,
        compression_method,
        language: Some(language),
        translated: Some(translated),
        ..TextRecord::international(keyword, String::new())
    };

    if compressed {
        inflate_value(record, rest)
    } else {
        Ok(TextRecord {
            value: lossy(rest),
            ..record
        })
    }
}

fn encode_plain(record: &TextRecord) -> Vec<u8> {
    let keyword = keyword_field(&record.keyword);
    let mut bytes = Vec::with_capacity(keyword.len() + 1 + record.value.len());
    bytes.extend_from_slice(keyword);
    bytes.push(NUL);
    bytes.extend_from_slice(record.value.as_bytes());
    bytes
}

fn encode_compressed(record: &TextRecord) -> Vec<u8> {
    let keyword = keyword_field(&record.keyword);
    let value = deflate(record.value.as_bytes());
    let mut bytes = Vec::with_capacity(keyword.len() + 2 + value.len());
    bytes.extend_from_slice(keyword);
    bytes.push(NUL);
    bytes.push(COMPRESSION_METHOD_ZLIB);
    bytes.extend_from_slice(&value);
    bytes
}

fn encode_international(record: &TextRecord) -> Vec<u8> {
    let keyword = keyword_field(&record.keyword);
    let language = null_terminated(record.language.as_deref().unwrap_or_default());
    let translated = null_terminated(record.translated.as_deref().unwrap_or_default());
    let value = if record.compressed {
        deflate(record.value.as_bytes())
    } else {
        record.value.as_bytes().to_vec()
    };

    // 5 separator and header bytes around the variable fields
    let mut bytes =
        Vec::with_capacity(keyword.len() + 5 + language.len() + translated.len() + value.len());
    bytes.extend_from_slice(keyword);
    bytes.push(NUL);
    bytes.push(u8::from(record.compressed));
    bytes.push(COMPRESSION_METHOD_ZLIB);
    bytes.extend_from_slice(language.as_bytes());
    bytes.push(NUL);
    bytes.extend_from_slice(translated.as_bytes());
    bytes.push(NUL);
    bytes.extend_from_slice(&value);
    bytes
}
