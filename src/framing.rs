//! PNG container framing.
//!
//! Frame format, preceded once by the 8-byte signature:
//! ```text
//! +------------------+----------------+---------+-----------------+
//! | Length (4 bytes) | Type (4 bytes) | Data    | CRC-32 (4 bytes)|
//! +------------------+----------------+---------+-----------------+
//! ```
//! CRCs are skipped on read and recomputed on write.

use std::pin::pin;

use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher as Crc32Hasher;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use crate::chunk::{Chunk, ChunkType};
use crate::error::ChunkError;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Largest chunk length allowed by the container format (2^31 - 1).
pub const MAX_CHUNK_LEN: u32 = i32::MAX as u32;

// length(4) + type(4) before the data, crc(4) after
const CHUNK_HEADER_LEN: usize = 8;
const CRC_LEN: usize = 4;

#[derive(Debug)]
pub struct PngCodec {
    max_chunk_len: u32,
    signature_read: bool,
    signature_written: bool,
}

impl Default for PngCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PngCodec {
    pub fn new() -> Self {
        Self::with_max_chunk_len(MAX_CHUNK_LEN)
    }

    pub fn with_max_chunk_len(max_chunk_len: u32) -> Self {
        Self {
            max_chunk_len,
            signature_read: false,
            signature_written: false,
        }
    }
}

impl Decoder for PngCodec {
    type Item = Chunk;
    type Error = ChunkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.signature_read {
            if src.len() < PNG_SIGNATURE.len() {
                return Ok(None);
            }
            if src[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
                return Err(ChunkError::Signature);
            }
            src.advance(PNG_SIGNATURE.len());
            self.signature_read = true;
        }

        if src.len() < CHUNK_HEADER_LEN {
            return Ok(None);
        }

        // Read length without consuming
        let len = (&src[..4]).get_u32();
        if len > self.max_chunk_len {
            return Err(ChunkError::TooLarge {
                len,
                max: self.max_chunk_len,
            });
        }

        let total_len = CHUNK_HEADER_LEN + len as usize + CRC_LEN;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let mut tag = [0u8; 4];
        src.copy_to_slice(&mut tag);
        let data = src.split_to(len as usize).freeze();
        src.advance(CRC_LEN);

        Ok(Some(Chunk::new(ChunkType(tag), data)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.signature_read {
            return Err(ChunkError::Signature);
        }
        match self.decode(src)? {
            Some(chunk) => Ok(Some(chunk)),
            None if src.is_empty() => Ok(None),
            None => Err(ChunkError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated chunk at end of stream",
            ))),
        }
    }
}

impl Encoder<Chunk> for PngCodec {
    type Error = ChunkError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = u32::try_from(item.data.len())
            .ok()
            .filter(|len| *len <= self.max_chunk_len)
            .ok_or(ChunkError::TooLarge {
                len: u32::try_from(item.data.len()).unwrap_or(u32::MAX),
                max: self.max_chunk_len,
            })?;

        if !self.signature_written {
            dst.extend_from_slice(&PNG_SIGNATURE);
            self.signature_written = true;
        }

        let mut hasher = Crc32Hasher::new();
        hasher.update(item.chunk_type.as_bytes());
        hasher.update(&item.data);

        dst.reserve(CHUNK_HEADER_LEN + item.data.len() + CRC_LEN);
        dst.put_u32(len);
        dst.extend_from_slice(item.chunk_type.as_bytes());
        dst.extend_from_slice(&item.data);
        dst.put_u32(hasher.finalize());

        Ok(())
    }
}

/// Tokenizes a PNG byte stream into chunks.
pub fn read_chunks<R: AsyncRead>(reader: R) -> FramedRead<R, PngCodec> {
    FramedRead::new(reader, PngCodec::new())
}

/// Re-serializes a chunk stream, signature first, and closes the writer.
pub async fn write_chunks<W, S>(writer: W, chunks: S) -> Result<(), ChunkError>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = Result<Chunk, ChunkError>>,
{
    let sink = FramedWrite::new(writer, PngCodec::new());
    let chunks = pin!(chunks);
    chunks.forward(sink).await
}
