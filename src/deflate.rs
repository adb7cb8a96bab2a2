//! zlib compression used by `zTXt` and compressed `iTXt` values.

use std::io::{self, Read};

use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(data, Compression::default());
    let mut out = Vec::with_capacity(data.len() / 2 + 16);
    // Reading from an in-memory slice is infallible
    if let Err(error) = encoder.read_to_end(&mut out) {
        unreachable!("zlib compression of an in-memory buffer failed: {error}");
    }
    out
}

pub fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
