
//! The built-in zlib codec for brick payloads.

use super::{BrickCodec, Bytes, ByteVec};
use crate::error::{Error, Result};


/// Deflate with a zlib wrapper. Compression uses `miniz_oxide`,
/// decompression the faster `zune-inflate`.
#[derive(Debug, Clone, Copy)]
pub struct ZipCodec;

impl BrickCodec for ZipCodec {

    fn decode(&self, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
        let raw = zune_inflate::DeflateDecoder::new(compressed)
            .decode_zlib()
            .map_err(|_| Error::codec("zlib-compressed brick payload is malformed"))?;

        if raw.len() != expected_byte_size {
            return Err(Error::codec(format!(
                "decompressed brick has {} bytes, expected {}",
                raw.len(), expected_byte_size,
            )));
        }

        Ok(raw)
    }

    fn encode(&self, raw: Bytes<'_>) -> Result<ByteVec> {
        Ok(miniz_oxide::deflate::compress_to_vec_zlib(raw, 4))
    }
}
