
//! Contains the brick payload compression tag
//! and the registry of codecs that decode tagged payloads.


// private module makes non-breaking changes easier
mod zip;

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::{Error, Result};


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];


/// Specifies how a brick payload is compressed.
/// Tag zero is uncompressed; all other tags
/// are resolved through a `CodecRegistry`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Compression {

    /// Store uncompressed voxels. Produces large files
    /// that can be read and written very quickly.
    None,

    /// Compress each brick payload with zlib. Slower to write,
    /// with large savings for smooth scalar fields.
    Zip,

    /// A tag this crate has no built-in codec for.
    /// Reading such a brick requires a registered decoder.
    Other(u32),
}

impl Compression {

    /// The tag persisted in the table of contents.
    pub fn tag(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Zip => 1,
            Compression::Other(tag) => tag,
        }
    }

    /// The compression for a persisted tag.
    /// Unknown tags are preserved, not rejected:
    /// they only fail when such a brick is decoded.
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0 => Compression::None,
            1 => Compression::Zip,
            other => Compression::Other(other),
        }
    }

    /// Whether payloads with this compression are stored raw.
    pub fn is_none(self) -> bool {
        self == Compression::None
    }
}


/// Decodes and encodes brick payloads of one compression tag.
pub trait BrickCodec: Debug {

    /// Decompress a payload. The expected byte count is the uncompressed
    /// brick size computed from the volume header; a mismatch is an error.
    fn decode(&self, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec>;

    /// Compress a raw payload.
    fn encode(&self, raw: Bytes<'_>) -> Result<ByteVec>;
}


/// All codecs available to one volume, looked up by compression tag.
/// The default registry contains the built-in zip codec;
/// external decoders can be registered by tag.
#[derive(Debug)]
pub struct CodecRegistry {
    codecs: HashMap<u32, Box<dyn BrickCodec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Compression::Zip, Box::new(zip::ZipCodec));
        registry
    }
}

impl CodecRegistry {

    /// A registry without any codecs.
    pub fn empty() -> Self {
        CodecRegistry { codecs: HashMap::new() }
    }

    /// Install a codec for a tag, replacing any previous one.
    pub fn register(&mut self, compression: Compression, codec: Box<dyn BrickCodec>) {
        self.codecs.insert(compression.tag(), codec);
    }

    /// Decompress a payload with the codec registered for the tag.
    pub fn decode(&self, compression: Compression, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
        self.codec(compression)?.decode(compressed, expected_byte_size)
    }

    /// Compress a payload with the codec registered for the tag.
    pub fn encode(&self, compression: Compression, raw: Bytes<'_>) -> Result<ByteVec> {
        self.codec(compression)?.encode(raw)
    }

    fn codec(&self, compression: Compression) -> Result<&dyn BrickCodec> {
        self.codecs.get(&compression.tag())
            .map(|boxed| &**boxed)
            .ok_or_else(|| Error::codec(format!("no codec registered for tag {}", compression.tag())))
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zip_round_trip() {
        let registry = CodecRegistry::default();
        let raw: ByteVec = (0 .. 4096_u32).map(|index| (index % 7) as u8).collect();

        let compressed = registry.encode(Compression::Zip, &raw).unwrap();
        assert!(compressed.len() < raw.len());

        let decoded = registry.decode(Compression::Zip, &compressed, raw.len()).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn wrong_size_and_unknown_tags_fail() {
        let registry = CodecRegistry::default();
        let compressed = registry.encode(Compression::Zip, &[1, 2, 3]).unwrap();

        assert!(matches!(
            registry.decode(Compression::Zip, &compressed, 99),
            Err(Error::Codec(_))
        ));

        assert!(matches!(
            registry.decode(Compression::Other(42), &compressed, 3),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn tags_round_trip() {
        for tag in [0_u32, 1, 2, 77] {
            assert_eq!(Compression::from_tag(tag).tag(), tag);
        }
    }
}
