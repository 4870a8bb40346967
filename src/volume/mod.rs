
//! Open, read, and write bricked volume files.
//!
//! A file consists of the global header, the table of contents
//! (one entry per brick, levels in order, z-major within a level),
//! and the concatenated brick payloads without padding.
//! Brick byte offsets are not persisted; they are reconstructed
//! from the running sum of payload lengths when the file is opened.

use std::path::Path;

use crate::io::{BlockFile, OpenMode, Data};
use crate::meta::{VolumeMeta, BrickCoord, ASPECT_FIELD_OFFSET};
use crate::compression::{Compression, CodecRegistry, BrickCodec};
use crate::error::{Error, Result, UnitResult, u64_to_usize, usize_to_u64};
use crate::math::Vec3;


/// One entry of the table of contents, locating a single brick payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TocEntry {

    /// Byte position of the payload, relative to the volume base offset.
    /// Reconstructed from the prefix sum of lengths, not persisted.
    pub byte_offset: u64,

    /// Byte count of the payload as stored in the file.
    pub length: u64,

    /// How the payload is compressed.
    pub compression: Compression,
}


/// A read-only opened bricked volume file.
///
/// Reading bricks moves the file cursor, so concurrent readers
/// need their own instance each.
#[derive(Debug)]
pub struct Volume {
    file: BlockFile,
    base_offset: u64,
    meta: VolumeMeta,
    toc: Vec<TocEntry>,
    codecs: CodecRegistry,
}

impl Volume {

    /// Open the file at the path, expecting the volume to start at byte zero.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Open the file at the path, with the volume starting at `base_offset`.
    pub fn open_at(path: impl AsRef<Path>, base_offset: u64) -> Result<Self> {
        let file = BlockFile::open(path, OpenMode::ReadOnly)?;
        Self::open_file(file, base_offset)
    }

    /// Read the global header and the table of contents
    /// from an already opened block file.
    pub fn open_file(mut file: BlockFile, base_offset: u64) -> Result<Self> {
        file.seek(base_offset)?;
        let meta = VolumeMeta::read(&mut file)?;

        let total_brick_count = meta.total_brick_count();
        let mut toc = Vec::with_capacity(u64_to_usize(total_brick_count));

        // the first payload starts right after the table of contents
        let mut running_offset = meta.header_byte_size();

        for _ in 0 .. total_brick_count {
            let length = u64::read(&mut file)?;
            let compression = Compression::from_tag(u32::read(&mut file)?);

            toc.push(TocEntry { byte_offset: running_offset, length, compression });
            running_offset += length;
        }

        let payload_end = file.base_offset() + base_offset + running_offset;
        if payload_end > file.byte_length()? {
            return Err(Error::format("table of contents exceeds the file length"));
        }

        Ok(Volume {
            file, base_offset, meta, toc,
            codecs: CodecRegistry::default(),
        })
    }

    /// The global header and level table of this volume.
    pub fn meta(&self) -> &VolumeMeta { &self.meta }

    /// The table of contents, one entry per brick.
    pub fn toc(&self) -> &[TocEntry] { &self.toc }

    /// Register additional payload decoders on this volume.
    pub fn codecs_mut(&mut self) -> &mut CodecRegistry { &mut self.codecs }

    /// Whether the underlying file handle is held.
    pub fn is_open(&self) -> bool { self.file.is_open() }

    /// Release the underlying file handle. The volume must not be
    /// used afterwards unless another open call is performed.
    pub fn close(&mut self) {
        self.file.close();
    }

    /// Read one brick payload into the buffer, decompressing if necessary.
    /// Seeks to the offset recorded in the table of contents and reads the
    /// recorded number of bytes. May block on disk I/O.
    pub fn read_brick_into(&mut self, index: u64, buffer: &mut Vec<u8>) -> UnitResult {
        let entry = *self.toc.get(u64_to_usize(index))
            .ok_or_else(|| Error::bounds(format!("brick index {} of {}", index, self.toc.len())))?;

        self.file.seek(self.base_offset + entry.byte_offset)?;

        if entry.compression.is_none() {
            buffer.resize(u64_to_usize(entry.length), 0);
            self.file.read_raw(buffer)?;
        }
        else {
            let mut compressed = vec![0_u8; u64_to_usize(entry.length)];
            self.file.read_raw(&mut compressed)?;

            let coord = self.meta.brick_coord(index)?;
            let expected_byte_size = u64_to_usize(self.meta.brick_byte_size(coord)?);
            *buffer = self.codecs.decode(entry.compression, &compressed, expected_byte_size)?;
        }

        Ok(())
    }

    /// Read the brick at the coordinate, see `read_brick_into`.
    pub fn read_brick_at(&mut self, coord: BrickCoord, buffer: &mut Vec<u8>) -> UnitResult {
        let index = self.meta.brick_index(coord)?;
        self.read_brick_into(index, buffer)
    }

    /// Overwrite the three aspect doubles in the file header.
    ///
    /// The file is re-opened read-write, patched, and re-opened read-only.
    /// If the read-write open fails, the file remains open read-only with
    /// the old aspect and the failure is returned. All readers of this
    /// volume must be quiesced while this runs.
    pub fn set_global_aspect(&mut self, aspect: Vec3<f64>) -> UnitResult {
        if !(aspect.0 > 0.0 && aspect.1 > 0.0 && aspect.2 > 0.0) {
            return Err(Error::format("volume aspect must be positive"));
        }

        self.file.reopen(OpenMode::ReadWrite)?;

        let patched = self.write_aspect(aspect);
        let restored = self.file.reopen(OpenMode::ReadOnly);

        patched?;
        restored?;

        self.meta.volume_aspect = aspect;
        Ok(())
    }

    fn write_aspect(&mut self, aspect: Vec3<f64>) -> UnitResult {
        self.file.seek(self.base_offset + ASPECT_FIELD_OFFSET)?;
        self.file.write_data(aspect.0)?;
        self.file.write_data(aspect.1)?;
        self.file.write_data(aspect.2)?;
        Ok(())
    }

    /// Write the global header and the table of contents to a block file,
    /// in the same field order that `open_file` reads.
    pub fn write_header(
        file: &mut BlockFile, base_offset: u64,
        meta: &VolumeMeta, toc: &[TocEntry],
    ) -> UnitResult
    {
        if usize_to_u64(toc.len()) != meta.total_brick_count() {
            return Err(Error::State("table of contents length does not match the header"));
        }

        file.seek(base_offset)?;
        meta.write(file)?;

        for entry in toc {
            entry.length.write(file)?;
            entry.compression.tag().write(file)?;
        }

        Ok(())
    }
}


/// Creates a volume file brick by brick: a placeholder header is written
/// first, payloads are appended in table-of-contents order, and `finish`
/// rewrites the completed header and table in place.
#[derive(Debug)]
#[must_use]
pub struct VolumeWriter {
    file: BlockFile,
    base_offset: u64,
    meta: VolumeMeta,
    toc: Vec<TocEntry>,
    codecs: CodecRegistry,
    payload_position: u64,
}

impl VolumeWriter {

    /// Create the file at the path and write the placeholder header.
    pub fn create(path: impl AsRef<Path>, meta: VolumeMeta) -> Result<Self> {
        Self::create_at(path, meta, 0)
    }

    /// Create the file at the path, with the volume starting at `base_offset`.
    /// Any existing file contents in front of the base offset are preserved.
    pub fn create_at(path: impl AsRef<Path>, meta: VolumeMeta, base_offset: u64) -> Result<Self> {
        meta.validate()?;

        let placeholder: Vec<TocEntry> = (0 .. meta.total_brick_count())
            .map(|_| TocEntry { byte_offset: 0, length: 0, compression: Compression::None })
            .collect();

        let mut file = BlockFile::create(path, 0)?;
        Volume::write_header(&mut file, base_offset, &meta, &placeholder)?;

        let payload_position = meta.header_byte_size();
        Ok(VolumeWriter {
            file, base_offset, meta,
            toc: Vec::with_capacity(placeholder.len()),
            codecs: CodecRegistry::default(),
            payload_position,
        })
    }

    /// The header this writer was created with.
    pub fn meta(&self) -> &VolumeMeta { &self.meta }

    /// Number of bricks appended so far.
    pub fn brick_count(&self) -> u64 { usize_to_u64(self.toc.len()) }

    /// Register an encoder so bricks can be appended with its tag.
    pub fn register_codec(&mut self, compression: Compression, codec: Box<dyn BrickCodec>) {
        self.codecs.register(compression, codec);
    }

    /// Append the next brick in table-of-contents order
    /// (levels in order, z-major within a level).
    /// The raw payload must have exactly the uncompressed byte size
    /// of that brick; it is encoded with the requested compression
    /// before being written.
    pub fn append_brick(&mut self, raw: &[u8], compression: Compression) -> UnitResult {
        let index = usize_to_u64(self.toc.len());
        if index >= self.meta.total_brick_count() {
            return Err(Error::State("all bricks of this volume have already been appended"));
        }

        let coord = self.meta.brick_coord(index)?;
        let expected = self.meta.brick_byte_size(coord)?;
        if usize_to_u64(raw.len()) != expected {
            return Err(Error::format(format!(
                "brick {} payload has {} bytes, header implies {}",
                index, raw.len(), expected,
            )));
        }

        let encoded;
        let payload: &[u8] = if compression.is_none() { raw } else {
            encoded = self.codecs.encode(compression, raw)?;
            &encoded
        };

        self.file.seek(self.base_offset + self.payload_position)?;
        self.file.write_raw(payload)?;

        self.toc.push(TocEntry {
            byte_offset: self.payload_position,
            length: usize_to_u64(payload.len()),
            compression,
        });

        self.payload_position += usize_to_u64(payload.len());
        Ok(())
    }

    /// Seek back and rewrite the header and the now complete
    /// table of contents. Returns the number of bricks written.
    pub fn finish(mut self) -> Result<u64> {
        if self.brick_count() != self.meta.total_brick_count() {
            return Err(Error::State("not all bricks of this volume have been appended"));
        }

        Volume::write_header(&mut self.file, self.base_offset, &self.meta, &self.toc)?;
        Ok(self.brick_count())
    }
}
