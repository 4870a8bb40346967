
//! Low-level file access: typed big-endian reads and writes,
//! and the seekable block file all volume I/O flows through.

pub use ::std::io::{Read, Write};

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use lebe::prelude::*;
use crate::error::{Error, Result, UnitResult};


/// Extension trait for primitive types like numbers and arrays.
/// The on-disk representation is big-endian; conversion only happens
/// on hosts whose native endianness differs.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes this would consume in a file.
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read a value of this type from the byte stream.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Fill the slice with values read from the byte stream.
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;

    /// Write this value to the byte stream.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values of the slice to the byte stream.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_big_endian()?)
            }

            fn write(self, write: &mut impl Write) -> UnitResult {
                write.write_as_big_endian(&self)?;
                Ok(())
            }

            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
                read.read_from_big_endian_into(slice)?;
                Ok(())
            }

            fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
                write.write_as_big_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(i16);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(i64);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);
implement_data_for_primitive!(f64);


/// How a block file may be accessed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OpenMode {

    /// Only reads and seeks are possible.
    ReadOnly,

    /// Reads, writes and seeks are possible.
    ReadWrite,
}

/// A byte-addressable store over a seekable file.
/// All positions are relative to a base offset, which allows a volume
/// to be embedded inside a larger container file. The OS handle is
/// released when the block file is closed or dropped, on all exit paths.
#[derive(Debug)]
pub struct BlockFile {
    path: PathBuf,
    base_offset: u64,
    mode: OpenMode,
    file: Option<File>,
}

impl BlockFile {

    /// Open the file at the path, with positions starting at byte zero.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_at(path, mode, 0)
    }

    /// Open the file at the path. Seeking to position zero
    /// actually seeks to `base_offset`.
    pub fn open_at(path: impl AsRef<Path>, mode: OpenMode, base_offset: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::acquire(&path, mode)?;
        Ok(BlockFile { path, base_offset, mode, file: Some(file) })
    }

    /// Create the file if it does not exist and open it read-write.
    /// Existing contents are kept, which preserves any container bytes
    /// in front of the base offset.
    pub fn create(path: impl AsRef<Path>, base_offset: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true).write(true).create(true)
            .open(&path)?;

        Ok(BlockFile { path, base_offset, mode: OpenMode::ReadWrite, file: Some(file) })
    }

    fn acquire(path: &Path, mode: OpenMode) -> Result<File> {
        let file = match mode {
            OpenMode::ReadOnly => File::open(path)?,
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(path)?,
        };

        Ok(file)
    }

    /// Close the file and open it again in the requested mode.
    /// If the read-write open fails, the file is re-opened read-only
    /// and the failure is reported, so the handle is not left closed.
    /// Only if that fallback open fails as well does the file stay closed.
    pub fn reopen(&mut self, mode: OpenMode) -> UnitResult {
        self.file = None;

        match Self::acquire(&self.path, mode) {
            Ok(file) => {
                self.file = Some(file);
                self.mode = mode;
                Ok(())
            },

            Err(error) => {
                self.file = Some(Self::acquire(&self.path, OpenMode::ReadOnly)?);
                self.mode = OpenMode::ReadOnly;
                Err(error)
            },
        }
    }

    /// Release the OS handle. Reads and writes fail afterwards.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Whether an OS handle is currently held.
    pub fn is_open(&self) -> bool { self.file.is_some() }

    /// The mode the file was last opened with.
    pub fn mode(&self) -> OpenMode { self.mode }

    /// The path this file was opened from.
    pub fn path(&self) -> &Path { &self.path }

    /// The base offset added to every seek position.
    pub fn base_offset(&self) -> u64 { self.base_offset }

    /// The total length of the underlying file in bytes,
    /// not reduced by the base offset.
    pub fn byte_length(&self) -> Result<u64> {
        let file = self.file.as_ref().ok_or(Error::State("file is not open"))?;
        Ok(file.metadata()?.len())
    }

    /// Move the cursor to the absolute position, relative to the base offset.
    pub fn seek(&mut self, position: u64) -> UnitResult {
        let absolute = self.base_offset + position;
        self.stream()?.seek(SeekFrom::Start(absolute))?;
        Ok(())
    }

    /// Read a single typed value at the current cursor.
    pub fn read_data<T: Data>(&mut self) -> Result<T> {
        T::read(self.stream()?)
    }

    /// Write a single typed value at the current cursor.
    pub fn write_data<T: Data>(&mut self, value: T) -> UnitResult {
        value.write(self.stream()?)
    }

    /// Fill the whole buffer with bytes from the current cursor.
    pub fn read_raw(&mut self, buffer: &mut [u8]) -> UnitResult {
        self.stream()?.read_exact(buffer)?;
        Ok(())
    }

    /// Write all bytes of the buffer at the current cursor.
    pub fn write_raw(&mut self, buffer: &[u8]) -> UnitResult {
        self.stream()?.write_all(buffer)?;
        Ok(())
    }

    fn stream(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(Error::State("file is not open"))
    }
}

fn not_open() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "file is not open")
}

/// Reading a closed block file fails like reading a closed connection.
impl Read for BlockFile {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        self.file.as_mut().ok_or_else(not_open)?.read(buffer)
    }
}

impl Write for BlockFile {
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        self.file.as_mut().ok_or_else(not_open)?.write(buffer)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.as_mut().ok_or_else(not_open)?.flush()
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numbers_are_big_endian_on_disk() {
        let mut bytes = Vec::new();
        0x0102_0304_u32.write(&mut bytes).unwrap();
        2.0_f64.write(&mut bytes).unwrap();

        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..], &[0x40, 0, 0, 0, 0, 0, 0, 0]);

        let mut read = bytes.as_slice();
        assert_eq!(u32::read(&mut read).unwrap(), 0x0102_0304);
        assert_eq!(f64::read(&mut read).unwrap(), 2.0);
    }

    #[test]
    fn base_offset_shifts_every_seek() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &[0_u8; 16]).unwrap();

        let mut block_file = BlockFile::open_at(file.path(), OpenMode::ReadWrite, 4).unwrap();
        block_file.seek(0).unwrap();
        block_file.write_data(0xaabb_ccdd_u32).unwrap();

        block_file.seek(0).unwrap();
        assert_eq!(block_file.read_data::<u32>().unwrap(), 0xaabb_ccdd);

        // the first four bytes of the file must be untouched
        let mut raw = BlockFile::open(file.path(), OpenMode::ReadOnly).unwrap();
        raw.seek(0).unwrap();
        assert_eq!(raw.read_data::<u32>().unwrap(), 0);
    }

    #[test]
    fn closed_file_reports_state_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut block_file = BlockFile::open(file.path(), OpenMode::ReadOnly).unwrap();

        block_file.close();
        assert!(!block_file.is_open());
        assert!(matches!(block_file.seek(0), Err(crate::error::Error::State(_))));
    }

    #[test]
    fn failed_reopen_falls_back_to_read_only() {
        // a read-write reopen of a read-only file fails on unix
        #[cfg(unix)] {
            use std::os::unix::fs::PermissionsExt;

            let file = tempfile::NamedTempFile::new().unwrap();
            let mut permissions = file.as_file().metadata().unwrap().permissions();
            permissions.set_mode(0o444);
            std::fs::set_permissions(file.path(), permissions).unwrap();

            let mut block_file = BlockFile::open(file.path(), OpenMode::ReadOnly).unwrap();
            assert!(block_file.reopen(OpenMode::ReadWrite).is_err());
            assert!(block_file.is_open());
            assert_eq!(block_file.mode(), OpenMode::ReadOnly);
        }
    }
}
