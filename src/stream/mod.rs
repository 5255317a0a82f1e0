//! # Byte Streams
//!
//! The layered byte-stream model: every layer of a chain that produces bytes
//! implements [`FileObject`], and transform streams compose by owning their
//! parent stream.
//!
//! ## Contract
//!
//! - `size` is known after open (a first query may trigger a memoized
//!   one-pass scan for formats that do not store it).
//! - `read` returns up to the requested number of bytes and `0` at or past
//!   end of stream.
//! - `seek` past the size is permitted and does not extend the stream.
//! - A stream denotes a pure function from offset to byte: reads at equal
//!   offsets return equal bytes.
//!
//! Streams are thread-compatible, not thread-safe: one instance must be used
//! from one thread at a time, which is why the trait only requires `Send`.
//!
//! ## Transform streams
//!
//! | Type | Module | Transform |
//! |------|--------|-----------|
//! | [`DataRangeStream`] | `data_range` | Fixed window over the parent |
//! | [`EncodedStream`] | `encoded` | base16 / base32 / base64 decode |
//! | [`CompressedStream`] | `compressed` | bzip2, gzip, lzma, xz, zlib, raw deflate |
//! | [`GzipStream`] | `gzip` | Multi-member gzip with member-boundary index |
//! | [`EncryptedStream`] | `encrypted` | AES modes, Blowfish, 3DES, RC4 |

mod compressed;
mod data_range;
mod encoded;
mod encrypted;
mod gzip;
mod os;
mod slice;

pub use compressed::{CompressedStream, CompressionMethod};
pub use data_range::DataRangeStream;
pub use encoded::{EncodedStream, EncodingMethod};
pub use encrypted::{CipherMode, EncryptedStream, EncryptionMethod};
pub use gzip::GzipStream;
pub use os::OsFileStream;
pub use slice::DataSlice;

use std::io::SeekFrom;
use std::sync::{Arc, Mutex};

use crate::VfsError;

/// A positioned, read-only byte stream over one layer of a chain.
///
/// # Object Safety
///
/// This trait is object-safe; transform streams and resolver helpers pass
/// streams around as `Box<dyn FileObject>`.
pub trait FileObject: Send {
    /// Read up to `buf.len()` bytes at the current offset, advancing it.
    ///
    /// Returns the number of bytes read; `0` means the offset is at or past
    /// the end of the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError>;

    /// Reposition the stream. Seeking past the size is legal.
    ///
    /// # Errors
    ///
    /// - [`VfsError::InvalidData`] on a seek before offset zero, or on
    ///   `SeekFrom::End` with a positive delta when the size has not been
    ///   determined yet.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError>;

    /// The current offset.
    fn offset(&self) -> u64;

    /// Total size in bytes.
    ///
    /// For formats that do not store their decompressed size this triggers a
    /// one-pass scan on first call; the result is memoized.
    fn size(&mut self) -> Result<u64, VfsError>;
}

impl std::fmt::Debug for dyn FileObject + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn FileObject")
    }
}

impl<T: FileObject + ?Sized> FileObject for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        (**self).read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError> {
        (**self).seek(pos)
    }

    fn offset(&self) -> u64 {
        (**self).offset()
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        (**self).size()
    }
}

/// Convenience reads over any [`FileObject`].
///
/// Blanket-implemented; bring the trait into scope and every stream gains
/// these methods.
pub trait FileObjectExt: FileObject {
    /// Fill `buf` completely from the current offset.
    ///
    /// # Errors
    ///
    /// [`VfsError::InvalidData`] if the stream ends first.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), VfsError> {
        let mut filled = 0;
        while filled < buf.len() {
            let count = self.read(&mut buf[filled..])?;
            if count == 0 {
                return Err(VfsError::InvalidData {
                    details: format!(
                        "unexpected end of stream: wanted {} bytes, got {filled}",
                        buf.len()
                    ),
                });
            }
            filled += count;
        }
        Ok(())
    }

    /// Seek to `offset` and read up to `buf.len()` bytes.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        self.seek(SeekFrom::Start(offset))?;
        self.read(buf)
    }

    /// Seek to `offset` and fill `buf` completely.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), VfsError> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    /// Read from the current offset to the end of the stream.
    fn read_to_end(&mut self) -> Result<Vec<u8>, VfsError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let count = self.read(&mut chunk)?;
            if count == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..count]);
        }
    }
}

impl<T: FileObject + ?Sized> FileObjectExt for T {}

/// Resolve a seek target against a current offset and a known size.
pub(crate) fn resolve_seek(
    current: u64,
    size: u64,
    pos: SeekFrom,
) -> Result<u64, VfsError> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => size.checked_add_signed(delta),
    };
    target.ok_or_else(|| VfsError::InvalidData {
        details: "seek before start of stream".into(),
    })
}

/// An in-memory stream, used by the fake back-end and by archive members
/// that must be materialized.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    data: Arc<[u8]>,
    offset: u64,
}

impl MemoryStream {
    /// Wrap a byte buffer.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            offset: 0,
        }
    }
}

impl FileObject for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        let len = self.data.len() as u64;
        if self.offset >= len {
            return Ok(0);
        }
        let available = &self.data[self.offset as usize..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.offset += count as u64;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError> {
        self.offset = resolve_seek(self.offset, self.data.len() as u64, pos)?;
        Ok(self.offset)
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        Ok(self.data.len() as u64)
    }
}

/// Adapter exposing a [`FileObject`] as `std::io::Read + Seek`, for crates
/// that consume standard readers (tar, zip, the decompressors).
pub struct StreamReader<F: FileObject> {
    inner: F,
}

impl<F: FileObject> StreamReader<F> {
    /// Wrap a stream.
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> F {
        self.inner
    }

    /// Access the wrapped stream.
    pub fn get_mut(&mut self) -> &mut F {
        &mut self.inner
    }
}

impl<F: FileObject> std::io::Read for StreamReader<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf).map_err(std::io::Error::other)
    }
}

impl<F: FileObject> std::io::Seek for StreamReader<F> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos).map_err(std::io::Error::other)
    }
}

/// A parent stream shared between sibling readers, one lock per access.
///
/// Archive file systems hand these to member streams: the archive owns the
/// parent once, each member window locks it around its own seek-and-read.
pub type SharedParent = Arc<Mutex<Box<dyn FileObject>>>;

/// A `[base, base + size)` window over a [`SharedParent`].
pub struct SharedRangeStream {
    parent: SharedParent,
    base: u64,
    size: u64,
    offset: u64,
}

impl SharedRangeStream {
    /// Create a window over a shared parent.
    pub fn new(parent: SharedParent, base: u64, size: u64) -> Self {
        Self {
            parent,
            base,
            size,
            offset: 0,
        }
    }
}

impl FileObject for SharedRangeStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        if self.offset >= self.size {
            return Ok(0);
        }
        let remaining = (self.size - self.offset) as usize;
        let want = buf.len().min(remaining);
        let mut parent = self
            .parent
            .lock()
            .map_err(|_| VfsError::BackEnd("shared parent stream poisoned".into()))?;
        parent.seek(SeekFrom::Start(self.base + self.offset))?;
        let count = parent.read(&mut buf[..want])?;
        self.offset += count as u64;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError> {
        self.offset = resolve_seek(self.offset, self.size, pos)?;
        Ok(self.offset)
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        Ok(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_stream_reads_and_seeks() {
        let mut stream = MemoryStream::new(&b"hello world"[..]);
        assert_eq!(stream.size().unwrap(), 11);

        let mut buf = [0u8; 5];
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(stream.offset(), 5);

        stream.seek(SeekFrom::Start(6)).unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn read_at_end_returns_zero() {
        let mut stream = MemoryStream::new(&b"abc"[..]);
        stream.seek(SeekFrom::Start(3)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seek_past_size_is_legal_and_does_not_extend() {
        let mut stream = MemoryStream::new(&b"abc"[..]);
        assert_eq!(stream.seek(SeekFrom::Start(100)).unwrap(), 100);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert_eq!(stream.size().unwrap(), 3);
    }

    #[test]
    fn seek_before_start_fails() {
        let mut stream = MemoryStream::new(&b"abc"[..]);
        let err = stream.seek(SeekFrom::Current(-1)).unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }

    #[test]
    fn seek_from_end() {
        let mut stream = MemoryStream::new(&b"abcdef"[..]);
        assert_eq!(stream.seek(SeekFrom::End(-2)).unwrap(), 4);
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ef");
    }

    #[test]
    fn read_exact_past_end_is_invalid_data() {
        let mut stream = MemoryStream::new(&b"ab"[..]);
        let mut buf = [0u8; 4];
        let err = stream.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }

    #[test]
    fn read_to_end_from_offset() {
        let mut stream = MemoryStream::new(&b"abcdef"[..]);
        stream.seek(SeekFrom::Start(2)).unwrap();
        assert_eq!(stream.read_to_end().unwrap(), b"cdef");
    }

    #[test]
    fn stream_reader_adapts_to_std_io() {
        use std::io::{Read, Seek};

        let mut reader = StreamReader::new(MemoryStream::new(&b"stacked"[..]));
        reader.seek(SeekFrom::Start(2)).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "acked");
    }

    #[test]
    fn shared_range_stream_windows_parent() {
        let parent: SharedParent = Arc::new(Mutex::new(Box::new(MemoryStream::new(
            &b"0123456789"[..],
        ))));
        let mut a = SharedRangeStream::new(Arc::clone(&parent), 2, 3);
        let mut b = SharedRangeStream::new(parent, 5, 4);

        // Interleaved reads: the streams share no cursor state.
        let mut buf = [0u8; 2];
        assert_eq!(a.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"23");
        assert_eq!(b.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"56");
        assert_eq!(a.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'4');

        assert_eq!(a.size().unwrap(), 3);
        assert_eq!(b.size().unwrap(), 4);
    }
}
