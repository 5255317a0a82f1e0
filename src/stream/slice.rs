//! Random-read slice view over any stream.

use std::ops::Range;

use crate::stream::{FileObject, FileObjectExt};
use crate::VfsError;

/// Wraps a stream to expose `slice[a..b]`-style random reads.
///
/// Useful for format parsers that index into a stream rather than iterating
/// it. Ranges are clipped to the stream size, so an over-long range returns
/// the available prefix instead of failing.
///
/// # Example
///
/// ```rust
/// use stackfs::stream::{DataSlice, MemoryStream};
///
/// let mut slice = DataSlice::new(MemoryStream::new(&b"layered bytes"[..]));
/// assert_eq!(slice.read_range(8..13).unwrap(), b"bytes");
/// assert_eq!(slice.read_range(8..100).unwrap(), b"bytes");
/// ```
pub struct DataSlice<F: FileObject> {
    stream: F,
}

impl<F: FileObject> DataSlice<F> {
    /// Wrap a stream.
    pub fn new(stream: F) -> Self {
        Self { stream }
    }

    /// Total length of the underlying stream.
    pub fn len(&mut self) -> Result<u64, VfsError> {
        self.stream.size()
    }

    /// Whether the underlying stream is empty.
    pub fn is_empty(&mut self) -> Result<bool, VfsError> {
        Ok(self.len()? == 0)
    }

    /// Read the bytes in `range`, clipped to the stream size.
    pub fn read_range(&mut self, range: Range<u64>) -> Result<Vec<u8>, VfsError> {
        let size = self.stream.size()?;
        let start = range.start.min(size);
        let end = range.end.min(size);
        if start >= end {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; (end - start) as usize];
        self.stream.read_exact_at(start, &mut buf)?;
        Ok(buf)
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> F {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    #[test]
    fn ranges_are_pure_reads() {
        let mut slice = DataSlice::new(MemoryStream::new(&b"0123456789"[..]));
        assert_eq!(slice.read_range(2..5).unwrap(), b"234");
        assert_eq!(slice.read_range(0..2).unwrap(), b"01");
        assert_eq!(slice.read_range(2..5).unwrap(), b"234");
    }

    #[test]
    fn empty_and_inverted_ranges() {
        let mut slice = DataSlice::new(MemoryStream::new(&b"abc"[..]));
        assert!(slice.read_range(1..1).unwrap().is_empty());
        assert!(slice.read_range(5..9).unwrap().is_empty());
        assert_eq!(slice.len().unwrap(), 3);
        assert!(!slice.is_empty().unwrap());
    }
}
