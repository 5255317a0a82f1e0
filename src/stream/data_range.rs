//! Fixed byte-range window over a parent stream.

use std::io::SeekFrom;

use crate::stream::{FileObject, FileObjectExt};
use crate::VfsError;

/// A `[range_offset, range_offset + range_size)` window over its parent.
///
/// Reads are clipped to the window and `size` equals `range_size` regardless
/// of how much of the window the parent actually covers: a window reaching
/// past the parent simply reads short, like a sparse tail.
///
/// This is the classic way to address one partition inside a larger image
/// when the offsets are known out of band.
#[derive(Debug)]
pub struct DataRangeStream {
    parent: Box<dyn FileObject>,
    range_offset: u64,
    range_size: u64,
    offset: u64,
}

impl DataRangeStream {
    /// Create the window. `range_offset + range_size` must not overflow.
    pub fn new(
        parent: Box<dyn FileObject>,
        range_offset: u64,
        range_size: u64,
    ) -> Result<Self, VfsError> {
        if range_offset.checked_add(range_size).is_none() {
            return Err(VfsError::PathSpec {
                reason: "data range offset and size overflow".into(),
            });
        }
        Ok(Self {
            parent,
            range_offset,
            range_size,
            offset: 0,
        })
    }
}

impl FileObject for DataRangeStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        if self.offset >= self.range_size {
            return Ok(0);
        }
        let remaining = (self.range_size - self.offset) as usize;
        let want = buf.len().min(remaining);
        let count = self
            .parent
            .read_at(self.range_offset + self.offset, &mut buf[..want])?;
        self.offset += count as u64;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError> {
        self.offset = super::resolve_seek(self.offset, self.range_size, pos)?;
        Ok(self.offset)
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        Ok(self.range_size)
    }
}
