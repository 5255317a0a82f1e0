//! Host file stream.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::stream::FileObject;
use crate::VfsError;

/// A read-only stream over a host file or device.
///
/// Each instance is an independent OS file descriptor; multiple streams over
/// the same path share no state.
#[derive(Debug)]
pub struct OsFileStream {
    file: File,
    location: String,
    offset: u64,
    size: u64,
}

impl OsFileStream {
    /// Open the file at `location` for reading.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotFound`] if the path does not exist
    /// - [`VfsError::AccessDenied`] if the host denies read access
    pub fn open(location: &str) -> Result<Self, VfsError> {
        let path = Path::new(location);
        let file = File::open(path).map_err(|err| VfsError::io("open", location, err))?;
        let metadata = file
            .metadata()
            .map_err(|err| VfsError::io("stat", location, err))?;
        Ok(Self {
            file,
            location: location.to_string(),
            offset: 0,
            size: metadata.len(),
        })
    }
}

impl FileObject for OsFileStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        let count = self
            .file
            .read(buf)
            .map_err(|err| VfsError::io("read", self.location.clone(), err))?;
        self.offset += count as u64;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError> {
        let target = super::resolve_seek(self.offset, self.size, pos)?;
        self.file
            .seek(SeekFrom::Start(target))
            .map_err(|err| VfsError::io("seek", self.location.clone(), err))?;
        self.offset = target;
        Ok(target)
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
    use crate::stream::FileObjectExt;
    use std::io::Write;

    #[test]
    fn open_read_seek() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let mut stream = OsFileStream::open(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(stream.size().unwrap(), 10);

        let mut buf = [0u8; 4];
        stream.read_exact_at(3, &mut buf).unwrap();
        assert_eq!(&buf, b"3456");
        assert_eq!(stream.offset(), 7);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = OsFileStream::open("/no/such/file/anywhere").unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }
}
