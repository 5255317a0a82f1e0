//! Host operating-system back-end.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{FileObject, OsFileStream};
use crate::vfs::{EntryIter, EntryType, FileEntry, FileSystem, Stat, Timestamp};
use crate::VfsError;

/// The host file system: regular files, directories, symlinks and devices,
/// addressed by `OS` specifications.
///
/// Stateless; one instance per resolver context serves every host path.
pub struct OsFileSystem;

impl OsFileSystem {
    /// Create the host back-end.
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    fn entry_for_location(self: &Arc<Self>, location: &str) -> Result<OsFileEntry, VfsError> {
        let metadata = std::fs::symlink_metadata(location)
            .map_err(|err| VfsError::io("stat", location, err))?;
        Ok(OsFileEntry {
            fs: Arc::clone(self),
            location: location.to_string(),
            spec: PathSpec::os(location),
            entry_type: entry_type_from(&metadata),
        })
    }
}

impl FileSystem for OsFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Os
    }

    fn path_separator(&self) -> char {
        std::path::MAIN_SEPARATOR
    }

    fn root_entry(&self) -> Result<Box<dyn FileEntry>, VfsError> {
        let root = std::path::MAIN_SEPARATOR.to_string();
        let entry = OsFileSystem::new().entry_for_location(&root)?;
        Ok(Box::new(entry))
    }

    fn entry_by_spec(&self, spec: &PathSpec) -> Result<Box<dyn FileEntry>, VfsError> {
        if spec.indicator() != TypeIndicator::Os {
            return Err(VfsError::PathSpec {
                reason: format!("OS back-end cannot serve {}", spec.indicator()),
            });
        }
        let location = spec.location().ok_or_else(|| VfsError::PathSpec {
            reason: "OS specification requires a location".into(),
        })?;
        let entry = OsFileSystem::new().entry_for_location(location)?;
        Ok(Box::new(entry))
    }
}

fn entry_type_from(metadata: &Metadata) -> EntryType {
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        return EntryType::Link;
    }
    if file_type.is_dir() {
        return EntryType::Directory;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_block_device() || file_type.is_char_device() {
            return EntryType::Device;
        }
        if file_type.is_socket() {
            return EntryType::Socket;
        }
        if file_type.is_fifo() {
            return EntryType::Pipe;
        }
    }
    EntryType::File
}

fn stat_from(metadata: &Metadata, entry_type: EntryType) -> Stat {
    let mut stat = Stat {
        entry_type: Some(entry_type),
        size: metadata.len(),
        ..Stat::default()
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        stat.access_time = Some(Timestamp::from_unix_nanos(
            metadata.atime(),
            metadata.atime_nsec() as u32,
        ));
        stat.modification_time = Some(Timestamp::from_unix_nanos(
            metadata.mtime(),
            metadata.mtime_nsec() as u32,
        ));
        stat.change_time = Some(Timestamp::from_unix_nanos(
            metadata.ctime(),
            metadata.ctime_nsec() as u32,
        ));
        stat.owner = Some(metadata.uid());
        stat.group = Some(metadata.gid());
        stat.mode = Some(metadata.mode() & 0o7777);
        stat.identifier = metadata.ino();
        stat.link_count = Some(metadata.nlink() as u32);
        if entry_type == EntryType::Device {
            stat.device_number = Some(metadata.rdev());
        }
    }
    if let Ok(created) = metadata.created() {
        if let Ok(duration) = created.duration_since(std::time::UNIX_EPOCH) {
            stat.creation_time = Some(Timestamp::from_unix_nanos(
                duration.as_secs() as i64,
                duration.subsec_nanos(),
            ));
        }
    }
    stat
}

/// One host path.
pub struct OsFileEntry {
    fs: Arc<OsFileSystem>,
    location: String,
    spec: PathSpec,
    entry_type: EntryType,
}

impl FileEntry for OsFileEntry {
    fn name(&self) -> &str {
        Path::new(&self.location)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("")
    }

    fn path_spec(&self) -> &PathSpec {
        &self.spec
    }

    fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    fn stat(&self) -> Result<Stat, VfsError> {
        let metadata = std::fs::symlink_metadata(&self.location)
            .map_err(|err| VfsError::io("stat", self.location.clone(), err))?;
        Ok(stat_from(&metadata, self.entry_type))
    }

    fn sub_entries(&self) -> Result<EntryIter, VfsError> {
        if self.entry_type != EntryType::Directory {
            return Ok(EntryIter::empty());
        }
        let read_dir = std::fs::read_dir(&self.location)
            .map_err(|err| VfsError::io("read_dir", self.location.clone(), err))?;
        let fs = Arc::clone(&self.fs);
        let parent = self.location.clone();
        Ok(EntryIter::new(read_dir.map(move |entry| {
            let entry = entry.map_err(|err| VfsError::io("read_dir", parent.clone(), err))?;
            let location: PathBuf = entry.path();
            let location = location.to_string_lossy().into_owned();
            let entry = fs.entry_for_location(&location)?;
            Ok(Box::new(entry) as Box<dyn FileEntry>)
        })))
    }

    fn link_target(&self) -> Result<Option<String>, VfsError> {
        if self.entry_type != EntryType::Link {
            return Ok(None);
        }
        let target = std::fs::read_link(&self.location)
            .map_err(|err| VfsError::io("read_link", self.location.clone(), err))?;
        Ok(Some(target.to_string_lossy().into_owned()))
    }

    fn file_object(&self, data_stream: Option<&str>) -> Result<Box<dyn FileObject>, VfsError> {
        if let Some(name) = data_stream {
            if !name.is_empty() {
                return Err(VfsError::NotFound {
                    location: format!("{}:{name}", self.location),
                });
            }
        }
        Ok(Box::new(OsFileStream::open(&self.location)?))
    }

    fn parent_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        let Some(parent) = Path::new(&self.location).parent() else {
            return Ok(None);
        };
        let location = parent.to_string_lossy().into_owned();
        if location.is_empty() || location == self.location {
            return Ok(None);
        }
        let entry = self.fs.entry_for_location(&location)?;
        Ok(Some(Box::new(entry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FileObjectExt;
    use std::io::Write;

    #[test]
    fn entry_by_spec_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"host bytes")
            .unwrap();

        let fs = OsFileSystem::new();
        let spec = PathSpec::os(path.to_str().unwrap());
        let entry = fs.entry_by_spec(&spec).unwrap();
        assert_eq!(entry.name(), "note.txt");
        assert!(entry.is_file());

        let stat = entry.stat().unwrap();
        assert_eq!(stat.size, 10);
        assert!(stat.modification_time.is_some());

        let mut stream = entry.file_object(None).unwrap();
        assert_eq!(stream.read_to_end().unwrap(), b"host bytes");
    }

    #[test]
    fn directory_enumerates_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"1").unwrap();
        std::fs::write(dir.path().join("b"), b"2").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let fs = OsFileSystem::new();
        let entry = fs
            .entry_by_spec(&PathSpec::os(dir.path().to_str().unwrap()))
            .unwrap();
        assert!(entry.is_directory());

        let mut names: Vec<String> = entry
            .sub_entries()
            .unwrap()
            .map(|child| child.unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "sub"]);

        // Restartable: a second iteration yields the same set.
        let mut again: Vec<String> = entry
            .sub_entries()
            .unwrap()
            .map(|child| child.unwrap().name().to_string())
            .collect();
        again.sort();
        assert_eq!(names, again);
    }

    #[test]
    fn missing_path_is_not_found() {
        let fs = OsFileSystem::new();
        let err = fs
            .entry_by_spec(&PathSpec::os("/no/such/entry/here"))
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_exposes_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let fs = OsFileSystem::new();
        let entry = fs
            .entry_by_spec(&PathSpec::os(link.to_str().unwrap()))
            .unwrap();
        assert_eq!(entry.entry_type(), EntryType::Link);
        assert_eq!(
            entry.link_target().unwrap().unwrap(),
            target.to_string_lossy()
        );
    }
}
