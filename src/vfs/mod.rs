//! # Virtual File Systems
//!
//! The polymorphic file-entry / file-system model: every back-end that can
//! present a hierarchy implements [`FileSystem`] and serves [`FileEntry`]
//! objects, independent of the underlying format.
//!
//! ## Quick Reference
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`FileSystem`] | Hierarchy root, lookup by specification, path joining |
//! | [`FileEntry`] | One node: stat, children, data streams, attributes |
//! | [`Stat`] | Type, size, times, ownership, identifiers |
//! | [`Timestamp`] | Nanosecond-precision time with preserved zone semantics |
//! | [`EntryIter`] | Restartable lazy child sequence |
//! | [`DataStreamInfo`] | Default (unnamed) or named alternate data stream |
//! | [`EntryAttribute`] | Extended attribute with a byte accessor |
//!
//! ## Built-in back-ends
//!
//! | Module | Back-end |
//! |--------|----------|
//! | `os` | Host operating-system hierarchy |
//! | `fake` | In-memory hierarchy for tests |
//! | `tar`, `zip` | Archive members as entries |
//! | `mbr`, `gpt` | Partitions as entries over a raw image |
//!
//! External format decoders (NTFS, ext, APFS, shadow stores, …) plug in
//! through the resolver registry and serve the same two traits.

pub mod fake;
pub mod gpt;
pub mod mbr;
pub mod os;
pub mod tar;
mod volume;
pub mod zip;

pub use volume::{Partition, PartitionFileSystem};

use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{FileObject, MemoryStream};
use crate::VfsError;

/// The type of a file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryType {
    /// Regular file containing data.
    File,
    /// Directory containing other entries.
    Directory,
    /// Symbolic link pointing at another location.
    Link,
    /// Block or character device node.
    Device,
    /// Unix domain socket.
    Socket,
    /// Named pipe.
    Pipe,
    /// Overlay whiteout marker.
    Whiteout,
}

/// An opaque date-time value with lossless round-trip.
///
/// Seconds and nanoseconds since the Unix epoch, plus the UTC offset the
/// source format recorded, when it recorded one. Formats that store local
/// time without a zone (FAT, zip) surface `utc_offset_minutes: None`; the
/// value is passed through unchanged either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    /// Seconds since 1970-01-01T00:00:00.
    pub secs: i64,
    /// Nanosecond fraction, `0..1_000_000_000`.
    pub nanos: u32,
    /// UTC offset in minutes, when the source format records one.
    pub utc_offset_minutes: Option<i16>,
}

impl Timestamp {
    /// Whole seconds since the epoch, no sub-second part, no zone.
    pub const fn from_unix(secs: i64) -> Self {
        Self {
            secs,
            nanos: 0,
            utc_offset_minutes: None,
        }
    }

    /// Seconds and nanoseconds since the epoch.
    pub const fn from_unix_nanos(secs: i64, nanos: u32) -> Self {
        Self {
            secs,
            nanos,
            utc_offset_minutes: None,
        }
    }
}

/// Metadata for one file entry.
///
/// Fields a back-end does not record stay `None`; `identifier` is the
/// format's native entry identifier (inode, MFT entry, CNID, member index).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stat {
    /// Entry type.
    pub entry_type: Option<EntryType>,
    /// Size of the default data stream in bytes.
    pub size: u64,
    /// Last access time.
    pub access_time: Option<Timestamp>,
    /// Last data modification time.
    pub modification_time: Option<Timestamp>,
    /// Last metadata change time.
    pub change_time: Option<Timestamp>,
    /// Creation time.
    pub creation_time: Option<Timestamp>,
    /// Backup time (HFS family).
    pub backup_time: Option<Timestamp>,
    /// Owner user identifier.
    pub owner: Option<u32>,
    /// Owning group identifier.
    pub group: Option<u32>,
    /// Permission mode bits.
    pub mode: Option<u32>,
    /// Native entry identifier (inode, MFT entry, CNID).
    pub identifier: u64,
    /// Number of hard links.
    pub link_count: Option<u32>,
    /// Device number, for device nodes.
    pub device_number: Option<u64>,
}

/// One data stream attached to a file entry.
///
/// The default stream has the empty name; named alternates cover NTFS
/// alternate data streams and the HFS resource fork.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataStreamInfo {
    /// Stream name; empty for the default stream.
    pub name: String,
}

impl DataStreamInfo {
    /// The default (unnamed) data stream.
    pub fn default_stream() -> Self {
        Self { name: String::new() }
    }

    /// A named alternate data stream.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Whether this is the default stream.
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }
}

/// An extended attribute of a file entry.
#[derive(Debug, Clone)]
pub struct EntryAttribute {
    /// Attribute name.
    pub name: String,
    /// Format-specific type identifier.
    pub type_identifier: String,
    value: Vec<u8>,
}

impl EntryAttribute {
    /// Create an attribute with its raw value.
    pub fn new(
        name: impl Into<String>,
        type_identifier: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            type_identifier: type_identifier.into(),
            value: value.into(),
        }
    }

    /// The raw attribute value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Open the attribute value as a stream.
    pub fn open(&self) -> MemoryStream {
        MemoryStream::new(self.value.clone())
    }
}

/// Restartable lazy sequence of child entries.
///
/// Each call to [`FileEntry::sub_entries`] produces a fresh iterator with no
/// shared cursor; iterating twice yields the same set, in the format's
/// on-disk order where the format defines one.
pub struct EntryIter(Box<dyn Iterator<Item = Result<Box<dyn FileEntry>, VfsError>> + Send>);

impl EntryIter {
    /// Create from any compatible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<Box<dyn FileEntry>, VfsError>> + Send + 'static,
    {
        Self(Box::new(iter))
    }

    /// Create from a pre-collected vector.
    pub fn from_vec(entries: Vec<Result<Box<dyn FileEntry>, VfsError>>) -> Self {
        Self(Box::new(entries.into_iter()))
    }

    /// An empty sequence.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Collect all entries, short-circuiting on the first error.
    pub fn collect_all(self) -> Result<Vec<Box<dyn FileEntry>>, VfsError> {
        self.collect()
    }
}

impl Iterator for EntryIter {
    type Item = Result<Box<dyn FileEntry>, VfsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

/// One node of a virtual hierarchy.
///
/// # Thread Compatibility
///
/// Entries are `Send` but not `Sync`: one entry is used from one thread at a
/// time, like the streams it produces.
pub trait FileEntry: Send {
    /// The entry's name (final location segment; empty for a root).
    fn name(&self) -> &str;

    /// The specification addressing this entry.
    fn path_spec(&self) -> &PathSpec;

    /// The entry type.
    fn entry_type(&self) -> EntryType;

    /// Full metadata.
    fn stat(&self) -> Result<Stat, VfsError>;

    /// Lazy sequence of child entries; empty for non-directories.
    fn sub_entries(&self) -> Result<EntryIter, VfsError>;

    /// The entry's data streams: the default stream for files plus any named
    /// alternates.
    fn data_streams(&self) -> Result<Vec<DataStreamInfo>, VfsError> {
        Ok(match self.entry_type() {
            EntryType::File => vec![DataStreamInfo::default_stream()],
            _ => Vec::new(),
        })
    }

    /// Extended attributes.
    fn attributes(&self) -> Result<Vec<EntryAttribute>, VfsError> {
        Ok(Vec::new())
    }

    /// Link target for symbolic links.
    fn link_target(&self) -> Result<Option<String>, VfsError> {
        Ok(None)
    }

    /// Open a data stream of this entry; `None` selects the default stream.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotFound`] for an unknown named stream
    fn file_object(&self, data_stream: Option<&str>) -> Result<Box<dyn FileObject>, VfsError>;

    /// The parent entry, `None` at the root.
    fn parent_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError>;

    /// Whether this entry is a directory.
    fn is_directory(&self) -> bool {
        self.entry_type() == EntryType::Directory
    }

    /// Whether this entry is a regular file.
    fn is_file(&self) -> bool {
        self.entry_type() == EntryType::File
    }
}

impl std::fmt::Debug for dyn FileEntry + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn FileEntry")
    }
}

/// A virtual hierarchy produced by one back-end.
///
/// The file system owns its back-end state (an open archive, a parsed
/// partition table, an external decoder handle); dropping the last reference
/// releases that state.
pub trait FileSystem: Send + Sync {
    /// The back-end's type indicator.
    fn type_indicator(&self) -> TypeIndicator;

    /// Separator between location segments.
    fn path_separator(&self) -> char {
        '/'
    }

    /// Whether location lookups distinguish case.
    fn case_sensitive(&self) -> bool {
        true
    }

    /// The root entry. Never fails for a successfully opened file system.
    fn root_entry(&self) -> Result<Box<dyn FileEntry>, VfsError>;

    /// Look up the entry a specification addresses.
    ///
    /// Fast-path identifiers (`inode`, `mft_entry`, …) are used when present
    /// on the specification, else lookup is by `location`.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotFound`] if no such entry exists
    fn entry_by_spec(&self, spec: &PathSpec) -> Result<Box<dyn FileEntry>, VfsError>;

    /// Whether a specification addresses an existing entry.
    fn exists_by_spec(&self, spec: &PathSpec) -> Result<bool, VfsError> {
        match self.entry_by_spec(spec) {
            Ok(_) => Ok(true),
            Err(VfsError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Join location segments into an absolute location.
    fn join_path(&self, segments: &[&str]) -> String {
        let separator = self.path_separator();
        let mut joined = String::new();
        for segment in segments {
            let trimmed = segment.trim_matches(separator);
            if trimmed.is_empty() {
                continue;
            }
            joined.push(separator);
            joined.push_str(trimmed);
        }
        if joined.is_empty() {
            joined.push(separator);
        }
        joined
    }

    /// Split a location into its segments.
    fn split_path(&self, location: &str) -> Vec<String> {
        location
            .split(self.path_separator())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Final segment of a `/`-separated location; empty for the root.
pub(crate) fn location_name(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or("")
}

/// Parent location of a `/`-separated location; `None` at the root.
pub(crate) fn location_parent(location: &str) -> Option<String> {
    if location == "/" || location.is_empty() {
        return None;
    }
    match location.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(index) => Some(location[..index].to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullFs;

    impl FileSystem for NullFs {
        fn type_indicator(&self) -> TypeIndicator {
            TypeIndicator::Fake
        }

        fn root_entry(&self) -> Result<Box<dyn FileEntry>, VfsError> {
            unimplemented!("not needed for path tests")
        }

        fn entry_by_spec(&self, _spec: &PathSpec) -> Result<Box<dyn FileEntry>, VfsError> {
            Err(VfsError::NotFound {
                location: "/".into(),
            })
        }
    }

    #[test]
    fn join_path_inserts_separators() {
        let fs = NullFs;
        assert_eq!(fs.join_path(&["usr", "share", "doc"]), "/usr/share/doc");
        assert_eq!(fs.join_path(&["/usr/", "/share/"]), "/usr/share");
        assert_eq!(fs.join_path(&[]), "/");
    }

    #[test]
    fn split_path_drops_empty_segments() {
        let fs = NullFs;
        assert_eq!(fs.split_path("/usr//share/"), vec!["usr", "share"]);
        assert!(fs.split_path("/").is_empty());
    }

    #[test]
    fn exists_by_spec_maps_not_found() {
        let fs = NullFs;
        assert!(!fs.exists_by_spec(&PathSpec::fake("/missing")).unwrap());
    }

    #[test]
    fn location_helpers() {
        assert_eq!(location_name("/a/b/c.txt"), "c.txt");
        assert_eq!(location_name("/"), "");
        assert_eq!(location_parent("/a/b"), Some("/a".to_string()));
        assert_eq!(location_parent("/a"), Some("/".to_string()));
        assert_eq!(location_parent("/"), None);
    }

    #[test]
    fn data_stream_info_default_and_named() {
        assert!(DataStreamInfo::default_stream().is_default());
        assert!(!DataStreamInfo::named("rsrc").is_default());
    }

    #[test]
    fn entry_attribute_opens_as_stream() {
        use crate::stream::FileObjectExt;

        let attr = EntryAttribute::new("user.tag", "xattr", b"forensic".to_vec());
        assert_eq!(attr.value(), b"forensic");
        let mut stream = attr.open();
        assert_eq!(stream.read_to_end().unwrap(), b"forensic");
    }

    #[test]
    fn timestamp_constructors() {
        let plain = Timestamp::from_unix(1_700_000_000);
        assert_eq!(plain.nanos, 0);
        let precise = Timestamp::from_unix_nanos(1_700_000_000, 123_456_789);
        assert_eq!(precise.nanos, 123_456_789);
        assert_eq!(precise.utc_offset_minutes, None);
    }
}
