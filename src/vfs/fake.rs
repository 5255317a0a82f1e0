//! In-memory hierarchy for tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{FileObject, MemoryStream};
use crate::vfs::{
    location_name, location_parent, DataStreamInfo, EntryAttribute, EntryIter, EntryType,
    FileEntry, FileSystem, Stat,
};
use crate::VfsError;

#[derive(Clone)]
struct FakeNode {
    entry_type: EntryType,
    streams: BTreeMap<String, Arc<[u8]>>,
    link_target: Option<String>,
    attributes: Vec<EntryAttribute>,
    stat: Stat,
}

impl FakeNode {
    fn new(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            streams: BTreeMap::new(),
            link_target: None,
            attributes: Vec::new(),
            stat: Stat {
                entry_type: Some(entry_type),
                ..Stat::default()
            },
        }
    }
}

/// Builder for a [`FakeFileSystem`].
///
/// Locations are absolute `/`-separated paths; missing parent directories
/// are created implicitly. Entry identifiers are assigned in location order
/// at build time unless a stat override sets one.
///
/// # Example
///
/// ```rust
/// use stackfs::vfs::fake::FakeFileSystemBuilder;
/// use stackfs::vfs::FileSystem;
/// use stackfs::PathSpec;
///
/// let fs = FakeFileSystemBuilder::new()
///     .add_file("/docs/readme.md", b"hello".to_vec())
///     .add_symlink("/latest", "/docs/readme.md")
///     .build();
/// assert!(fs.exists_by_spec(&PathSpec::fake("/docs/readme.md")).unwrap());
/// ```
#[derive(Default)]
pub struct FakeFileSystemBuilder {
    nodes: BTreeMap<String, FakeNode>,
}

impl FakeFileSystemBuilder {
    /// Start with an empty hierarchy (just the root directory).
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), FakeNode::new(EntryType::Directory));
        Self { nodes }
    }

    fn ensure_parents(&mut self, location: &str) {
        let mut current = location_parent(location);
        while let Some(parent) = current {
            self.nodes
                .entry(parent.clone())
                .or_insert_with(|| FakeNode::new(EntryType::Directory));
            current = location_parent(&parent);
        }
    }

    /// Add a directory.
    pub fn add_directory(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.ensure_parents(&location);
        self.nodes
            .insert(location, FakeNode::new(EntryType::Directory));
        self
    }

    /// Add a regular file with the given default-stream content.
    pub fn add_file(mut self, location: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let location = location.into();
        self.ensure_parents(&location);
        let mut node = FakeNode::new(EntryType::File);
        let content: Vec<u8> = content.into();
        node.stat.size = content.len() as u64;
        node.streams.insert(String::new(), content.into());
        self.nodes.insert(location, node);
        self
    }

    /// Add a named alternate data stream to an existing file.
    pub fn add_named_stream(
        mut self,
        location: &str,
        stream_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        if let Some(node) = self.nodes.get_mut(location) {
            let content: Vec<u8> = content.into();
            node.streams.insert(stream_name.into(), content.into());
        }
        self
    }

    /// Add a symbolic link.
    pub fn add_symlink(
        mut self,
        location: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let location = location.into();
        self.ensure_parents(&location);
        let mut node = FakeNode::new(EntryType::Link);
        node.link_target = Some(target.into());
        self.nodes.insert(location, node);
        self
    }

    /// Attach an extended attribute to an existing entry.
    pub fn add_attribute(mut self, location: &str, attribute: EntryAttribute) -> Self {
        if let Some(node) = self.nodes.get_mut(location) {
            node.attributes.push(attribute);
        }
        self
    }

    /// Override the stat record of an existing entry; size and type are
    /// corrected to match the stored content.
    pub fn with_stat(mut self, location: &str, stat: Stat) -> Self {
        if let Some(node) = self.nodes.get_mut(location) {
            let entry_type = node.entry_type;
            let size = node
                .streams
                .get("")
                .map(|content| content.len() as u64)
                .unwrap_or(0);
            node.stat = Stat {
                entry_type: Some(entry_type),
                size,
                ..stat
            };
        }
        self
    }

    /// Finish the hierarchy.
    pub fn build(mut self) -> FakeFileSystem {
        for (index, node) in self.nodes.values_mut().enumerate() {
            if node.stat.identifier == 0 {
                node.stat.identifier = index as u64 + 1;
            }
        }
        FakeFileSystem {
            inner: Arc::new(Inner { nodes: self.nodes }),
        }
    }
}

struct Inner {
    nodes: BTreeMap<String, FakeNode>,
}

impl Inner {
    fn entry(self: &Arc<Self>, location: &str) -> Result<FakeFileEntry, VfsError> {
        if !self.nodes.contains_key(location) {
            return Err(VfsError::NotFound {
                location: location.to_string(),
            });
        }
        Ok(FakeFileEntry {
            inner: Arc::clone(self),
            location: location.to_string(),
            spec: PathSpec::fake(location),
        })
    }
}

/// An in-memory hierarchy addressed by `FAKE` specifications.
///
/// Cheap to clone; clones share the node table.
#[derive(Clone)]
pub struct FakeFileSystem {
    inner: Arc<Inner>,
}

impl FileSystem for FakeFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Fake
    }

    fn root_entry(&self) -> Result<Box<dyn FileEntry>, VfsError> {
        Ok(Box::new(self.inner.entry("/")?))
    }

    fn entry_by_spec(&self, spec: &PathSpec) -> Result<Box<dyn FileEntry>, VfsError> {
        let location = spec.location().ok_or_else(|| VfsError::PathSpec {
            reason: "FAKE specification requires a location".into(),
        })?;
        Ok(Box::new(self.inner.entry(location)?))
    }
}

/// One node of a fake hierarchy.
pub struct FakeFileEntry {
    inner: Arc<Inner>,
    location: String,
    spec: PathSpec,
}

impl FakeFileEntry {
    fn node(&self) -> &FakeNode {
        &self.inner.nodes[&self.location]
    }
}

impl FileEntry for FakeFileEntry {
    fn name(&self) -> &str {
        location_name(&self.location)
    }

    fn path_spec(&self) -> &PathSpec {
        &self.spec
    }

    fn entry_type(&self) -> EntryType {
        self.node().entry_type
    }

    fn stat(&self) -> Result<Stat, VfsError> {
        Ok(self.node().stat.clone())
    }

    fn sub_entries(&self) -> Result<EntryIter, VfsError> {
        let location = self.location.clone();
        let children: Vec<String> = self
            .inner
            .nodes
            .keys()
            .filter(|candidate| {
                candidate.as_str() != location
                    && location_parent(candidate).as_deref() == Some(location.as_str())
            })
            .cloned()
            .collect();
        let inner = Arc::clone(&self.inner);
        Ok(EntryIter::new(children.into_iter().map(move |child| {
            inner
                .entry(&child)
                .map(|entry| Box::new(entry) as Box<dyn FileEntry>)
        })))
    }

    fn data_streams(&self) -> Result<Vec<DataStreamInfo>, VfsError> {
        Ok(self
            .node()
            .streams
            .keys()
            .map(|name| DataStreamInfo { name: name.clone() })
            .collect())
    }

    fn attributes(&self) -> Result<Vec<EntryAttribute>, VfsError> {
        Ok(self.node().attributes.clone())
    }

    fn link_target(&self) -> Result<Option<String>, VfsError> {
        Ok(self.node().link_target.clone())
    }

    fn file_object(&self, data_stream: Option<&str>) -> Result<Box<dyn FileObject>, VfsError> {
        let name = data_stream.unwrap_or("");
        let content = self.node().streams.get(name).ok_or_else(|| {
            VfsError::NotFound {
                location: format!("{}:{name}", self.location),
            }
        })?;
        Ok(Box::new(MemoryStream::new(Arc::clone(content))))
    }

    fn parent_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        match location_parent(&self.location) {
            Some(parent) => Ok(Some(Box::new(self.inner.entry(&parent)?))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FileObjectExt;

    fn sample() -> FakeFileSystem {
        FakeFileSystemBuilder::new()
            .add_file("/etc/hosts", b"127.0.0.1 localhost\n".to_vec())
            .add_file("/etc/motd", b"welcome".to_vec())
            .add_named_stream("/etc/motd", "rsrc", b"fork".to_vec())
            .add_symlink("/etc/alias", "/etc/hosts")
            .add_directory("/var/log")
            .build()
    }

    #[test]
    fn lookup_and_read() {
        let fs = sample();
        let entry = fs.entry_by_spec(&PathSpec::fake("/etc/hosts")).unwrap();
        assert_eq!(entry.name(), "hosts");
        let mut stream = entry.file_object(None).unwrap();
        assert_eq!(stream.read_to_end().unwrap(), b"127.0.0.1 localhost\n");
    }

    #[test]
    fn implicit_parents_exist() {
        let fs = sample();
        assert!(fs.exists_by_spec(&PathSpec::fake("/etc")).unwrap());
        assert!(fs.exists_by_spec(&PathSpec::fake("/var")).unwrap());
    }

    #[test]
    fn sub_entries_are_sorted_and_restartable() {
        let fs = sample();
        let root = fs.root_entry().unwrap();
        let names: Vec<String> = root
            .sub_entries()
            .unwrap()
            .map(|entry| entry.unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["etc", "var"]);

        let etc = fs.entry_by_spec(&PathSpec::fake("/etc")).unwrap();
        let children: Vec<String> = etc
            .sub_entries()
            .unwrap()
            .map(|entry| entry.unwrap().name().to_string())
            .collect();
        assert_eq!(children, vec!["alias", "hosts", "motd"]);

        let again: Vec<String> = etc
            .sub_entries()
            .unwrap()
            .map(|entry| entry.unwrap().name().to_string())
            .collect();
        assert_eq!(children, again);
    }

    #[test]
    fn named_streams_enumerate_and_open() {
        let fs = sample();
        let entry = fs.entry_by_spec(&PathSpec::fake("/etc/motd")).unwrap();
        let streams = entry.data_streams().unwrap();
        let names: Vec<&str> = streams.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["", "rsrc"]);

        let mut fork = entry.file_object(Some("rsrc")).unwrap();
        assert_eq!(fork.read_to_end().unwrap(), b"fork");

        let err = entry.file_object(Some("missing")).unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[test]
    fn symlink_reports_target() {
        let fs = sample();
        let entry = fs.entry_by_spec(&PathSpec::fake("/etc/alias")).unwrap();
        assert_eq!(entry.entry_type(), EntryType::Link);
        assert_eq!(entry.link_target().unwrap().unwrap(), "/etc/hosts");
    }

    #[test]
    fn identifiers_are_assigned() {
        let fs = sample();
        let hosts = fs.entry_by_spec(&PathSpec::fake("/etc/hosts")).unwrap();
        let motd = fs.entry_by_spec(&PathSpec::fake("/etc/motd")).unwrap();
        let id_a = hosts.stat().unwrap().identifier;
        let id_b = motd.stat().unwrap().identifier;
        assert_ne!(id_a, 0);
        assert_ne!(id_b, 0);
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn parent_entry_walks_up() {
        let fs = sample();
        let entry = fs.entry_by_spec(&PathSpec::fake("/etc/hosts")).unwrap();
        let parent = entry.parent_entry().unwrap().unwrap();
        assert_eq!(parent.name(), "etc");
        let root = parent.parent_entry().unwrap().unwrap();
        assert!(root.parent_entry().unwrap().is_none());
    }
}
