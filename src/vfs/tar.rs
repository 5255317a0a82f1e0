//! tar archive back-end.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{FileObject, SharedParent, SharedRangeStream, StreamReader};
use crate::vfs::{
    location_name, location_parent, EntryIter, EntryType, FileEntry, FileSystem, Stat, Timestamp,
};
use crate::VfsError;

#[derive(Clone)]
struct TarNode {
    entry_type: EntryType,
    size: u64,
    /// Byte offset of the member data inside the archive.
    data_offset: u64,
    modification_time: Option<Timestamp>,
    owner: Option<u32>,
    group: Option<u32>,
    mode: Option<u32>,
    link_target: Option<String>,
    identifier: u64,
}

impl TarNode {
    fn directory(identifier: u64) -> Self {
        Self {
            entry_type: EntryType::Directory,
            size: 0,
            data_offset: 0,
            modification_time: None,
            owner: None,
            group: None,
            mode: None,
            link_target: None,
            identifier,
        }
    }
}

fn normalize_member_path(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("/{trimmed}"))
}

fn entry_type_of(kind: tar::EntryType) -> EntryType {
    match kind {
        tar::EntryType::Directory => EntryType::Directory,
        tar::EntryType::Symlink | tar::EntryType::Link => EntryType::Link,
        tar::EntryType::Block | tar::EntryType::Char => EntryType::Device,
        tar::EntryType::Fifo => EntryType::Pipe,
        _ => EntryType::File,
    }
}

struct Inner {
    nodes: BTreeMap<String, TarNode>,
    parent: SharedParent,
    parent_spec: PathSpec,
}

impl Inner {
    fn spec_for(&self, location: &str) -> PathSpec {
        PathSpec::builder(TypeIndicator::Tar)
            .parent(self.parent_spec.clone())
            .text("location", location)
            .build()
            .expect("tar locations are valid by construction")
    }

    fn entry(self: &Arc<Self>, location: &str) -> Result<TarFileEntry, VfsError> {
        if !self.nodes.contains_key(location) {
            return Err(VfsError::NotFound {
                location: location.to_string(),
            });
        }
        Ok(TarFileEntry {
            inner: Arc::clone(self),
            location: location.to_string(),
            spec: self.spec_for(location),
        })
    }
}

/// A tar archive presented as a file system.
///
/// The member table is read once at open time; member data is served as
/// windows over the shared archive stream, so no member is materialized.
#[derive(Clone)]
pub struct TarFileSystem {
    inner: Arc<Inner>,
}

impl TarFileSystem {
    /// Read the member table of the archive in `parent`.
    ///
    /// `spec` is the chain addressing this archive layer; entry
    /// specifications stack on its parent.
    pub fn open(parent: Box<dyn FileObject>, spec: &PathSpec) -> Result<Self, VfsError> {
        let parent_spec = spec.parent().cloned().ok_or_else(|| VfsError::PathSpec {
            reason: "TAR requires a parent chain".into(),
        })?;

        let mut archive = tar::Archive::new(StreamReader::new(parent));
        let mut nodes: BTreeMap<String, TarNode> = BTreeMap::new();
        nodes.insert("/".to_string(), TarNode::directory(0));

        let mut identifier = 0u64;
        {
            let members = archive.entries().map_err(|err| VfsError::InvalidData {
                details: format!("not a tar archive: {err}"),
            })?;
            for member in members {
                let member = member.map_err(|err| VfsError::InvalidData {
                    details: format!("tar member read failed: {err}"),
                })?;
                let raw_path = member
                    .path()
                    .map_err(|err| VfsError::InvalidData {
                        details: format!("tar member path invalid: {err}"),
                    })?
                    .to_string_lossy()
                    .into_owned();
                let Some(location) = normalize_member_path(&raw_path) else {
                    continue;
                };
                let header = member.header();
                identifier += 1;
                let node = TarNode {
                    entry_type: entry_type_of(header.entry_type()),
                    size: header.size().unwrap_or(0),
                    data_offset: member.raw_file_position(),
                    modification_time: header.mtime().ok().map(|secs| {
                        Timestamp::from_unix(secs as i64)
                    }),
                    owner: header.uid().ok().map(|uid| uid as u32),
                    group: header.gid().ok().map(|gid| gid as u32),
                    mode: header.mode().ok(),
                    link_target: member
                        .link_name()
                        .ok()
                        .flatten()
                        .map(|target| target.to_string_lossy().into_owned()),
                    identifier,
                };
                nodes.insert(location.clone(), node);

                // Archives routinely omit explicit directory members.
                let mut current = location_parent(&location);
                while let Some(parent_location) = current {
                    if nodes.contains_key(&parent_location) {
                        break;
                    }
                    identifier += 1;
                    nodes.insert(parent_location.clone(), TarNode::directory(identifier));
                    current = location_parent(&parent_location);
                }
            }
        }

        let parent = archive.into_inner().into_inner();
        Ok(Self {
            inner: Arc::new(Inner {
                nodes,
                parent: Arc::new(Mutex::new(parent)),
                parent_spec,
            }),
        })
    }
}

impl FileSystem for TarFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Tar
    }

    fn root_entry(&self) -> Result<Box<dyn FileEntry>, VfsError> {
        Ok(Box::new(self.inner.entry("/")?))
    }

    fn entry_by_spec(&self, spec: &PathSpec) -> Result<Box<dyn FileEntry>, VfsError> {
        let location = spec.location().ok_or_else(|| VfsError::PathSpec {
            reason: "TAR specification requires a location".into(),
        })?;
        Ok(Box::new(self.inner.entry(location)?))
    }
}

/// One member (or synthesized directory) of a tar archive.
pub struct TarFileEntry {
    inner: Arc<Inner>,
    location: String,
    spec: PathSpec,
}

impl TarFileEntry {
    fn node(&self) -> &TarNode {
        &self.inner.nodes[&self.location]
    }
}

impl FileEntry for TarFileEntry {
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
        let node = self.node();
        Ok(Stat {
            entry_type: Some(node.entry_type),
            size: node.size,
            modification_time: node.modification_time,
            owner: node.owner,
            group: node.group,
            mode: node.mode,
            identifier: node.identifier,
            ..Stat::default()
        })
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

    fn link_target(&self) -> Result<Option<String>, VfsError> {
        Ok(self.node().link_target.clone())
    }

    fn file_object(&self, data_stream: Option<&str>) -> Result<Box<dyn FileObject>, VfsError> {
        if data_stream.is_some_and(|name| !name.is_empty()) {
            return Err(VfsError::NotFound {
                location: format!("{}:{}", self.location, data_stream.unwrap_or("")),
            });
        }
        let node = self.node();
        if node.entry_type != EntryType::File {
            return Err(VfsError::InvalidData {
                details: format!("{} has no data stream", self.location),
            });
        }
        Ok(Box::new(SharedRangeStream::new(
            Arc::clone(&self.inner.parent),
            node.data_offset,
            node.size,
        )))
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
    use crate::stream::{FileObjectExt, MemoryStream};

    fn build_archive() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut header = tar::Header::new_gnu();
        header.set_size(6);
        header.set_mode(0o644);
        header.set_uid(1000);
        header.set_gid(1000);
        header.set_mtime(1_600_000_000);
        header.set_cksum();
        builder
            .append_data(&mut header, "var/log/syslog", &b"lines\n"[..])
            .unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_size(3);
        header.set_mode(0o600);
        header.set_mtime(1_600_000_100);
        header.set_cksum();
        builder.append_data(&mut header, "etc/motd", &b"hi\n"[..]).unwrap();

        builder.into_inner().unwrap()
    }

    fn tar_spec() -> PathSpec {
        PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/logs.tar"))
            .text("location", "/")
            .build()
            .unwrap()
    }

    fn open_sample() -> TarFileSystem {
        TarFileSystem::open(Box::new(MemoryStream::new(build_archive())), &tar_spec()).unwrap()
    }

    #[test]
    fn members_resolve_and_read() {
        let fs = open_sample();
        let spec = PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/logs.tar"))
            .text("location", "/var/log/syslog")
            .build()
            .unwrap();
        let entry = fs.entry_by_spec(&spec).unwrap();
        assert_eq!(entry.name(), "syslog");
        assert!(entry.is_file());

        let mut stream = entry.file_object(None).unwrap();
        assert_eq!(stream.read_to_end().unwrap(), b"lines\n");
    }

    #[test]
    fn stat_carries_header_fields() {
        let fs = open_sample();
        let spec = PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/logs.tar"))
            .text("location", "/var/log/syslog")
            .build()
            .unwrap();
        let stat = fs.entry_by_spec(&spec).unwrap().stat().unwrap();
        assert_eq!(stat.size, 6);
        assert_eq!(stat.mode, Some(0o644));
        assert_eq!(stat.owner, Some(1000));
        assert_eq!(
            stat.modification_time,
            Some(Timestamp::from_unix(1_600_000_000))
        );
    }

    #[test]
    fn intermediate_directories_are_synthesized() {
        let fs = open_sample();
        let root = fs.root_entry().unwrap();
        let names: Vec<String> = root
            .sub_entries()
            .unwrap()
            .map(|entry| entry.unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["etc", "var"]);

        let spec = PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/logs.tar"))
            .text("location", "/var/log")
            .build()
            .unwrap();
        assert!(fs.entry_by_spec(&spec).unwrap().is_directory());
    }

    #[test]
    fn two_member_streams_are_independent() {
        let fs = open_sample();
        let syslog_spec = PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/logs.tar"))
            .text("location", "/var/log/syslog")
            .build()
            .unwrap();
        let motd_spec = PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/logs.tar"))
            .text("location", "/etc/motd")
            .build()
            .unwrap();

        let mut a = fs
            .entry_by_spec(&syslog_spec)
            .unwrap()
            .file_object(None)
            .unwrap();
        let mut b = fs
            .entry_by_spec(&motd_spec)
            .unwrap()
            .file_object(None)
            .unwrap();

        let mut buf = [0u8; 2];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"li");
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ne");
    }

    #[test]
    fn not_a_tar_is_invalid_data() {
        let result = TarFileSystem::open(
            Box::new(MemoryStream::new(vec![0x13u8; 100])),
            &tar_spec(),
        );
        assert!(matches!(result, Err(VfsError::InvalidData { .. })));
    }

    #[test]
    fn missing_member_is_not_found() {
        let fs = open_sample();
        let spec = PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/logs.tar"))
            .text("location", "/nope")
            .build()
            .unwrap();
        let err = fs.entry_by_spec(&spec).unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }
}
