//! zip archive back-end.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{FileObject, MemoryStream, StreamReader};
use crate::vfs::{
    location_name, location_parent, EntryIter, EntryType, FileEntry, FileSystem, Stat, Timestamp,
};
use crate::VfsError;

type Archive = zip::ZipArchive<StreamReader<Box<dyn FileObject>>>;

#[derive(Clone)]
struct ZipNode {
    entry_type: EntryType,
    size: u64,
    /// Member index for extraction; `None` for synthesized directories.
    member_index: Option<usize>,
    modification_time: Option<Timestamp>,
    mode: Option<u32>,
    identifier: u64,
}

impl ZipNode {
    fn directory(identifier: u64) -> Self {
        Self {
            entry_type: EntryType::Directory,
            size: 0,
            member_index: None,
            modification_time: None,
            mode: None,
            identifier,
        }
    }
}

/// Days from 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let adjusted_year = if month <= 2 { year - 1 } else { year };
    let era = adjusted_year.div_euclid(400);
    let year_of_era = adjusted_year - era * 400;
    let month_shifted = ((month + 9) % 12) as i64;
    let day_of_year = (153 * month_shifted + 2) / 5 + day as i64 - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146097 + day_of_era - 719468
}

/// MS-DOS timestamps are local time with no recorded zone; the converted
/// value keeps `utc_offset_minutes: None` to say so.
fn timestamp_of(datetime: zip::DateTime) -> Timestamp {
    let days = days_from_civil(
        datetime.year() as i64,
        datetime.month() as u32,
        datetime.day() as u32,
    );
    let secs = days * 86_400
        + datetime.hour() as i64 * 3_600
        + datetime.minute() as i64 * 60
        + datetime.second() as i64;
    Timestamp::from_unix(secs)
}

fn normalize_member_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("/{trimmed}"))
}

struct Inner {
    nodes: BTreeMap<String, ZipNode>,
    archive: Mutex<Archive>,
    parent_spec: PathSpec,
}

impl Inner {
    fn spec_for(&self, location: &str) -> PathSpec {
        PathSpec::builder(TypeIndicator::Zip)
            .parent(self.parent_spec.clone())
            .text("location", location)
            .build()
            .expect("zip locations are valid by construction")
    }

    fn entry(self: &Arc<Self>, location: &str) -> Result<ZipFileEntry, VfsError> {
        if !self.nodes.contains_key(location) {
            return Err(VfsError::NotFound {
                location: location.to_string(),
            });
        }
        Ok(ZipFileEntry {
            inner: Arc::clone(self),
            location: location.to_string(),
            spec: self.spec_for(location),
        })
    }
}

/// A zip archive presented as a file system.
///
/// The central directory is read once at open time. Member data is
/// decompressed on demand into memory, bounded by the member size, because
/// the inner decompressor borrows the archive.
#[derive(Clone)]
pub struct ZipFileSystem {
    inner: Arc<Inner>,
}

impl ZipFileSystem {
    /// Read the central directory of the archive in `parent`.
    pub fn open(parent: Box<dyn FileObject>, spec: &PathSpec) -> Result<Self, VfsError> {
        let parent_spec = spec.parent().cloned().ok_or_else(|| VfsError::PathSpec {
            reason: "ZIP requires a parent chain".into(),
        })?;

        let mut archive =
            zip::ZipArchive::new(StreamReader::new(parent)).map_err(|err| VfsError::InvalidData {
                details: format!("not a zip archive: {err}"),
            })?;

        let mut nodes: BTreeMap<String, ZipNode> = BTreeMap::new();
        nodes.insert("/".to_string(), ZipNode::directory(0));
        let mut identifier = 0u64;
        for index in 0..archive.len() {
            let member = archive.by_index(index).map_err(|err| VfsError::InvalidData {
                details: format!("zip member {index} unreadable: {err}"),
            })?;
            let Some(location) = normalize_member_path(member.name()) else {
                continue;
            };
            identifier += 1;
            let node = if member.is_dir() {
                let mut directory = ZipNode::directory(identifier);
                directory.modification_time = member.last_modified().map(timestamp_of);
                directory
            } else {
                ZipNode {
                    entry_type: EntryType::File,
                    size: member.size(),
                    member_index: Some(index),
                    modification_time: member.last_modified().map(timestamp_of),
                    mode: member.unix_mode().map(|mode| mode & 0o7777),
                    identifier,
                }
            };
            drop(member);
            nodes.insert(location.clone(), node);

            let mut current = location_parent(&location);
            while let Some(parent_location) = current {
                if nodes.contains_key(&parent_location) {
                    break;
                }
                identifier += 1;
                nodes.insert(parent_location.clone(), ZipNode::directory(identifier));
                current = location_parent(&parent_location);
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                nodes,
                archive: Mutex::new(archive),
                parent_spec,
            }),
        })
    }
}

impl FileSystem for ZipFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Zip
    }

    fn root_entry(&self) -> Result<Box<dyn FileEntry>, VfsError> {
        Ok(Box::new(self.inner.entry("/")?))
    }

    fn entry_by_spec(&self, spec: &PathSpec) -> Result<Box<dyn FileEntry>, VfsError> {
        let location = spec.location().ok_or_else(|| VfsError::PathSpec {
            reason: "ZIP specification requires a location".into(),
        })?;
        Ok(Box::new(self.inner.entry(location)?))
    }
}

/// One member (or synthesized directory) of a zip archive.
pub struct ZipFileEntry {
    inner: Arc<Inner>,
    location: String,
    spec: PathSpec,
}

impl ZipFileEntry {
    fn node(&self) -> &ZipNode {
        &self.inner.nodes[&self.location]
    }
}

impl FileEntry for ZipFileEntry {
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

    fn file_object(&self, data_stream: Option<&str>) -> Result<Box<dyn FileObject>, VfsError> {
        if data_stream.is_some_and(|name| !name.is_empty()) {
            return Err(VfsError::NotFound {
                location: format!("{}:{}", self.location, data_stream.unwrap_or("")),
            });
        }
        let node = self.node();
        let Some(index) = node.member_index else {
            return Err(VfsError::InvalidData {
                details: format!("{} has no data stream", self.location),
            });
        };
        let mut archive = self
            .inner
            .archive
            .lock()
            .map_err(|_| VfsError::BackEnd("zip archive poisoned".into()))?;
        let mut member = archive.by_index(index).map_err(|err| VfsError::InvalidData {
            details: format!("zip member {index} unreadable: {err}"),
        })?;
        let mut content = Vec::with_capacity(node.size as usize);
        member
            .read_to_end(&mut content)
            .map_err(|err| VfsError::InvalidData {
                details: format!("zip member decompression failed: {err}"),
            })?;
        Ok(Box::new(MemoryStream::new(content)))
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
    use std::io::Write;

    fn build_archive() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);
        writer.start_file("docs/guide.txt", options).unwrap();
        writer.write_all(b"zip contents here").unwrap();
        writer.start_file("top.txt", options).unwrap();
        writer.write_all(b"root file").unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn zip_spec() -> PathSpec {
        PathSpec::builder(TypeIndicator::Zip)
            .parent(PathSpec::os("/bundle.zip"))
            .text("location", "/")
            .build()
            .unwrap()
    }

    fn member_spec(location: &str) -> PathSpec {
        PathSpec::builder(TypeIndicator::Zip)
            .parent(PathSpec::os("/bundle.zip"))
            .text("location", location)
            .build()
            .unwrap()
    }

    fn open_sample() -> ZipFileSystem {
        ZipFileSystem::open(Box::new(MemoryStream::new(build_archive())), &zip_spec()).unwrap()
    }

    #[test]
    fn members_resolve_and_read() {
        let fs = open_sample();
        let entry = fs.entry_by_spec(&member_spec("/docs/guide.txt")).unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.stat().unwrap().size, 17);

        let mut stream = entry.file_object(None).unwrap();
        assert_eq!(stream.read_to_end().unwrap(), b"zip contents here");
    }

    #[test]
    fn intermediate_directories_are_synthesized() {
        let fs = open_sample();
        let docs = fs.entry_by_spec(&member_spec("/docs")).unwrap();
        assert!(docs.is_directory());

        let root = fs.root_entry().unwrap();
        let names: Vec<String> = root
            .sub_entries()
            .unwrap()
            .map(|entry| entry.unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["docs", "top.txt"]);
    }

    #[test]
    fn unix_mode_survives() {
        let fs = open_sample();
        let stat = fs
            .entry_by_spec(&member_spec("/top.txt"))
            .unwrap()
            .stat()
            .unwrap();
        assert_eq!(stat.mode, Some(0o644));
    }

    #[test]
    fn not_a_zip_is_invalid_data() {
        let result = ZipFileSystem::open(
            Box::new(MemoryStream::new(b"definitely not zipped".to_vec())),
            &zip_spec(),
        );
        assert!(matches!(result, Err(VfsError::InvalidData { .. })));
    }

    #[test]
    fn dos_datetime_conversion() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(1970, 1, 2), 1);
        assert_eq!(days_from_civil(2000, 3, 1), 11017);
    }
}
