//! Partitions presented as file entries.

use std::sync::Arc;

use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{FileObject, SharedParent, SharedRangeStream};
use crate::vfs::{EntryIter, EntryType, FileEntry, FileSystem, Stat};
use crate::VfsError;

/// One partition of a volume system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Zero-based partition index.
    pub index: usize,
    /// Entry location, `/p1`, `/p2`, … (one-based, discovery order).
    pub location: String,
    /// Partition label or type name, when the table stores one.
    pub label: Option<String>,
    /// Byte offset of the partition inside the parent stream.
    pub start: u64,
    /// Partition size in bytes.
    pub size: u64,
}

impl Partition {
    /// Create a partition record with the conventional `/pN` location.
    pub fn new(index: usize, start: u64, size: u64, label: Option<String>) -> Self {
        Self {
            index,
            location: format!("/p{}", index + 1),
            label,
            start,
            size,
        }
    }
}

struct Inner {
    indicator: TypeIndicator,
    partitions: Vec<Partition>,
    parent: SharedParent,
    parent_spec: PathSpec,
}

impl Inner {
    fn spec_for(&self, location: &str) -> PathSpec {
        PathSpec::builder(self.indicator)
            .parent(self.parent_spec.clone())
            .text("location", location)
            .build()
            .expect("volume locations are valid by construction")
    }
}

/// A volume system (MBR, GPT, …) presented as a one-level hierarchy: the
/// root directory holds one file entry per partition, each readable as a
/// window over the parent stream.
///
/// Shared by the built-in partition-table back-ends; external volume-system
/// decoders are free to serve their own [`FileSystem`] shape instead.
#[derive(Clone)]
pub struct PartitionFileSystem {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PartitionFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionFileSystem").finish_non_exhaustive()
    }
}

impl PartitionFileSystem {
    /// Assemble a volume system over `parent`.
    ///
    /// `parent_spec` is the chain addressing the parent stream; entry
    /// specifications are built by stacking `indicator` onto it.
    pub fn new(
        indicator: TypeIndicator,
        partitions: Vec<Partition>,
        parent: SharedParent,
        parent_spec: PathSpec,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                indicator,
                partitions,
                parent,
                parent_spec,
            }),
        }
    }

    /// The partitions in table order.
    pub fn partitions(&self) -> &[Partition] {
        &self.inner.partitions
    }

    fn partition_entry(&self, partition: &Partition) -> PartitionEntry {
        PartitionEntry {
            inner: Arc::clone(&self.inner),
            spec: self.inner.spec_for(&partition.location),
            partition: Some(partition.clone()),
        }
    }
}

impl FileSystem for PartitionFileSystem {
    fn type_indicator(&self) -> TypeIndicator {
        self.inner.indicator
    }

    fn root_entry(&self) -> Result<Box<dyn FileEntry>, VfsError> {
        Ok(Box::new(PartitionEntry {
            inner: Arc::clone(&self.inner),
            spec: self.inner.spec_for("/"),
            partition: None,
        }))
    }

    fn entry_by_spec(&self, spec: &PathSpec) -> Result<Box<dyn FileEntry>, VfsError> {
        if let Some(index) = spec
            .uint("part_index")
            .or_else(|| spec.uint("volume_index"))
            .or_else(|| spec.uint("store_index"))
        {
            let partition =
                self.inner
                    .partitions
                    .get(index as usize)
                    .ok_or_else(|| VfsError::NotFound {
                        location: format!("partition index {index}"),
                    })?;
            return Ok(Box::new(self.partition_entry(partition)));
        }
        match spec.location() {
            None | Some("/") => self.root_entry(),
            Some(location) => {
                let partition = self
                    .inner
                    .partitions
                    .iter()
                    .find(|partition| partition.location == location)
                    .ok_or_else(|| VfsError::NotFound {
                        location: location.to_string(),
                    })?;
                Ok(Box::new(self.partition_entry(partition)))
            }
        }
    }
}

/// The root of a volume system, or one of its partitions.
pub struct PartitionEntry {
    inner: Arc<Inner>,
    spec: PathSpec,
    /// `None` for the root entry.
    partition: Option<Partition>,
}

impl FileEntry for PartitionEntry {
    fn name(&self) -> &str {
        match &self.partition {
            Some(partition) => partition.location.trim_start_matches('/'),
            None => "",
        }
    }

    fn path_spec(&self) -> &PathSpec {
        &self.spec
    }

    fn entry_type(&self) -> EntryType {
        match self.partition {
            Some(_) => EntryType::File,
            None => EntryType::Directory,
        }
    }

    fn stat(&self) -> Result<Stat, VfsError> {
        let mut stat = Stat {
            entry_type: Some(self.entry_type()),
            ..Stat::default()
        };
        if let Some(partition) = &self.partition {
            stat.size = partition.size;
            stat.identifier = partition.index as u64;
        }
        Ok(stat)
    }

    fn sub_entries(&self) -> Result<EntryIter, VfsError> {
        if self.partition.is_some() {
            return Ok(EntryIter::empty());
        }
        let inner = Arc::clone(&self.inner);
        let partitions = self.inner.partitions.clone();
        Ok(EntryIter::new(partitions.into_iter().map(move |partition| {
            let spec = inner.spec_for(&partition.location);
            Ok(Box::new(PartitionEntry {
                inner: Arc::clone(&inner),
                spec,
                partition: Some(partition),
            }) as Box<dyn FileEntry>)
        })))
    }

    fn file_object(&self, data_stream: Option<&str>) -> Result<Box<dyn FileObject>, VfsError> {
        let partition = self.partition.as_ref().ok_or_else(|| VfsError::InvalidData {
            details: "volume system root has no data stream".into(),
        })?;
        if data_stream.is_some_and(|name| !name.is_empty()) {
            return Err(VfsError::NotFound {
                location: format!("{}:{}", partition.location, data_stream.unwrap_or("")),
            });
        }
        Ok(Box::new(SharedRangeStream::new(
            Arc::clone(&self.inner.parent),
            partition.start,
            partition.size,
        )))
    }

    fn parent_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        match self.partition {
            Some(_) => Ok(Some(Box::new(PartitionEntry {
                inner: Arc::clone(&self.inner),
                spec: self.inner.spec_for("/"),
                partition: None,
            }))),
            None => Ok(None),
        }
    }
}
