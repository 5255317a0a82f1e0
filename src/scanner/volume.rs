//! Mediator-driven volume scanner.

use tracing::debug;

use crate::cancel::CancelToken;
use crate::resolver::{Context, Credential};
use crate::scanner::{ScanNode, ScanNodeState, SourceScanner};
use crate::spec::{PathSpec, TypeIndicator};
use crate::VfsError;

/// Which partitions or volumes to take from a volume system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every one.
    All,
    /// The given zero-based indices, in table order.
    Indices(Vec<usize>),
    /// Delegate the choice to the mediator.
    Ask,
}

/// Which snapshot stores to take from a shadow-store volume system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSelection {
    /// Skip snapshots entirely.
    None,
    /// Every store.
    All,
    /// The given zero-based indices.
    Indices(Vec<usize>),
    /// Delegate the choice to the mediator.
    Ask,
}

/// Whether unlocked branches are re-scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Single pass: locked volumes stay deferred even after an unlock.
    OnePass,
    /// Re-scan branches whose credentials arrived during the scan.
    Exhaustive,
}

/// Defaults controlling what the volume scanner selects without asking.
#[derive(Debug)]
pub struct VolumeScannerOptions {
    /// Partition choice for partition-table volume systems.
    pub partitions: Selection,
    /// Volume choice for container volume systems (LVM, APFS).
    pub volumes: Selection,
    /// Snapshot-store choice.
    pub snapshots: SnapshotSelection,
    /// Credentials tried against locked volumes, as (name, value).
    pub credentials: Vec<(String, Credential)>,
    /// Re-scan behavior after unlocks.
    pub scan_mode: ScanMode,
}

impl Default for VolumeScannerOptions {
    fn default() -> Self {
        Self {
            partitions: Selection::All,
            volumes: Selection::All,
            snapshots: SnapshotSelection::All,
            credentials: Vec::new(),
            scan_mode: ScanMode::OnePass,
        }
    }
}

/// Caller-supplied policy answering the scanner's interactive questions.
///
/// The defaults select everything and decline every unlock, so a
/// non-interactive scan needs no custom mediator.
pub trait ScanMediator {
    /// Choose among the partitions of `volume_spec`.
    fn select_partitions(
        &mut self,
        volume_spec: &PathSpec,
        available: &[PathSpec],
    ) -> Result<Vec<PathSpec>, VfsError> {
        let _ = volume_spec;
        Ok(available.to_vec())
    }

    /// Choose among the snapshot stores of `volume_spec`.
    fn select_snapshots(
        &mut self,
        volume_spec: &PathSpec,
        available: &[PathSpec],
    ) -> Result<Vec<PathSpec>, VfsError> {
        let _ = volume_spec;
        Ok(available.to_vec())
    }

    /// Produce a credential for a locked volume, or decline.
    fn unlock(
        &mut self,
        spec: &PathSpec,
        credential_names: &[&'static str],
    ) -> Option<(String, Credential)> {
        let _ = (spec, credential_names);
        None
    }
}

/// The do-nothing mediator: selects everything, unlocks nothing.
pub struct AutoMediator;

impl ScanMediator for AutoMediator {}

fn pick(available: &[PathSpec], indices: &[usize]) -> Vec<PathSpec> {
    indices
        .iter()
        .filter_map(|index| available.get(*index).cloned())
        .collect()
}

/// Scanner producing the chains of every user-selected file system.
pub struct VolumeScanner {
    source: SourceScanner,
    options: VolumeScannerOptions,
}

impl VolumeScanner {
    /// A volume scanner with default options.
    pub fn new(source: SourceScanner) -> Self {
        Self::with_options(source, VolumeScannerOptions::default())
    }

    /// A volume scanner with explicit options.
    pub fn with_options(source: SourceScanner, options: VolumeScannerOptions) -> Self {
        Self { source, options }
    }

    /// Scan `source` and return the chains of the selected file systems.
    ///
    /// Locked volumes are offered the option credentials first, then the
    /// mediator; an accepted credential lands in the context key chain, and
    /// in [`ScanMode::Exhaustive`] the branch is re-scanned with it.
    pub fn scan(
        &self,
        source: &PathSpec,
        context: &Context,
        mediator: &mut dyn ScanMediator,
        cancel: &CancelToken,
    ) -> Result<Vec<PathSpec>, VfsError> {
        let result = self.source.scan(source, context, cancel)?;
        let mut selected = Vec::new();
        self.collect(&result.root, context, mediator, cancel, &mut selected)?;
        debug!(count = selected.len(), "volume scan selected file systems");
        Ok(selected)
    }

    fn collect(
        &self,
        node: &ScanNode,
        context: &Context,
        mediator: &mut dyn ScanMediator,
        cancel: &CancelToken,
        selected: &mut Vec<PathSpec>,
    ) -> Result<(), VfsError> {
        cancel.check()?;
        match node.state {
            ScanNodeState::FileSystem => {
                selected.push(node.path_spec.clone());
            }
            ScanNodeState::VolumeSystem => {
                let chosen = self.choose_children(node, mediator)?;
                for child in &node.sub_nodes {
                    if chosen.contains(&child.path_spec) {
                        self.collect(child, context, mediator, cancel, selected)?;
                    }
                }
            }
            ScanNodeState::Locked => {
                self.try_unlock(node, context, mediator, cancel, selected)?;
            }
            ScanNodeState::Container => {
                for child in &node.sub_nodes {
                    self.collect(child, context, mediator, cancel, selected)?;
                }
            }
            ScanNodeState::Empty | ScanNodeState::Unknown => {}
        }
        Ok(())
    }

    /// Apply the configured selection to a volume system's children.
    fn choose_children(
        &self,
        node: &ScanNode,
        mediator: &mut dyn ScanMediator,
    ) -> Result<Vec<PathSpec>, VfsError> {
        let available: Vec<PathSpec> = node
            .sub_nodes
            .iter()
            .map(|child| child.path_spec.clone())
            .collect();

        let is_snapshot_store = node.type_indicator == Some(TypeIndicator::Vshadow);
        if is_snapshot_store {
            return match &self.options.snapshots {
                SnapshotSelection::None => Ok(Vec::new()),
                SnapshotSelection::All => Ok(available),
                SnapshotSelection::Indices(indices) => Ok(pick(&available, indices)),
                SnapshotSelection::Ask => mediator.select_snapshots(&node.path_spec, &available),
            };
        }

        let is_container_volume = matches!(
            node.type_indicator,
            Some(TypeIndicator::Lvm) | Some(TypeIndicator::ApfsContainer)
        );
        let selection = if is_container_volume {
            &self.options.volumes
        } else {
            &self.options.partitions
        };
        match selection {
            Selection::All => Ok(available),
            Selection::Indices(indices) => Ok(pick(&available, indices)),
            Selection::Ask => mediator.select_partitions(&node.path_spec, &available),
        }
    }

    fn try_unlock(
        &self,
        node: &ScanNode,
        context: &Context,
        mediator: &mut dyn ScanMediator,
        cancel: &CancelToken,
        selected: &mut Vec<PathSpec>,
    ) -> Result<(), VfsError> {
        let found = self
            .options
            .credentials
            .iter()
            .find(|(name, _)| node.credentials.contains(&name.as_str()))
            .cloned()
            .or_else(|| mediator.unlock(&node.path_spec, &node.credentials));
        let Some((name, credential)) = found else {
            return Ok(());
        };
        context
            .key_chain()
            .set(&node.path_spec, &name, credential);
        if self.options.scan_mode == ScanMode::Exhaustive {
            let rescan = self.source.scan(&node.path_spec, context, cancel)?;
            self.collect(&rescan.root, context, mediator, cancel, selected)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::SourceScanner;
    use std::io::Write;

    fn tar_of(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_ustar();
        header.set_size(payload.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, name, payload).unwrap();
        builder.into_inner().unwrap()
    }

    /// Two-partition MBR image; partition 1 holds a tar archive, partition 2
    /// holds zeros.
    fn two_partition_image() -> Vec<u8> {
        let archive = tar_of("evidence.txt", b"bytes");
        let mut image = vec![0u8; 64 * 512];
        let table = 446;
        image[table + 4] = 0x83;
        image[table + 8..table + 12].copy_from_slice(&2u32.to_le_bytes());
        image[table + 12..table + 16].copy_from_slice(&16u32.to_le_bytes());
        image[table + 16 + 4] = 0x83;
        image[table + 16 + 8..table + 16 + 12].copy_from_slice(&18u32.to_le_bytes());
        image[table + 16 + 12..table + 16 + 16].copy_from_slice(&16u32.to_le_bytes());
        image[510] = 0x55;
        image[511] = 0xAA;
        image[2 * 512..2 * 512 + archive.len()].copy_from_slice(&archive);
        // Second partition holds another archive so both are selectable.
        let second = tar_of("other.txt", b"more");
        image[18 * 512..18 * 512 + second.len()].copy_from_slice(&second);
        image
    }

    fn write_fixture(content: &[u8]) -> (tempfile::TempDir, PathSpec) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.raw");
        std::fs::File::create(&path).unwrap().write_all(content).unwrap();
        let spec = PathSpec::os(path.to_str().unwrap());
        (dir, spec)
    }

    #[test]
    fn all_partitions_by_default() {
        let (_dir, spec) = write_fixture(&two_partition_image());
        let scanner = VolumeScanner::new(SourceScanner::new());
        let specs = scanner
            .scan(&spec, &Context::new(), &mut AutoMediator, &CancelToken::new())
            .unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|fs| fs.indicator() == TypeIndicator::Tar));
    }

    #[test]
    fn index_selection_narrows_output() {
        let (_dir, spec) = write_fixture(&two_partition_image());
        let scanner = VolumeScanner::with_options(
            SourceScanner::new(),
            VolumeScannerOptions {
                partitions: Selection::Indices(vec![1]),
                ..VolumeScannerOptions::default()
            },
        );
        let specs = scanner
            .scan(&spec, &Context::new(), &mut AutoMediator, &CancelToken::new())
            .unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(
            specs[0].parent().unwrap().location(),
            Some("/p2")
        );
    }

    #[test]
    fn mediator_is_asked_when_configured() {
        struct PickFirst;
        impl ScanMediator for PickFirst {
            fn select_partitions(
                &mut self,
                _volume_spec: &PathSpec,
                available: &[PathSpec],
            ) -> Result<Vec<PathSpec>, VfsError> {
                Ok(available.first().cloned().into_iter().collect())
            }
        }

        let (_dir, spec) = write_fixture(&two_partition_image());
        let scanner = VolumeScanner::with_options(
            SourceScanner::new(),
            VolumeScannerOptions {
                partitions: Selection::Ask,
                ..VolumeScannerOptions::default()
            },
        );
        let specs = scanner
            .scan(&spec, &Context::new(), &mut PickFirst, &CancelToken::new())
            .unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].parent().unwrap().location(), Some("/p1"));
    }

    #[test]
    fn locked_volume_credentials_land_in_key_chain() {
        let mut content = vec![0u8; 1024];
        content[..6].copy_from_slice(b"LUKS\xba\xbe");
        let (_dir, spec) = write_fixture(&content);

        let context = Context::new();
        let scanner = VolumeScanner::with_options(
            SourceScanner::new(),
            VolumeScannerOptions {
                credentials: vec![("password".into(), Credential::Text("hunter2".into()))],
                ..VolumeScannerOptions::default()
            },
        );
        let specs = scanner
            .scan(&spec, &context, &mut AutoMediator, &CancelToken::new())
            .unwrap();
        // No LUKS decoder is built in, so nothing resolves; the credential
        // is still recorded for the exact chain.
        assert!(specs.is_empty());
        let locked_spec = PathSpec::builder(TypeIndicator::Luksde)
            .parent(spec)
            .build()
            .unwrap();
        assert!(context.key_chain().get(&locked_spec, "password").is_some());
    }

    #[test]
    fn mediator_unlock_is_consulted() {
        struct Unlocker {
            asked: bool,
        }
        impl ScanMediator for Unlocker {
            fn unlock(
                &mut self,
                _spec: &PathSpec,
                names: &[&'static str],
            ) -> Option<(String, Credential)> {
                self.asked = true;
                assert!(names.contains(&"password"));
                Some(("password".into(), Credential::Text("let-me-in".into())))
            }
        }

        let mut content = vec![0u8; 1024];
        content[3..11].copy_from_slice(b"-FVE-FS-");
        let (_dir, spec) = write_fixture(&content);

        let mut mediator = Unlocker { asked: false };
        let scanner = VolumeScanner::new(SourceScanner::new());
        scanner
            .scan(&spec, &Context::new(), &mut mediator, &CancelToken::new())
            .unwrap();
        assert!(mediator.asked);
    }
}
