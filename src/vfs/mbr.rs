//! Master Boot Record volume system.

use std::sync::{Arc, Mutex};

use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{FileObject, FileObjectExt, SharedParent};
use crate::vfs::{Partition, PartitionFileSystem};
use crate::VfsError;

const SECTOR_SIZE: u64 = 512;
const PARTITION_TABLE_OFFSET: usize = 446;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
const PARTITION_RECORD_SIZE: usize = 16;

/// Partition types marking an extended partition container.
const EXTENDED_TYPES: [u8; 2] = [0x05, 0x0F];
/// The protective partition type a GPT disk places in its legacy MBR.
pub(crate) const GPT_PROTECTIVE_TYPE: u8 = 0xEE;

#[derive(Debug, Clone, Copy)]
struct PartitionRecord {
    type_code: u8,
    lba_start: u32,
    num_sectors: u32,
}

impl PartitionRecord {
    fn parse(raw: &[u8]) -> Self {
        Self {
            type_code: raw[4],
            lba_start: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
            num_sectors: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        }
    }

    fn is_empty(&self) -> bool {
        self.type_code == 0 && self.lba_start == 0 && self.num_sectors == 0
    }

    fn is_extended(&self) -> bool {
        EXTENDED_TYPES.contains(&self.type_code)
    }
}

fn read_table(sector: &[u8]) -> Result<[PartitionRecord; 4], VfsError> {
    if sector[510..512] != BOOT_SIGNATURE {
        return Err(VfsError::InvalidData {
            details: "missing 0x55AA boot signature".into(),
        });
    }
    let mut records = [PartitionRecord {
        type_code: 0,
        lba_start: 0,
        num_sectors: 0,
    }; 4];
    for (index, record) in records.iter_mut().enumerate() {
        let start = PARTITION_TABLE_OFFSET + index * PARTITION_RECORD_SIZE;
        *record = PartitionRecord::parse(&sector[start..start + PARTITION_RECORD_SIZE]);
    }
    Ok(records)
}

/// Whether the boot sector describes only a GPT protective partition.
///
/// Used by the analyzer's structural check so a GPT disk is not also
/// reported as an MBR volume system.
pub(crate) fn is_protective_mbr(sector: &[u8]) -> bool {
    let Ok(records) = read_table(sector) else {
        return false;
    };
    let mut seen_protective = false;
    for record in &records {
        if record.is_empty() {
            continue;
        }
        if record.type_code == GPT_PROTECTIVE_TYPE {
            seen_protective = true;
        } else {
            return false;
        }
    }
    seen_protective
}

/// Parse the partition table at the start of `parent` and present its
/// partitions as a volume system.
///
/// Primary partitions come first; logical partitions inside an extended
/// partition are discovered by walking the EBR chain and appended in chain
/// order. `spec` is the chain addressing this volume-system layer (its
/// parent addresses the raw image).
pub fn open_mbr(
    mut parent: Box<dyn FileObject>,
    spec: &PathSpec,
) -> Result<PartitionFileSystem, VfsError> {
    let parent_spec = spec.parent().cloned().ok_or_else(|| VfsError::PathSpec {
        reason: "MBR requires a parent chain".into(),
    })?;
    let mut sector = [0u8; SECTOR_SIZE as usize];
    parent.read_exact_at(0, &mut sector)?;
    let records = read_table(&sector)?;

    let mut partitions = Vec::new();
    let mut extended_start: Option<u64> = None;
    for record in &records {
        if record.is_empty() {
            continue;
        }
        if record.is_extended() {
            extended_start = Some(record.lba_start as u64 * SECTOR_SIZE);
            continue;
        }
        partitions.push(Partition::new(
            partitions.len(),
            record.lba_start as u64 * SECTOR_SIZE,
            record.num_sectors as u64 * SECTOR_SIZE,
            Some(format!("0x{:02x}", record.type_code)),
        ));
    }

    // Logical partitions: each EBR holds one partition record relative to
    // itself and one link record relative to the extended partition start.
    if let Some(extended_base) = extended_start {
        let mut ebr_offset = extended_base;
        // A malformed chain must not loop forever.
        for _ in 0..128 {
            let mut ebr = [0u8; SECTOR_SIZE as usize];
            parent.read_exact_at(ebr_offset, &mut ebr)?;
            let chain = read_table(&ebr).map_err(|_| VfsError::CorruptVolume {
                details: format!("extended boot record at {ebr_offset} has no signature"),
            })?;
            let logical = chain[0];
            if !logical.is_empty() {
                partitions.push(Partition::new(
                    partitions.len(),
                    ebr_offset + logical.lba_start as u64 * SECTOR_SIZE,
                    logical.num_sectors as u64 * SECTOR_SIZE,
                    Some(format!("0x{:02x}", logical.type_code)),
                ));
            }
            let link = chain[1];
            if link.is_empty() {
                break;
            }
            ebr_offset = extended_base + link.lba_start as u64 * SECTOR_SIZE;
        }
    }

    let shared: SharedParent = Arc::new(Mutex::new(parent));
    Ok(PartitionFileSystem::new(
        TypeIndicator::Mbr,
        partitions,
        shared,
        parent_spec,
    ))
}
