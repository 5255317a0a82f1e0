//! GUID Partition Table volume system.

use std::sync::{Arc, Mutex};

use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{FileObject, FileObjectExt, SharedParent};
use crate::vfs::{Partition, PartitionFileSystem};
use crate::VfsError;

const SECTOR_SIZE: u64 = 512;
pub(crate) const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";

/// Header fields used for traversal; the rest of the header (CRCs, backup
/// header location) is not interpreted.
struct GptHeader {
    entries_lba: u64,
    entry_count: u32,
    entry_size: u32,
}

fn parse_header(header: &[u8]) -> Result<GptHeader, VfsError> {
    if &header[..8] != GPT_SIGNATURE {
        return Err(VfsError::InvalidData {
            details: "missing EFI PART signature".into(),
        });
    }
    let entries_lba = u64::from_le_bytes(header[72..80].try_into().expect("fixed slice"));
    let entry_count = u32::from_le_bytes(header[80..84].try_into().expect("fixed slice"));
    let entry_size = u32::from_le_bytes(header[84..88].try_into().expect("fixed slice"));
    if entry_size < 128 || entry_count > 1024 {
        return Err(VfsError::CorruptVolume {
            details: format!(
                "implausible partition entry layout: {entry_count} entries of {entry_size} bytes"
            ),
        });
    }
    Ok(GptHeader {
        entries_lba,
        entry_count,
        entry_size,
    })
}

/// Partition name: up to 36 UTF-16LE code units, zero terminated.
fn parse_name(raw: &[u8]) -> Option<String> {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|unit| *unit != 0)
        .collect();
    if units.is_empty() {
        return None;
    }
    Some(String::from_utf16_lossy(&units))
}

/// Parse the GUID partition table of `parent` and present its partitions as
/// a volume system.
///
/// The primary header at LBA 1 is used; header and entry-array CRCs are not
/// validated, implausible structure surfaces as
/// [`VfsError::CorruptVolume`].
pub fn open_gpt(
    mut parent: Box<dyn FileObject>,
    spec: &PathSpec,
) -> Result<PartitionFileSystem, VfsError> {
    let parent_spec = spec.parent().cloned().ok_or_else(|| VfsError::PathSpec {
        reason: "GPT requires a parent chain".into(),
    })?;

    let mut header = [0u8; 92];
    parent.read_exact_at(SECTOR_SIZE, &mut header)?;
    let header = parse_header(&header)?;

    let table_size = header.entry_count as usize * header.entry_size as usize;
    let mut table = vec![0u8; table_size];
    parent.read_exact_at(header.entries_lba * SECTOR_SIZE, &mut table)?;

    let mut partitions = Vec::new();
    for raw in table.chunks_exact(header.entry_size as usize) {
        let type_guid = &raw[..16];
        if type_guid.iter().all(|byte| *byte == 0) {
            continue;
        }
        let first_lba = u64::from_le_bytes(raw[32..40].try_into().expect("fixed slice"));
        let last_lba = u64::from_le_bytes(raw[40..48].try_into().expect("fixed slice"));
        if last_lba < first_lba {
            return Err(VfsError::CorruptVolume {
                details: format!("partition ends before it starts: {first_lba}..{last_lba}"),
            });
        }
        partitions.push(Partition::new(
            partitions.len(),
            first_lba * SECTOR_SIZE,
            (last_lba - first_lba + 1) * SECTOR_SIZE,
            parse_name(&raw[56..128]),
        ));
    }

    let shared: SharedParent = Arc::new(Mutex::new(parent));
    Ok(PartitionFileSystem::new(
        TypeIndicator::Gpt,
        partitions,
        shared,
        parent_spec,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use crate::vfs::FileSystem;

    fn gpt_image() -> Vec<u8> {
        // 64-sector image: protective MBR, header at LBA 1, entries at LBA 2.
        let mut image = vec![0u8; 64 * 512];
        image[512..520].copy_from_slice(GPT_SIGNATURE);
        image[512 + 72..512 + 80].copy_from_slice(&2u64.to_le_bytes());
        image[512 + 80..512 + 84].copy_from_slice(&4u32.to_le_bytes());
        image[512 + 84..512 + 88].copy_from_slice(&128u32.to_le_bytes());

        // Entry 0: partition over LBAs 8..=15, named "boot".
        let base = 2 * 512;
        image[base..base + 16].copy_from_slice(&[0xAB; 16]);
        image[base + 32..base + 40].copy_from_slice(&8u64.to_le_bytes());
        image[base + 40..base + 48].copy_from_slice(&15u64.to_le_bytes());
        for (index, unit) in "boot".encode_utf16().enumerate() {
            let at = base + 56 + index * 2;
            image[at..at + 2].copy_from_slice(&unit.to_le_bytes());
        }

        // Entry 1: partition over LBAs 16..=63, unnamed.
        let base = base + 128;
        image[base..base + 16].copy_from_slice(&[0xCD; 16]);
        image[base + 32..base + 40].copy_from_slice(&16u64.to_le_bytes());
        image[base + 40..base + 48].copy_from_slice(&63u64.to_le_bytes());

        image
    }

    fn gpt_spec() -> PathSpec {
        PathSpec::builder(TypeIndicator::Gpt)
            .parent(PathSpec::os("/disk.raw"))
            .build()
            .unwrap()
    }

    #[test]
    fn partitions_parse_with_names() {
        let fs = open_gpt(Box::new(MemoryStream::new(gpt_image())), &gpt_spec()).unwrap();
        let partitions = fs.partitions();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].start, 8 * 512);
        assert_eq!(partitions[0].size, 8 * 512);
        assert_eq!(partitions[0].label.as_deref(), Some("boot"));
        assert_eq!(partitions[1].size, 48 * 512);
        assert_eq!(partitions[1].label, None);
    }

    #[test]
    fn missing_signature_is_invalid_data() {
        let image = vec![0u8; 4096];
        let err = open_gpt(Box::new(MemoryStream::new(image)), &gpt_spec()).unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }

    #[test]
    fn inverted_extent_is_corrupt() {
        let mut image = gpt_image();
        let base = 2 * 512;
        image[base + 32..base + 40].copy_from_slice(&20u64.to_le_bytes());
        image[base + 40..base + 48].copy_from_slice(&10u64.to_le_bytes());
        let err = open_gpt(Box::new(MemoryStream::new(image)), &gpt_spec()).unwrap_err();
        assert!(matches!(err, VfsError::CorruptVolume { .. }));
    }

    #[test]
    fn entries_resolve_by_location() {
        let fs = open_gpt(Box::new(MemoryStream::new(gpt_image())), &gpt_spec()).unwrap();
        let entry = fs
            .entry_by_spec(
                &PathSpec::builder(TypeIndicator::Gpt)
                    .parent(PathSpec::os("/disk.raw"))
                    .text("location", "/p1")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(entry.stat().unwrap().size, 8 * 512);
    }
}
