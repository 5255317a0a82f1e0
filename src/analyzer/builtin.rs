//! Built-in analyzer format knowledge.

use std::sync::Arc;

use crate::analyzer::{
    AnalyzerHelper, AnalyzerRegistry, ByteSignature, FormatCategory, FormatSpecification,
};
use crate::spec::TypeIndicator;
use crate::stream::{FileObject, FileObjectExt};
use crate::vfs::mbr::is_protective_mbr;
use crate::VfsError;

/// Plain signature-only helper.
struct SignatureHelper {
    spec: FormatSpecification,
}

impl SignatureHelper {
    fn new(
        indicator: TypeIndicator,
        category: FormatCategory,
        signatures: Vec<ByteSignature>,
    ) -> Arc<Self> {
        Arc::new(Self {
            spec: FormatSpecification {
                indicator,
                category,
                signatures,
            },
        })
    }
}

impl AnalyzerHelper for SignatureHelper {
    fn format_specification(&self) -> FormatSpecification {
        self.spec.clone()
    }
}

/// MBR with a structural check: a boot sector holding only the GPT
/// protective partition is a GPT disk, not an MBR volume system.
struct MbrAnalyzerHelper;

impl AnalyzerHelper for MbrAnalyzerHelper {
    fn format_specification(&self) -> FormatSpecification {
        FormatSpecification {
            indicator: TypeIndicator::Mbr,
            category: FormatCategory::VolumeSystem,
            signatures: vec![ByteSignature::at(510, vec![0x55, 0xAA])],
        }
    }

    fn post_check(&self, stream: &mut dyn FileObject) -> Result<bool, VfsError> {
        let mut sector = [0u8; 512];
        if stream.read_exact_at(0, &mut sector).is_err() {
            return Ok(false);
        }
        if is_protective_mbr(&sector) {
            return Ok(false);
        }
        // At least one non-empty partition record distinguishes an MBR from
        // a bare boot sector (a FAT or NTFS volume also ends in 0x55AA).
        let has_partition = sector[446..510]
            .chunks_exact(16)
            .any(|record| record.iter().any(|byte| *byte != 0));
        Ok(has_partition)
    }
}

/// Register the built-in format knowledge.
///
/// The set is wider than the built-in resolver back-ends: the analyzer can
/// name a format whose decoder plugs in externally.
pub fn register_builtins(registry: &AnalyzerRegistry) {
    use FormatCategory as Cat;
    use TypeIndicator as T;

    registry.register(Arc::new(MbrAnalyzerHelper));

    // Compressed streams.
    registry.register(SignatureHelper::new(
        T::Gzip,
        Cat::Compressed,
        vec![ByteSignature::at(0, vec![0x1f, 0x8b])],
    ));
    registry.register(SignatureHelper::new(
        T::Bzip2,
        Cat::Compressed,
        vec![ByteSignature::at(0, b"BZh".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Xz,
        Cat::Compressed,
        vec![ByteSignature::at(0, b"\xfd7zXZ\x00".to_vec())],
    ));

    // Archives.
    registry.register(SignatureHelper::new(
        T::Zip,
        Cat::Archive,
        vec![ByteSignature::at(0, b"PK\x03\x04".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Tar,
        Cat::Archive,
        vec![ByteSignature::at(257, b"ustar".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Cpio,
        Cat::Archive,
        vec![
            ByteSignature::at(0, b"070701".to_vec()),
            ByteSignature::at(0, b"070702".to_vec()),
            ByteSignature::at(0, b"070707".to_vec()),
            ByteSignature::at(0, vec![0xc7, 0x71]),
        ],
    ));

    // Volume systems.
    registry.register(SignatureHelper::new(
        T::Gpt,
        Cat::VolumeSystem,
        vec![ByteSignature::at(512, b"EFI PART".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Apm,
        Cat::VolumeSystem,
        vec![ByteSignature::at(512, b"PM\x00\x00".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Lvm,
        Cat::VolumeSystem,
        vec![ByteSignature::at(512, b"LABELONE".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::ApfsContainer,
        Cat::VolumeSystem,
        vec![ByteSignature::at(32, b"NXSB".to_vec())],
    ));

    // File systems.
    registry.register(SignatureHelper::new(
        T::Ntfs,
        Cat::FileSystem,
        vec![ByteSignature::at(3, b"NTFS    ".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Ext,
        Cat::FileSystem,
        vec![ByteSignature::at(1080, vec![0x53, 0xef])],
    ));
    registry.register(SignatureHelper::new(
        T::Xfs,
        Cat::FileSystem,
        vec![ByteSignature::at(0, b"XFSB".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Fat,
        Cat::FileSystem,
        vec![
            ByteSignature::at(54, b"FAT12".to_vec()),
            ByteSignature::at(54, b"FAT16".to_vec()),
            ByteSignature::at(82, b"FAT32".to_vec()),
            ByteSignature::at(3, b"EXFAT   ".to_vec()),
        ],
    ));
    registry.register(SignatureHelper::new(
        T::Hfs,
        Cat::FileSystem,
        vec![
            ByteSignature::at(1024, b"H+".to_vec()),
            ByteSignature::at(1024, b"HX".to_vec()),
        ],
    ));
    registry.register(SignatureHelper::new(
        T::Apfs,
        Cat::FileSystem,
        vec![ByteSignature::at(32, b"APSB".to_vec())],
    ));

    // Storage media.
    registry.register(SignatureHelper::new(
        T::Qcow,
        Cat::StorageMedia,
        vec![ByteSignature::at(0, b"QFI\xfb".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Ewf,
        Cat::StorageMedia,
        vec![ByteSignature::at(0, b"EVF\x09\x0d\x0a\xff\x00".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Vhdi,
        Cat::StorageMedia,
        vec![
            ByteSignature::at(0, b"conectix".to_vec()),
            ByteSignature::at(0, b"vhdxfile".to_vec()),
        ],
    ));
    registry.register(SignatureHelper::new(
        T::Vmdk,
        Cat::StorageMedia,
        vec![
            ByteSignature::at(0, b"KDMV".to_vec()),
            ByteSignature::within(0, 512, b"# Disk DescriptorFile".to_vec()),
        ],
    ));

    // Encrypted volumes.
    registry.register(SignatureHelper::new(
        T::Bde,
        Cat::Encrypted,
        vec![ByteSignature::at(3, b"-FVE-FS-".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Luksde,
        Cat::Encrypted,
        vec![ByteSignature::at(0, b"LUKS\xba\xbe".to_vec())],
    ));
    registry.register(SignatureHelper::new(
        T::Fvde,
        Cat::Encrypted,
        vec![ByteSignature::at(88, b"CS".to_vec())],
    ));
}
