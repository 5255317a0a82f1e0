//! Type indicators for path specification records.

use std::fmt;
use std::str::FromStr;

use crate::VfsError;

/// Stable short identifier for one layer type in a chain.
///
/// The set is closed: every record in a [`PathSpec`](crate::PathSpec) chain
/// carries exactly one of these tags, and exhaustive matching over them is
/// part of the crate's contract. Back-end implementations remain pluggable
/// through the resolver and analyzer registries, which are keyed on the same
/// tag.
///
/// # System-level roots
///
/// [`Os`](TypeIndicator::Os), [`Fake`](TypeIndicator::Fake) and
/// [`Mount`](TypeIndicator::Mount) are resolvable without opening any
/// container and are the only indicators allowed at the parentless end of a
/// chain.
///
/// # Example
///
/// ```rust
/// use stackfs::TypeIndicator;
///
/// assert_eq!(TypeIndicator::Qcow.as_str(), "QCOW");
/// assert_eq!("TSK_PARTITION".parse::<TypeIndicator>().unwrap(),
///            TypeIndicator::TskPartition);
/// assert!(TypeIndicator::Os.is_system_level());
/// assert!(!TypeIndicator::Ntfs.is_system_level());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeIndicator {
    /// Host operating-system file or device.
    Os,
    /// In-memory test hierarchy.
    Fake,
    /// Indirection through the mount table.
    Mount,
    /// Raw (single- or split-segment) storage media image.
    Raw,
    /// Expert Witness Format storage media image.
    Ewf,
    /// QEMU copy-on-write image.
    Qcow,
    /// Virtual Hard Disk image.
    Vhdi,
    /// VMware Virtual Disk image.
    Vmdk,
    /// Mac OS disk image.
    Modi,
    /// Parallels Hard Disk image.
    Phdi,
    /// Split raw storage media image.
    Smraw,
    /// Master Boot Record volume system.
    Mbr,
    /// GUID Partition Table volume system.
    Gpt,
    /// Apple Partition Map volume system.
    Apm,
    /// Linux Logical Volume Manager volume system.
    Lvm,
    /// SleuthKit partition volume system.
    TskPartition,
    /// Volume Shadow Snapshots volume system.
    Vshadow,
    /// APFS container volume system.
    ApfsContainer,
    /// BitLocker Drive Encryption volume.
    Bde,
    /// FileVault Drive Encryption volume.
    Fvde,
    /// LUKS Drive Encryption volume.
    Luksde,
    /// NTFS file system.
    Ntfs,
    /// Extended (ext2/3/4) file system.
    Ext,
    /// APFS file system.
    Apfs,
    /// HFS+ file system.
    Hfs,
    /// XFS file system.
    Xfs,
    /// FAT file system.
    Fat,
    /// SleuthKit file system.
    Tsk,
    /// cpio archive.
    Cpio,
    /// tar archive.
    Tar,
    /// zip archive.
    Zip,
    /// Multi-member gzip compressed stream.
    Gzip,
    /// bzip2 compressed stream.
    Bzip2,
    /// xz compressed stream.
    Xz,
    /// LZMA-alone compressed stream.
    Lzma,
    /// Generic compressed stream with a `compression_method` attribute.
    CompressedStream,
    /// Encoded stream (base16/base32/base64).
    EncodedStream,
    /// Encrypted stream with method and credentials.
    EncryptedStream,
    /// Fixed byte-range window over the parent.
    DataRange,
    /// BLOB column inside a SQLite database.
    SqliteBlob,
}

impl TypeIndicator {
    /// All indicators, in declaration order.
    pub const ALL: &'static [TypeIndicator] = &[
        Self::Os,
        Self::Fake,
        Self::Mount,
        Self::Raw,
        Self::Ewf,
        Self::Qcow,
        Self::Vhdi,
        Self::Vmdk,
        Self::Modi,
        Self::Phdi,
        Self::Smraw,
        Self::Mbr,
        Self::Gpt,
        Self::Apm,
        Self::Lvm,
        Self::TskPartition,
        Self::Vshadow,
        Self::ApfsContainer,
        Self::Bde,
        Self::Fvde,
        Self::Luksde,
        Self::Ntfs,
        Self::Ext,
        Self::Apfs,
        Self::Hfs,
        Self::Xfs,
        Self::Fat,
        Self::Tsk,
        Self::Cpio,
        Self::Tar,
        Self::Zip,
        Self::Gzip,
        Self::Bzip2,
        Self::Xz,
        Self::Lzma,
        Self::CompressedStream,
        Self::EncodedStream,
        Self::EncryptedStream,
        Self::DataRange,
        Self::SqliteBlob,
    ];

    /// The stable textual tag used in comparable form and registries.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Os => "OS",
            Self::Fake => "FAKE",
            Self::Mount => "MOUNT",
            Self::Raw => "RAW",
            Self::Ewf => "EWF",
            Self::Qcow => "QCOW",
            Self::Vhdi => "VHDI",
            Self::Vmdk => "VMDK",
            Self::Modi => "MODI",
            Self::Phdi => "PHDI",
            Self::Smraw => "SMRAW",
            Self::Mbr => "MBR",
            Self::Gpt => "GPT",
            Self::Apm => "APM",
            Self::Lvm => "LVM",
            Self::TskPartition => "TSK_PARTITION",
            Self::Vshadow => "VSHADOW",
            Self::ApfsContainer => "APFS_CONTAINER",
            Self::Bde => "BDE",
            Self::Fvde => "FVDE",
            Self::Luksde => "LUKSDE",
            Self::Ntfs => "NTFS",
            Self::Ext => "EXT",
            Self::Apfs => "APFS",
            Self::Hfs => "HFS",
            Self::Xfs => "XFS",
            Self::Fat => "FAT",
            Self::Tsk => "TSK",
            Self::Cpio => "CPIO",
            Self::Tar => "TAR",
            Self::Zip => "ZIP",
            Self::Gzip => "GZIP",
            Self::Bzip2 => "BZIP2",
            Self::Xz => "XZ",
            Self::Lzma => "LZMA",
            Self::CompressedStream => "COMPRESSED_STREAM",
            Self::EncodedStream => "ENCODED_STREAM",
            Self::EncryptedStream => "ENCRYPTED_STREAM",
            Self::DataRange => "DATA_RANGE",
            Self::SqliteBlob => "SQLITE_BLOB",
        }
    }

    /// Whether a chain may end (parentless) at this indicator.
    pub const fn is_system_level(self) -> bool {
        matches!(self, Self::Os | Self::Fake | Self::Mount)
    }

    /// Whether this indicator names a file system back-end.
    pub const fn is_file_system(self) -> bool {
        matches!(
            self,
            Self::Ntfs
                | Self::Ext
                | Self::Apfs
                | Self::Hfs
                | Self::Xfs
                | Self::Fat
                | Self::Tsk
                | Self::Fake
                | Self::Os
        )
    }

    /// Whether this indicator names a volume system (partitions, snapshot
    /// stores, container volumes).
    pub const fn is_volume_system(self) -> bool {
        matches!(
            self,
            Self::Mbr
                | Self::Gpt
                | Self::Apm
                | Self::Lvm
                | Self::TskPartition
                | Self::Vshadow
                | Self::ApfsContainer
        )
    }

    /// Whether this indicator names a storage-media image format.
    pub const fn is_storage_media(self) -> bool {
        matches!(
            self,
            Self::Raw
                | Self::Ewf
                | Self::Qcow
                | Self::Vhdi
                | Self::Vmdk
                | Self::Modi
                | Self::Phdi
                | Self::Smraw
        )
    }

    /// Whether this indicator names an archive format.
    pub const fn is_archive(self) -> bool {
        matches!(self, Self::Cpio | Self::Tar | Self::Zip)
    }

    /// Whether this indicator names a compressed or encoded stream transform.
    pub const fn is_stream_transform(self) -> bool {
        matches!(
            self,
            Self::Gzip
                | Self::Bzip2
                | Self::Xz
                | Self::Lzma
                | Self::CompressedStream
                | Self::EncodedStream
                | Self::EncryptedStream
                | Self::DataRange
        )
    }

    /// Whether this indicator names an encrypted volume requiring credentials.
    pub const fn is_encrypted_volume(self) -> bool {
        matches!(self, Self::Bde | Self::Fvde | Self::Luksde)
    }
}

impl fmt::Display for TypeIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeIndicator {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|indicator| indicator.as_str() == s)
            .ok_or_else(|| VfsError::PathSpec {
                reason: format!("unknown type indicator: {s}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_round_trips_for_all_indicators() {
        for indicator in TypeIndicator::ALL {
            let parsed: TypeIndicator = indicator.as_str().parse().unwrap();
            assert_eq!(parsed, *indicator);
        }
    }

    #[test]
    fn unknown_indicator_fails() {
        let err = "NOT_A_TYPE".parse::<TypeIndicator>().unwrap_err();
        assert!(matches!(err, VfsError::PathSpec { .. }));
    }

    #[test]
    fn system_level_set_is_exact() {
        let system: Vec<_> = TypeIndicator::ALL
            .iter()
            .filter(|i| i.is_system_level())
            .collect();
        assert_eq!(
            system,
            vec![&TypeIndicator::Os, &TypeIndicator::Fake, &TypeIndicator::Mount]
        );
    }

    #[test]
    fn families_do_not_overlap_for_volume_and_storage() {
        for indicator in TypeIndicator::ALL {
            assert!(
                !(indicator.is_volume_system() && indicator.is_storage_media()),
                "{indicator} is in two families"
            );
        }
    }
}
