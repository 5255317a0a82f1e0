//! # Format Analyzer
//!
//! Identifies what a stream contains by consolidating the signatures of all
//! registered analyzer helpers into one multi-pattern scan over a bounded
//! prefix, then running per-candidate structural checks.
//!
//! Ambiguous content is reported fully: every matching helper's indicator is
//! returned, ordered by category priority (file-system first, encrypted
//! last) and then by first-match offset.

mod builtin;

pub use builtin::register_builtins;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::spec::TypeIndicator;
use crate::stream::FileObject;
use crate::VfsError;

/// Category of a detected format, ordered by analyzer priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatCategory {
    /// File systems (NTFS, ext, …) and archives mounted as hierarchies.
    FileSystem,
    /// Partition tables, snapshot stores, container volumes.
    VolumeSystem,
    /// Disk image formats.
    StorageMedia,
    /// Archive files.
    Archive,
    /// Compressed streams.
    Compressed,
    /// Encoded streams.
    Encoded,
    /// Encrypted volumes and streams.
    Encrypted,
}

impl FormatCategory {
    /// Lower sorts first in analyzer output.
    const fn priority(self) -> u8 {
        match self {
            Self::FileSystem => 0,
            Self::VolumeSystem => 1,
            Self::StorageMedia => 2,
            Self::Archive => 3,
            Self::Compressed => 4,
            Self::Encoded => 5,
            Self::Encrypted => 6,
        }
    }
}

/// Where a signature may occur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignaturePlacement {
    /// The pattern sits at exactly this offset.
    Fixed(u64),
    /// The pattern may start anywhere in `[start, end]`.
    Window {
        /// First allowed start offset.
        start: u64,
        /// Last allowed start offset.
        end: u64,
    },
}

/// A literal byte pattern at a fixed or windowed position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSignature {
    /// The literal bytes to match.
    pub pattern: Vec<u8>,
    /// Where the pattern may occur.
    pub placement: SignaturePlacement,
}

impl ByteSignature {
    /// A pattern at a fixed offset.
    pub fn at(offset: u64, pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            pattern: pattern.into(),
            placement: SignaturePlacement::Fixed(offset),
        }
    }

    /// A pattern starting anywhere in `[start, end]`.
    pub fn within(start: u64, end: u64, pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            pattern: pattern.into(),
            placement: SignaturePlacement::Window { start, end },
        }
    }

    /// Prefix bytes needed to fully evaluate this signature.
    fn required_prefix(&self) -> u64 {
        match self.placement {
            SignaturePlacement::Fixed(offset) => offset + self.pattern.len() as u64,
            SignaturePlacement::Window { end, .. } => end + self.pattern.len() as u64,
        }
    }

    /// First match offset inside `prefix`, honouring the category `window`.
    fn first_match(&self, prefix: &[u8], window: u64) -> Option<u64> {
        if self.pattern.is_empty() {
            return None;
        }
        match self.placement {
            SignaturePlacement::Fixed(offset) => {
                let end = offset.checked_add(self.pattern.len() as u64)?;
                if end > window || end > prefix.len() as u64 {
                    return None;
                }
                let start = offset as usize;
                (prefix[start..start + self.pattern.len()] == self.pattern[..]).then_some(offset)
            }
            SignaturePlacement::Window { start, end } => {
                let last_start = end.min(window.saturating_sub(self.pattern.len() as u64));
                if start > last_start {
                    return None;
                }
                let search_end =
                    ((last_start as usize).saturating_add(self.pattern.len())).min(prefix.len());
                let haystack = prefix.get(start as usize..search_end)?;
                haystack
                    .windows(self.pattern.len())
                    .position(|candidate| candidate == self.pattern)
                    .map(|found| start + found as u64)
            }
        }
    }
}

/// What one analyzer helper knows how to recognize.
#[derive(Debug, Clone)]
pub struct FormatSpecification {
    /// The indicator reported on a match.
    pub indicator: TypeIndicator,
    /// Category deciding scan window and result ordering.
    pub category: FormatCategory,
    /// Signatures; any one matching makes the helper a candidate.
    pub signatures: Vec<ByteSignature>,
}

/// One back-end's analyzer-side knowledge: signatures plus an optional
/// structural check over the stream.
pub trait AnalyzerHelper: Send + Sync {
    /// The helper's format specification.
    fn format_specification(&self) -> FormatSpecification;

    /// Structural check run when a signature matched; a `false` withdraws
    /// the candidate.
    fn post_check(&self, stream: &mut dyn FileObject) -> Result<bool, VfsError> {
        let _ = stream;
        Ok(true)
    }
}

/// Registry of analyzer helpers, keyed on type indicator.
///
/// Registration is idempotent: re-registering replaces.
#[derive(Default)]
pub struct AnalyzerRegistry {
    helpers: Mutex<HashMap<TypeIndicator, Arc<dyn AnalyzerHelper>>>,
}

impl AnalyzerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in format knowledge registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        register_builtins(&registry);
        registry
    }

    /// Register (or replace) a helper.
    pub fn register(&self, helper: Arc<dyn AnalyzerHelper>) {
        let indicator = helper.format_specification().indicator;
        let mut helpers = self.helpers.lock().expect("analyzer registry lock");
        helpers.insert(indicator, helper);
    }

    fn snapshot(&self) -> Vec<Arc<dyn AnalyzerHelper>> {
        let helpers = self.helpers.lock().expect("analyzer registry lock");
        helpers.values().cloned().collect()
    }
}

/// Scan-window sizes per category, in bytes.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Window for storage-media signatures.
    pub storage_media_window: u64,
    /// Window for volume-system signatures.
    pub volume_system_window: u64,
    /// Window for file-system signatures.
    pub file_system_window: u64,
    /// Window for archive signatures.
    pub archive_window: u64,
    /// Window for compressed-stream signatures.
    pub compressed_window: u64,
    /// Window for encoded-stream signatures.
    pub encoded_window: u64,
    /// Window for encrypted-volume signatures.
    pub encrypted_window: u64,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            storage_media_window: 64 * 1024,
            volume_system_window: 4 * 1024,
            file_system_window: 8 * 1024,
            archive_window: 4 * 1024,
            compressed_window: 32,
            encoded_window: 32,
            encrypted_window: 4 * 1024,
        }
    }
}

impl AnalyzerOptions {
    fn window(&self, category: FormatCategory) -> u64 {
        match category {
            FormatCategory::StorageMedia => self.storage_media_window,
            FormatCategory::VolumeSystem => self.volume_system_window,
            FormatCategory::FileSystem => self.file_system_window,
            FormatCategory::Archive => self.archive_window,
            FormatCategory::Compressed => self.compressed_window,
            FormatCategory::Encoded => self.encoded_window,
            FormatCategory::Encrypted => self.encrypted_window,
        }
    }
}

/// The consolidated multi-pattern scanner.
pub struct Analyzer {
    registry: Arc<AnalyzerRegistry>,
    options: AnalyzerOptions,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    /// An analyzer with the built-in format knowledge and default windows.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(AnalyzerRegistry::with_builtins()),
            options: AnalyzerOptions::default(),
        }
    }

    /// Assemble from an existing registry and window configuration.
    pub fn with_parts(registry: Arc<AnalyzerRegistry>, options: AnalyzerOptions) -> Self {
        Self { registry, options }
    }

    /// The analyzer's registry, for registering external format knowledge.
    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    /// Identify the formats the stream's content matches.
    ///
    /// Reads the minimal prefix needed to evaluate the broadest registered
    /// signature window, evaluates every helper against it, runs structural
    /// checks per candidate, and returns all surviving indicators ordered by
    /// category priority then first-match offset.
    pub fn analyze(
        &self,
        stream: &mut dyn FileObject,
    ) -> Result<Vec<TypeIndicator>, VfsError> {
        let helpers = self.registry.snapshot();
        let mut prefix_needed = 0u64;
        for helper in &helpers {
            let spec = helper.format_specification();
            let window = self.options.window(spec.category);
            for signature in &spec.signatures {
                prefix_needed = prefix_needed.max(signature.required_prefix().min(window));
            }
        }

        let mut prefix = vec![0u8; prefix_needed as usize];
        let filled = {
            let mut total = 0usize;
            stream.seek(std::io::SeekFrom::Start(0))?;
            while total < prefix.len() {
                let count = stream.read(&mut prefix[total..])?;
                if count == 0 {
                    break;
                }
                total += count;
            }
            total
        };
        prefix.truncate(filled);

        let mut matches: Vec<(u8, u64, TypeIndicator)> = Vec::new();
        for helper in &helpers {
            let spec = helper.format_specification();
            let window = self.options.window(spec.category);
            let first = spec
                .signatures
                .iter()
                .filter_map(|signature| signature.first_match(&prefix, window))
                .min();
            let Some(offset) = first else {
                continue;
            };
            if !helper.post_check(stream)? {
                trace!(indicator = %spec.indicator, "candidate withdrawn by structural check");
                continue;
            }
            matches.push((spec.category.priority(), offset, spec.indicator));
        }

        matches.sort_by_key(|(priority, offset, indicator)| {
            (*priority, *offset, indicator.as_str())
        });
        Ok(matches
            .into_iter()
            .map(|(_, _, indicator)| indicator)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn analyze_bytes(content: Vec<u8>) -> Vec<TypeIndicator> {
        let mut stream = MemoryStream::new(content);
        Analyzer::new().analyze(&mut stream).unwrap()
    }

    #[test]
    fn gzip_magic_is_detected() {
        let detected = analyze_bytes(vec![0x1f, 0x8b, 0x08, 0x00]);
        assert_eq!(detected, vec![TypeIndicator::Gzip]);
    }

    #[test]
    fn zip_magic_is_detected() {
        let detected = analyze_bytes(b"PK\x03\x04rest-of-zip".to_vec());
        assert_eq!(detected, vec![TypeIndicator::Zip]);
    }

    #[test]
    fn tar_magic_at_fixed_offset() {
        let mut content = vec![0u8; 1024];
        content[257..262].copy_from_slice(b"ustar");
        let detected = analyze_bytes(content);
        assert_eq!(detected, vec![TypeIndicator::Tar]);
    }

    #[test]
    fn empty_stream_matches_nothing() {
        assert!(analyze_bytes(Vec::new()).is_empty());
    }

    #[test]
    fn ntfs_outranks_mbr_style_signature() {
        // An NTFS boot sector carries both the 0x55AA marker and the OEM
        // name; the file-system category must sort first.
        let mut content = vec![0u8; 2048];
        content[3..11].copy_from_slice(b"NTFS    ");
        content[510] = 0x55;
        content[511] = 0xAA;
        let detected = analyze_bytes(content);
        assert_eq!(detected.first(), Some(&TypeIndicator::Ntfs));
    }

    #[test]
    fn windowed_signature_matches_anywhere_in_range() {
        let signature = ByteSignature::within(0, 64, b"DESCRIPTOR".to_vec());
        let mut haystack = vec![b'.'; 128];
        haystack[40..50].copy_from_slice(b"DESCRIPTOR");
        assert_eq!(signature.first_match(&haystack, 512), Some(40));
        assert_eq!(signature.first_match(&haystack[..16], 512), None);
    }

    #[test]
    fn fixed_signature_respects_category_window() {
        let signature = ByteSignature::at(100, b"XX".to_vec());
        let mut haystack = vec![0u8; 256];
        haystack[100] = b'X';
        haystack[101] = b'X';
        assert_eq!(signature.first_match(&haystack, 256), Some(100));
        // A 32-byte window cannot see offset 100.
        assert_eq!(signature.first_match(&haystack, 32), None);
    }
}
