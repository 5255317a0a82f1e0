//! # Source Scanner
//!
//! Recursively discovers the nesting structure of an unknown source: open a
//! node's stream, identify what the content is, stack the matching record
//! onto the chain, and descend. The result is a scan tree whose file-system
//! leaves carry the chains needed to reach every usable volume.
//!
//! Scanning terminates at a node whose content is a file system, an empty
//! container, or unrecognizable bytes. Locked encrypted volumes are
//! recorded, not resolved — unlocking is the volume scanner's concern.
//!
//! Errors do not abort the scan: each failing branch is recorded and the
//! final status distinguishes fully scanned, partially scanned, and failed.

pub mod volume;

use std::sync::Arc;

use tracing::debug;

use crate::analyzer::Analyzer;
use crate::cancel::CancelToken;
use crate::resolver::{Context, Resolver};
use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::FileObjectExt;
use crate::VfsError;

/// Nesting depth bound; a deeper chain is treated as unrecognizable.
const MAX_SCAN_DEPTH: usize = 16;

/// What a scanned node turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanNodeState {
    /// A usable file system (or archive mounted as one); leaf.
    FileSystem,
    /// A volume system whose children are its partitions or stores.
    VolumeSystem,
    /// An intermediate container layer (storage media, compressed stream).
    Container,
    /// An encrypted volume without usable credentials; deferred.
    Locked,
    /// Zero bytes of content; leaf.
    Empty,
    /// Unrecognizable bytes; leaf.
    Unknown,
}

/// One node of the scan tree.
#[derive(Debug)]
pub struct ScanNode {
    /// The chain addressing this node.
    pub path_spec: PathSpec,
    /// What the node's content is.
    pub state: ScanNodeState,
    /// The detected format, where one was detected.
    pub type_indicator: Option<TypeIndicator>,
    /// Deeper layers discovered inside this node.
    pub sub_nodes: Vec<ScanNode>,
    /// Credential names that would unlock a [`Locked`](ScanNodeState::Locked)
    /// node.
    pub credentials: Vec<&'static str>,
}

impl ScanNode {
    fn leaf(path_spec: PathSpec, state: ScanNodeState, indicator: Option<TypeIndicator>) -> Self {
        Self {
            path_spec,
            state,
            type_indicator: indicator,
            sub_nodes: Vec::new(),
            credentials: Vec::new(),
        }
    }
}

/// Outcome classification of a whole scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// Every branch was scanned to a terminal state.
    Complete,
    /// Some branches failed; their reasons are recorded.
    Partial,
    /// The source itself could not be opened or identified.
    Failed,
}

/// The scan tree plus per-branch errors and the overall status.
#[derive(Debug)]
pub struct ScanResult {
    /// The root node, addressing the source itself.
    pub root: ScanNode,
    /// Overall outcome.
    pub status: ScanStatus,
    /// Per-branch failures, in discovery order.
    pub errors: Vec<(PathSpec, VfsError)>,
}

impl ScanResult {
    /// The chains of every discovered file-system leaf, in discovery order.
    pub fn file_system_specs(&self) -> Vec<PathSpec> {
        let mut specs = Vec::new();
        collect_file_systems(&self.root, &mut specs);
        specs
    }

    /// Every locked node in the tree.
    pub fn locked_nodes(&self) -> Vec<&ScanNode> {
        let mut nodes = Vec::new();
        collect_locked(&self.root, &mut nodes);
        nodes
    }
}

fn collect_file_systems(node: &ScanNode, out: &mut Vec<PathSpec>) {
    if node.state == ScanNodeState::FileSystem {
        out.push(node.path_spec.clone());
    }
    for child in &node.sub_nodes {
        collect_file_systems(child, out);
    }
}

fn collect_locked<'tree>(node: &'tree ScanNode, out: &mut Vec<&'tree ScanNode>) {
    if node.state == ScanNodeState::Locked {
        out.push(node);
    }
    for child in &node.sub_nodes {
        collect_locked(child, out);
    }
}

/// Credential names an encrypted layer accepts.
pub(crate) fn credential_names(indicator: TypeIndicator) -> Vec<&'static str> {
    match indicator {
        TypeIndicator::Bde => vec!["password", "recovery_password", "startup_key"],
        TypeIndicator::Fvde => vec!["password", "recovery_password"],
        TypeIndicator::Luksde => vec!["password"],
        TypeIndicator::EncryptedStream => vec!["key"],
        _ => Vec::new(),
    }
}

/// Recursive structural-discovery scanner.
pub struct SourceScanner {
    resolver: Arc<Resolver>,
    analyzer: Analyzer,
}

impl Default for SourceScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceScanner {
    /// A scanner over the built-in back-ends and format knowledge.
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(Resolver::new()),
            analyzer: Analyzer::new(),
        }
    }

    /// Assemble from an existing resolver and analyzer.
    pub fn with_parts(resolver: Arc<Resolver>, analyzer: Analyzer) -> Self {
        Self { resolver, analyzer }
    }

    /// The scanner's resolver.
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Scan `source` recursively.
    ///
    /// # Errors
    ///
    /// Only [`VfsError::Cancelled`] propagates; every other failure is
    /// folded into the result as a per-branch error.
    pub fn scan(
        &self,
        source: &PathSpec,
        context: &Context,
        cancel: &CancelToken,
    ) -> Result<ScanResult, VfsError> {
        // Transform streams opened during the scan pick the token up from
        // the context, so decompression replays abort mid-stream too.
        context.set_cancel_token(cancel.clone());
        let mut errors = Vec::new();
        let root = self.scan_node(source.clone(), context, cancel, &mut errors, 0)?;
        let status = match root.state {
            ScanNodeState::Unknown if !errors.is_empty() && root.sub_nodes.is_empty() => {
                ScanStatus::Failed
            }
            _ if errors.is_empty() => ScanStatus::Complete,
            _ => ScanStatus::Partial,
        };
        debug!(?status, errors = errors.len(), "scan finished");
        Ok(ScanResult {
            root,
            status,
            errors,
        })
    }

    fn scan_node(
        &self,
        spec: PathSpec,
        context: &Context,
        cancel: &CancelToken,
        errors: &mut Vec<(PathSpec, VfsError)>,
        depth: usize,
    ) -> Result<ScanNode, VfsError> {
        cancel.check()?;
        if depth >= MAX_SCAN_DEPTH {
            errors.push((
                spec.clone(),
                VfsError::CorruptVolume {
                    details: format!("nesting deeper than {MAX_SCAN_DEPTH} layers"),
                },
            ));
            return Ok(ScanNode::leaf(spec, ScanNodeState::Unknown, None));
        }

        let mut stream = match self.resolver.open_file_object(&spec, context) {
            Ok(stream) => stream,
            Err(VfsError::Cancelled) => return Err(VfsError::Cancelled),
            Err(err) => {
                errors.push((spec.clone(), err));
                return Ok(ScanNode::leaf(spec, ScanNodeState::Unknown, None));
            }
        };

        // A one-byte probe decides emptiness without forcing a size scan on
        // transform streams.
        let mut probe = [0u8; 1];
        match stream.read_at(0, &mut probe) {
            Ok(0) => return Ok(ScanNode::leaf(spec, ScanNodeState::Empty, None)),
            Ok(_) => {}
            Err(VfsError::Cancelled) => return Err(VfsError::Cancelled),
            Err(err) => {
                errors.push((spec.clone(), err));
                return Ok(ScanNode::leaf(spec, ScanNodeState::Unknown, None));
            }
        }

        let candidates = match self.analyzer.analyze(stream.as_mut()) {
            Ok(candidates) => candidates,
            Err(VfsError::Cancelled) => return Err(VfsError::Cancelled),
            Err(err) => {
                errors.push((spec.clone(), err));
                return Ok(ScanNode::leaf(spec, ScanNodeState::Unknown, None));
            }
        };
        drop(stream);

        for candidate in candidates {
            if candidate.is_file_system() || candidate.is_archive() {
                let leaf_spec = PathSpec::builder(candidate)
                    .parent(spec.clone())
                    .text("location", "/")
                    .build()
                    .expect("file-system root records are valid");
                return Ok(ScanNode::leaf(
                    leaf_spec,
                    ScanNodeState::FileSystem,
                    Some(candidate),
                ));
            }

            if candidate.is_encrypted_volume() {
                let child_spec = PathSpec::builder(candidate)
                    .parent(spec.clone())
                    .build()
                    .expect("encrypted volume records take no attributes");
                let names = credential_names(candidate);
                let has_credential = names
                    .iter()
                    .any(|name| context.credential(&child_spec, name).is_some());
                if has_credential && self.resolver.registry().supports(candidate) {
                    let child =
                        self.scan_node(child_spec.clone(), context, cancel, errors, depth + 1)?;
                    return Ok(ScanNode {
                        path_spec: child_spec,
                        state: ScanNodeState::Container,
                        type_indicator: Some(candidate),
                        sub_nodes: vec![child],
                        credentials: Vec::new(),
                    });
                }
                return Ok(ScanNode {
                    path_spec: child_spec,
                    state: ScanNodeState::Locked,
                    type_indicator: Some(candidate),
                    sub_nodes: Vec::new(),
                    credentials: names,
                });
            }

            if candidate.is_volume_system() {
                let child_spec = PathSpec::builder(candidate)
                    .parent(spec.clone())
                    .build()
                    .expect("volume system records may omit addressing");
                if !self.resolver.registry().supports(candidate) {
                    errors.push((
                        child_spec.clone(),
                        VfsError::UnsupportedType {
                            indicator: candidate.as_str(),
                        },
                    ));
                    return Ok(ScanNode::leaf(
                        child_spec,
                        ScanNodeState::VolumeSystem,
                        Some(candidate),
                    ));
                }
                let mut sub_nodes = Vec::new();
                match self.volume_children(&child_spec, context) {
                    Ok(children) => {
                        for child in children {
                            sub_nodes.push(self.scan_node(
                                child,
                                context,
                                cancel,
                                errors,
                                depth + 1,
                            )?);
                        }
                    }
                    Err(VfsError::Cancelled) => return Err(VfsError::Cancelled),
                    Err(err) => errors.push((child_spec.clone(), err)),
                }
                return Ok(ScanNode {
                    path_spec: child_spec,
                    state: ScanNodeState::VolumeSystem,
                    type_indicator: Some(candidate),
                    sub_nodes,
                    credentials: Vec::new(),
                });
            }

            if candidate.is_storage_media() || candidate.is_stream_transform() {
                let child_spec = PathSpec::builder(candidate)
                    .parent(spec.clone())
                    .build()
                    .expect("container records take no attributes");
                if !self.resolver.registry().supports(candidate) {
                    errors.push((
                        child_spec.clone(),
                        VfsError::UnsupportedType {
                            indicator: candidate.as_str(),
                        },
                    ));
                    return Ok(ScanNode::leaf(
                        child_spec,
                        ScanNodeState::Container,
                        Some(candidate),
                    ));
                }
                let child = self.scan_node(child_spec.clone(), context, cancel, errors, depth + 1)?;
                return Ok(ScanNode {
                    path_spec: child_spec,
                    state: ScanNodeState::Container,
                    type_indicator: Some(candidate),
                    sub_nodes: vec![child],
                    credentials: Vec::new(),
                });
            }
        }

        Ok(ScanNode::leaf(spec, ScanNodeState::Unknown, None))
    }

    /// Partition chains of an opened volume system, in table order.
    fn volume_children(
        &self,
        volume_spec: &PathSpec,
        context: &Context,
    ) -> Result<Vec<PathSpec>, VfsError> {
        let file_system = self.resolver.open_file_system(volume_spec, context)?;
        let root = file_system.root_entry()?;
        let mut children = Vec::new();
        for entry in root.sub_entries()? {
            children.push(entry?.path_spec().clone());
        }
        Ok(children)
    }
}
