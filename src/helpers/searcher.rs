//! Find-spec matching over a virtual hierarchy.

use std::sync::Arc;

use regex::Regex;

use crate::spec::PathSpec;
use crate::vfs::{EntryType, FileEntry, FileSystem};
use crate::VfsError;

/// One search pattern: per-segment regexes, depth bounds, and entry filters.
///
/// A spec with location segments matches entries whose path has exactly that
/// many segments, each fully matching its regex; descent is pruned as soon
/// as a prefix segment fails. A spec without segments matches by the other
/// filters alone, bounded by depth.
///
/// # Example
///
/// ```rust
/// use stackfs::helpers::FindSpec;
///
/// let spec = FindSpec::new()
///     .with_location_regex(&["Users", ".*", r"\.bash_history"])
///     .unwrap()
///     .case_insensitive();
/// ```
#[derive(Debug, Clone)]
pub struct FindSpec {
    segments: Vec<Regex>,
    min_depth: Option<usize>,
    max_depth: Option<usize>,
    entry_type: Option<EntryType>,
    data_stream: Option<String>,
    case_sensitive: bool,
    raw_segments: Vec<String>,
}

impl Default for FindSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl FindSpec {
    /// A spec that matches everything (bounded only by later filters).
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            min_depth: None,
            max_depth: None,
            entry_type: None,
            data_stream: None,
            case_sensitive: true,
            raw_segments: Vec::new(),
        }
    }

    /// Match a literal location, one segment per path component.
    pub fn with_location(self, segments: &[&str]) -> Result<Self, VfsError> {
        let escaped: Vec<String> = segments.iter().map(|s| regex::escape(s)).collect();
        let refs: Vec<&str> = escaped.iter().map(String::as_str).collect();
        self.with_location_regex(&refs)
    }

    /// Match a location by per-segment regular expressions; each segment
    /// must match its component fully.
    pub fn with_location_regex(mut self, segments: &[&str]) -> Result<Self, VfsError> {
        self.raw_segments = segments.iter().map(|s| s.to_string()).collect();
        self.compile()?;
        Ok(self)
    }

    /// Only match entries at `min..=max` segments of depth.
    pub fn with_depth_range(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_depth = min;
        self.max_depth = max;
        self
    }

    /// Only match entries of the given type.
    pub fn with_entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    /// Only match entries carrying a data stream with this name.
    pub fn with_data_stream(mut self, name: impl Into<String>) -> Self {
        self.data_stream = Some(name.into());
        self
    }

    /// Match segment patterns case-insensitively.
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self.compile().expect("previously compiled patterns stay valid");
        self
    }

    fn compile(&mut self) -> Result<(), VfsError> {
        let flag = if self.case_sensitive { "" } else { "(?i)" };
        self.segments = self
            .raw_segments
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^{flag}(?:{pattern})$")).map_err(|err| VfsError::PathSpec {
                    reason: format!("invalid find pattern {pattern}: {err}"),
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Whether the searcher should descend into a directory at `depth`
    /// whose name is `name` (depth is one-based).
    fn allows_descent(&self, depth: usize, name: &str) -> bool {
        if let Some(max) = self.max_depth {
            if depth >= max {
                return false;
            }
        }
        if self.segments.is_empty() {
            return true;
        }
        if depth >= self.segments.len() {
            return false;
        }
        self.segments[depth - 1].is_match(name)
    }

    /// Whether an entry at `depth` matches in full.
    fn matches(&self, depth: usize, entry: &dyn FileEntry) -> Result<bool, VfsError> {
        if let Some(min) = self.min_depth {
            if depth < min {
                return Ok(false);
            }
        }
        if let Some(max) = self.max_depth {
            if depth > max {
                return Ok(false);
            }
        }
        if !self.segments.is_empty() {
            if depth != self.segments.len() {
                return Ok(false);
            }
            if !self.segments[depth - 1].is_match(entry.name()) {
                return Ok(false);
            }
        }
        if let Some(wanted) = self.entry_type {
            if entry.entry_type() != wanted {
                return Ok(false);
            }
        }
        if let Some(stream_name) = &self.data_stream {
            let streams = entry.data_streams()?;
            if !streams.iter().any(|info| info.name == *stream_name) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Emits the path specifications of entries matching any of a set of
/// [`FindSpec`]s, walking the hierarchy lazily.
pub struct FileSystemSearcher {
    file_system: Arc<dyn FileSystem>,
}

impl FileSystemSearcher {
    /// A searcher over `file_system`.
    pub fn new(file_system: Arc<dyn FileSystem>) -> Self {
        Self { file_system }
    }

    /// Start a search. The returned iterator is lazy and restartable:
    /// calling `find` again walks the hierarchy afresh.
    pub fn find(&self, specs: Vec<FindSpec>) -> Result<SearchIter, VfsError> {
        let root = self.file_system.root_entry()?;
        Ok(SearchIter {
            specs,
            stack: vec![(root, 0)],
        })
    }
}

/// Depth-first search iterator; directory handles live only while their
/// children are being produced.
pub struct SearchIter {
    specs: Vec<FindSpec>,
    stack: Vec<(Box<dyn FileEntry>, usize)>,
}

impl Iterator for SearchIter {
    type Item = Result<PathSpec, VfsError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((entry, depth)) = self.stack.pop() {
            // Descend first so match evaluation errors do not lose the
            // subtree.
            if entry.entry_type() == EntryType::Directory {
                let descend = depth == 0
                    || self
                        .specs
                        .iter()
                        .any(|spec| spec.allows_descent(depth, entry.name()));
                if descend {
                    let children = match entry.sub_entries() {
                        Ok(iter) => iter,
                        Err(err) => return Some(Err(err)),
                    };
                    let mut collected = Vec::new();
                    for child in children {
                        match child {
                            Ok(child) => collected.push(child),
                            Err(err) => return Some(Err(err)),
                        }
                    }
                    for child in collected.into_iter().rev() {
                        self.stack.push((child, depth + 1));
                    }
                }
            }

            if depth == 0 {
                continue;
            }
            let mut matched = false;
            for spec in &self.specs {
                match spec.matches(depth, entry.as_ref()) {
                    Ok(true) => {
                        matched = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(err) => return Some(Err(err)),
                }
            }
            if matched {
                return Some(Ok(entry.path_spec().clone()));
            }
        }
        None
    }
}
