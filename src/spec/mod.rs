//! # Path Specifications
//!
//! The typed, comparable, stackable addressing algebra at the heart of the
//! crate.
//!
//! ## Overview
//!
//! A [`PathSpec`] names a datum by describing, from outside in, each container
//! it is nested within: a chain of records, each with a [`TypeIndicator`], a
//! fixed per-type attribute map, and an optional parent record. Exactly one
//! record in a chain has no parent, and that record must be system-level
//! (`OS`, `FAKE` or `MOUNT`).
//!
//! ## Comparable form
//!
//! Equality, ordering and cache keys are all defined over the **comparable
//! form**: a newline-terminated sequence of `type=T, k1=v1, k2=v2` lines
//! walking from the parentless record to the target record, attribute keys
//! sorted. Two specifications denote the same object iff their comparable
//! forms are byte-equal, and [`parse`] inverts [`PathSpec::comparable`]
//! losslessly.
//!
//! ## Example
//!
//! ```rust
//! use stackfs::{PathSpec, TypeIndicator};
//!
//! let spec = PathSpec::builder(TypeIndicator::DataRange)
//!     .parent(PathSpec::os("/images/disk.raw"))
//!     .uint("range_offset", 32256)
//!     .uint("range_size", 1024)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     spec.comparable(),
//!     "type=OS, location=/images/disk.raw\n\
//!      type=DATA_RANGE, range_offset=32256, range_size=1024\n"
//! );
//! assert_eq!(stackfs::spec::parse(&spec.comparable()).unwrap(), spec);
//! ```

mod factory;
mod indicator;

pub use factory::{PathSpecBuilder, parse};
pub use indicator::TypeIndicator;

use std::collections::BTreeMap;
use std::fmt;

/// A single typed attribute value.
///
/// The kind of every attribute is fixed by the per-type attribute table, so
/// the comparable form stays parseable without per-value type tags: unsigned
/// integers print in decimal, byte strings print `0x`-prefixed hex, text
/// prints escaped verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    /// UTF-8 text (locations, identifiers, passwords, method names).
    Text(String),
    /// Unsigned integer (offsets, sizes, indices, inode numbers).
    Uint(u64),
    /// Raw bytes (keys, initialization vectors).
    Bytes(Vec<u8>),
}

impl AttributeValue {
    fn write_comparable(&self, out: &mut String) {
        match self {
            AttributeValue::Text(text) => {
                for ch in text.chars() {
                    match ch {
                        '\\' => out.push_str("\\\\"),
                        ',' => out.push_str("\\,"),
                        '\n' => out.push_str("\\n"),
                        other => out.push(other),
                    }
                }
            }
            AttributeValue::Uint(value) => {
                out.push_str(&value.to_string());
            }
            AttributeValue::Bytes(bytes) => {
                out.push_str("0x");
                out.push_str(&hex::encode(bytes));
            }
        }
    }
}

/// An immutable record chain addressing a byte stream or file entry inside
/// layered containers.
///
/// Value semantics: specifications are freely cloned and compared. The parent
/// link is by construction acyclic (a child owns a copy of its parent), and
/// walking [`parent`](PathSpec::parent) always terminates at a system-level
/// record.
///
/// Construction goes through [`PathSpec::builder`] (validated against the
/// per-type attribute table) or the typed convenience constructors such as
/// [`PathSpec::os`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSpec {
    indicator: TypeIndicator,
    parent: Option<Box<PathSpec>>,
    attrs: BTreeMap<&'static str, AttributeValue>,
}

impl PathSpec {
    pub(crate) fn from_parts(
        indicator: TypeIndicator,
        parent: Option<PathSpec>,
        attrs: BTreeMap<&'static str, AttributeValue>,
    ) -> Self {
        Self {
            indicator,
            parent: parent.map(Box::new),
            attrs,
        }
    }

    /// Start building a specification of the given type.
    pub fn builder(indicator: TypeIndicator) -> PathSpecBuilder {
        PathSpecBuilder::new(indicator)
    }

    /// A system-level specification for a host file, device or directory.
    pub fn os(location: impl Into<String>) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("location", AttributeValue::Text(location.into()));
        Self::from_parts(TypeIndicator::Os, None, attrs)
    }

    /// A system-level specification into an in-memory test hierarchy.
    pub fn fake(location: impl Into<String>) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("location", AttributeValue::Text(location.into()));
        Self::from_parts(TypeIndicator::Fake, None, attrs)
    }

    /// A system-level specification indirecting through the mount table.
    pub fn mount(identifier: impl Into<String>) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("identifier", AttributeValue::Text(identifier.into()));
        Self::from_parts(TypeIndicator::Mount, None, attrs)
    }

    /// The type indicator of the target (innermost) record.
    pub fn indicator(&self) -> TypeIndicator {
        self.indicator
    }

    /// The parent record, if any.
    pub fn parent(&self) -> Option<&PathSpec> {
        self.parent.as_deref()
    }

    /// Whether this record is resolvable without opening any container.
    pub fn is_system_level(&self) -> bool {
        self.parent.is_none() && self.indicator.is_system_level()
    }

    /// Number of records in the chain, target included.
    pub fn chain_depth(&self) -> usize {
        let mut depth = 1;
        let mut node = self.parent();
        while let Some(spec) = node {
            depth += 1;
            node = spec.parent();
        }
        depth
    }

    /// Raw attribute lookup on the target record.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attrs.get(key)
    }

    /// Text attribute on the target record.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.attrs.get(key) {
            Some(AttributeValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Unsigned integer attribute on the target record.
    pub fn uint(&self, key: &str) -> Option<u64> {
        match self.attrs.get(key) {
            Some(AttributeValue::Uint(value)) => Some(*value),
            _ => None,
        }
    }

    /// Byte-string attribute on the target record.
    pub fn bytes(&self, key: &str) -> Option<&[u8]> {
        match self.attrs.get(key) {
            Some(AttributeValue::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// The `location` attribute, present on most addressable records.
    pub fn location(&self) -> Option<&str> {
        self.text("location")
    }

    /// Iterate the target record's attributes in key order.
    pub fn attributes(&self) -> impl Iterator<Item = (&'static str, &AttributeValue)> {
        self.attrs.iter().map(|(key, value)| (*key, value))
    }

    /// The canonical, order-deterministic serialization of the whole chain.
    ///
    /// One line per record, parentless record first, keys sorted, newline
    /// terminated. [`parse`] inverts this losslessly.
    pub fn comparable(&self) -> String {
        let mut records = Vec::with_capacity(self.chain_depth());
        let mut node = Some(self);
        while let Some(spec) = node {
            records.push(spec);
            node = spec.parent();
        }
        let mut out = String::new();
        for spec in records.into_iter().rev() {
            out.push_str("type=");
            out.push_str(spec.indicator.as_str());
            for (key, value) in &spec.attrs {
                out.push_str(", ");
                out.push_str(key);
                out.push('=');
                value.write_comparable(&mut out);
            }
            out.push('\n');
        }
        out
    }

    /// The specification identifying the file system that contains the entry
    /// addressed by this chain.
    ///
    /// Entry-addressing attributes (`location`, `inode`, identifiers, stream
    /// and index selectors) are stripped from the target record; the parent
    /// chain is untouched. Used as the resolver cache key so every entry of
    /// one file system shares one back-end handle.
    pub fn file_system_spec(&self) -> PathSpec {
        const ENTRY_KEYS: &[&str] = &[
            "location",
            "inode",
            "identifier",
            "mft_entry",
            "data_stream",
            "mft_attribute",
            "volume_index",
            "store_index",
            "part_index",
            "row_index",
            "row_condition",
        ];
        let mut spec = self.clone();
        for key in ENTRY_KEYS {
            spec.attrs.remove(key);
        }
        spec
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{parent} -> ")?;
        }
        write!(f, "{}", self.indicator)?;
        if let Some(location) = self.location() {
            write!(f, "({location})")?;
        }
        Ok(())
    }
}

impl PartialOrd for PathSpec {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathSpec {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.comparable().cmp(&other.comparable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_over_os() -> PathSpec {
        PathSpec::builder(TypeIndicator::DataRange)
            .parent(PathSpec::os("/img.raw"))
            .uint("range_offset", 32256)
            .uint("range_size", 8577654784)
            .build()
            .unwrap()
    }

    #[test]
    fn comparable_walks_parent_first_with_sorted_keys() {
        let spec = range_over_os();
        assert_eq!(
            spec.comparable(),
            "type=OS, location=/img.raw\ntype=DATA_RANGE, range_offset=32256, range_size=8577654784\n"
        );
    }

    #[test]
    fn comparable_round_trip() {
        let spec = range_over_os();
        assert_eq!(parse(&spec.comparable()).unwrap(), spec);
    }

    #[test]
    fn comparable_escapes_commas_and_round_trips() {
        let spec = PathSpec::os("/dir,with\\odd\nname");
        let comparable = spec.comparable();
        assert!(comparable.contains("\\,"));
        assert_eq!(parse(&comparable).unwrap(), spec);
    }

    #[test]
    fn bytes_attributes_print_hex() {
        let spec = PathSpec::builder(TypeIndicator::EncryptedStream)
            .parent(PathSpec::os("/ct.bin"))
            .text("encryption_method", "aes")
            .bytes("key", vec![0xde, 0xad, 0xbe, 0xef])
            .build()
            .unwrap();
        assert!(spec.comparable().contains("key=0xdeadbeef"));
        assert_eq!(parse(&spec.comparable()).unwrap(), spec);
    }

    #[test]
    fn equality_is_comparable_equality() {
        assert_eq!(range_over_os(), range_over_os());
        let other = PathSpec::builder(TypeIndicator::DataRange)
            .parent(PathSpec::os("/img.raw"))
            .uint("range_offset", 0)
            .uint("range_size", 8577654784)
            .build()
            .unwrap();
        assert_ne!(range_over_os(), other);
    }

    #[test]
    fn ordering_follows_comparable() {
        let a = PathSpec::os("/a");
        let b = PathSpec::os("/b");
        assert!(a < b);
        assert_eq!(a.comparable().cmp(&b.comparable()), std::cmp::Ordering::Less);
    }

    #[test]
    fn chain_depth_counts_records() {
        assert_eq!(PathSpec::os("/x").chain_depth(), 1);
        assert_eq!(range_over_os().chain_depth(), 2);
    }

    #[test]
    fn chain_terminates_at_system_level_leaf() {
        let spec = range_over_os();
        let mut node = &spec;
        let mut hops = 0;
        while let Some(parent) = node.parent() {
            node = parent;
            hops += 1;
            assert!(hops < spec.chain_depth());
        }
        assert!(node.is_system_level());
    }

    #[test]
    fn file_system_spec_strips_entry_addressing() {
        let spec = PathSpec::builder(TypeIndicator::Tar)
            .parent(PathSpec::os("/logs.tar"))
            .text("location", "/syslog")
            .build()
            .unwrap();
        let fs_spec = spec.file_system_spec();
        assert_eq!(fs_spec.indicator(), TypeIndicator::Tar);
        assert!(fs_spec.location().is_none());
        assert_eq!(fs_spec.parent(), spec.parent());
    }

    #[test]
    fn display_renders_chain() {
        let rendered = range_over_os().to_string();
        assert!(rendered.contains("OS(/img.raw)"));
        assert!(rendered.contains("DATA_RANGE"));
    }
}
