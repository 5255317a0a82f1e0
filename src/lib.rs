//! # stackfs
//!
//! Read-only, uniform access to file-system objects nested inside layered
//! storage artifacts: disk images, volume systems, encrypted containers,
//! archives, compressed and encoded streams, and live host directories.
//!
//! The central abstraction is the **stacked path specification** — a chain
//! of typed records naming a datum by describing, from outside in, each
//! container it is nested within. From such a chain the resolver
//! materializes either a byte-addressable stream or a navigable file-entry
//! tree.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stackfs::resolver::{Context, Resolver};
//! use stackfs::stream::FileObjectExt;
//! use stackfs::{PathSpec, TypeIndicator};
//!
//! // logs.tgz, gzip of a tar, member "syslog":
//! let spec = PathSpec::builder(TypeIndicator::Tar)
//!     .parent(
//!         PathSpec::builder(TypeIndicator::Gzip)
//!             .parent(PathSpec::os("/cases/logs.tgz"))
//!             .build()?,
//!     )
//!     .text("location", "/syslog")
//!     .build()?;
//!
//! let resolver = Resolver::new();
//! let context = Context::new();
//! let entry = resolver.open_file_entry(&spec, &context)?;
//! let bytes = entry.file_object(None)?.read_to_end()?;
//! # let _ = bytes;
//! # Ok::<(), stackfs::VfsError>(())
//! ```
//!
//! ---
//!
//! ## Core Components
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | Path-spec algebra | [`spec`] | Typed records, comparable form, factory |
//! | Byte streams | [`stream`] | Seek/read over composed transforms |
//! | Virtual file systems | [`vfs`] | Polymorphic hierarchy traversal |
//! | Resolver | [`resolver`] | Chain → object, cache, mounts, credentials |
//! | Format analyzer | [`analyzer`] | Signature scan over stream content |
//! | Scanners | [`scanner`] | Recursive structural discovery |
//! | Path helpers | [`helpers`] | Windows paths, find-specs |
//!
//! ---
//!
//! ## Back-ends
//!
//! Built in: host OS, fake (tests), `DATA_RANGE`, encoded / compressed /
//! encrypted stream transforms, multi-member gzip, tar, zip, MBR, GPT.
//! External format decoders (NTFS, ext, APFS, QCOW, shadow stores, …) plug
//! in by registering a [`resolver::ResolverHelper`] and, optionally, an
//! [`analyzer::AnalyzerHelper`] for the same type indicator.
//!
//! ---
//!
//! ## Thread Compatibility
//!
//! Streams and file entries are thread-compatible, not thread-safe: one
//! instance is used from one thread at a time, distinct instances are
//! independent. The resolver cache is the only process-wide shared
//! structure and serializes under its own mutex.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for the plain data types (`Stat`, `Timestamp`, …) |

pub mod analyzer;
mod cancel;
mod error;
pub mod helpers;
pub mod resolver;
pub mod scanner;
pub mod spec;
pub mod stream;
pub mod vfs;

pub use cancel::CancelToken;
pub use error::VfsError;
pub use spec::{AttributeValue, PathSpec, TypeIndicator};
