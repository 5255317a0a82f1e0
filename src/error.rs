//! # Error Types
//!
//! Comprehensive error handling for stackfs operations.
//!
//! ## Overview
//!
//! All stackfs operations return `Result<T, VfsError>`. The [`VfsError`] enum
//! covers a closed set of failure classes, each carrying enough context to
//! tell which layer of a chain failed and why:
//!
//! - **Chain information** — Which path specification caused the error
//! - **Operation context** — What was being opened, read, or scanned
//! - **Specific details** — Bad magic values, missing attributes, locked volumes
//!
//! ## Error Categories
//!
//! | Category | Variants | Description |
//! |----------|----------|-------------|
//! | Registration | `UnsupportedType` | No back-end helper registered for a type indicator |
//! | Specification | `PathSpec` | Malformed chain, missing/extra attribute, orphan root |
//! | Lookup | `NotFound`, `AccessDenied` | Path or entry absent, host permission |
//! | Data | `InvalidData`, `CorruptVolume` | Format violation, structural inconsistency |
//! | Credentials | `EncryptedVolumeLocked` | Credential missing or wrong |
//! | Back-end | `BackEnd`, `Io` | Opaque decoder failure, host I/O failure |
//! | Abort | `Cancelled`, `TimedOut` | Cooperative cancellation |
//!
//! ## Quick Example
//!
//! ```rust
//! use stackfs::VfsError;
//!
//! let err = VfsError::NotFound { location: "/missing.txt".into() };
//! assert!(err.to_string().contains("/missing.txt"));
//!
//! let err = VfsError::UnsupportedType { indicator: "VSHADOW" };
//! assert!(err.to_string().contains("VSHADOW"));
//! ```
//!
//! ## Conversion from std::io::Error
//!
//! [`VfsError`] implements `From<std::io::Error>` so OS back-end failures map
//! onto the closed set:
//!
//! ```rust
//! use stackfs::VfsError;
//! use std::io::{Error, ErrorKind};
//!
//! let io_err = Error::new(ErrorKind::NotFound, "file not found");
//! let vfs_err: VfsError = io_err.into();
//! assert!(matches!(vfs_err, VfsError::NotFound { .. }));
//! ```

/// Error type for every stackfs operation.
///
/// The variant set is closed by design: low-level decoder failures are wrapped
/// as [`InvalidData`](VfsError::InvalidData) or [`BackEnd`](VfsError::BackEnd)
/// and never surfaced raw. Scanners collect these per branch rather than
/// aborting a whole scan.
///
/// # Display Format
///
/// All variants implement `Display` with human-readable messages:
///
/// ```rust
/// use stackfs::VfsError;
///
/// let err = VfsError::EncryptedVolumeLocked { location: "/p1".into() };
/// assert_eq!(err.to_string(), "encrypted volume locked: /p1");
/// ```
///
/// # Error Source Chain
///
/// The [`Io`](VfsError::Io) variant wraps `std::io::Error` with the
/// `#[source]` attribute, enabling error chain traversal via
/// `std::error::Error::source()`.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// No back-end helper is registered for a type indicator.
    #[error("unsupported type: {indicator}")]
    UnsupportedType {
        /// The type indicator with no registered helper.
        indicator: &'static str,
    },

    /// Malformed chain: missing or extra attribute, wrong parent presence,
    /// or an unparsable comparable form.
    #[error("path specification error: {reason}")]
    PathSpec {
        /// What is wrong with the specification.
        reason: String,
    },

    /// Path or entry does not exist.
    #[error("not found: {location}")]
    NotFound {
        /// The location that was not found.
        location: String,
    },

    /// Host denied access to the underlying object.
    #[error("access denied: {location}")]
    AccessDenied {
        /// The location where access was denied.
        location: String,
    },

    /// Format violation: bad magic, truncated header, decode failure.
    #[error("invalid data: {details}")]
    InvalidData {
        /// Details about the violation.
        details: String,
    },

    /// Structural inconsistency encountered mid-traversal of an otherwise
    /// recognized volume.
    #[error("corrupt volume: {details}")]
    CorruptVolume {
        /// Details about the inconsistency.
        details: String,
    },

    /// Credential missing or wrong for an encrypted layer.
    #[error("encrypted volume locked: {location}")]
    EncryptedVolumeLocked {
        /// The location of the locked layer.
        location: String,
    },

    /// An external decoder surfaced an opaque error.
    #[error("back-end failure: {0}")]
    BackEnd(String),

    /// Operation aborted through a cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Caller-imposed deadline expired.
    #[error("operation timed out")]
    TimedOut,

    /// Host I/O failure with context.
    #[error("{operation} failed for {location}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The location involved.
        location: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for VfsError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound {
                location: String::new(),
            },
            std::io::ErrorKind::PermissionDenied => VfsError::AccessDenied {
                location: String::new(),
            },
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                VfsError::InvalidData {
                    details: error.to_string(),
                }
            }
            _ => VfsError::Io {
                operation: "io",
                location: String::new(),
                source: error,
            },
        }
    }
}

impl VfsError {
    /// Wrap a host I/O error with the operation and location it belongs to.
    pub fn io(operation: &'static str, location: impl Into<String>, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound {
                location: location.into(),
            },
            std::io::ErrorKind::PermissionDenied => VfsError::AccessDenied {
                location: location.into(),
            },
            _ => VfsError::Io {
                operation,
                location: location.into(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfs_error_not_found_display() {
        let err = VfsError::NotFound {
            location: "/missing".into(),
        };
        assert_eq!(err.to_string(), "not found: /missing");
    }

    #[test]
    fn vfs_error_unsupported_type_display() {
        let err = VfsError::UnsupportedType { indicator: "QCOW" };
        assert_eq!(err.to_string(), "unsupported type: QCOW");
    }

    #[test]
    fn vfs_error_path_spec_display() {
        let err = VfsError::PathSpec {
            reason: "OS requires a location attribute".into(),
        };
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn vfs_error_from_io_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err = VfsError::from(io_err);
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[test]
    fn vfs_error_from_io_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err = VfsError::from(io_err);
        assert!(matches!(err, VfsError::AccessDenied { .. }));
    }

    #[test]
    fn vfs_error_from_io_unexpected_eof() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = VfsError::from(io_err);
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }

    #[test]
    fn vfs_error_io_helper_keeps_context() {
        let io_err = std::io::Error::other("disk fell over");
        let err = VfsError::io("read", "/dev/sda", io_err);
        let msg = err.to_string();
        assert!(msg.contains("read"));
        assert!(msg.contains("/dev/sda"));
    }
}
