//! Mount-point table for `MOUNT` indirection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::spec::PathSpec;
use crate::VfsError;

/// Mapping identifier → chain, consulted when a `MOUNT` record is resolved.
///
/// Identifiers are unique: mounting an identifier twice fails, entries may
/// be added and removed at runtime, and looking up an unknown identifier
/// fails. Cloning is cheap; clones share the table.
#[derive(Debug, Default, Clone)]
pub struct MountTable {
    inner: Arc<Mutex<HashMap<String, PathSpec>>>,
}

impl MountTable {
    /// An empty mount table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide convenience instance.
    pub fn global() -> &'static MountTable {
        static GLOBAL: OnceLock<MountTable> = OnceLock::new();
        GLOBAL.get_or_init(MountTable::new)
    }

    /// Mount `spec` under `identifier`.
    ///
    /// # Errors
    ///
    /// [`VfsError::PathSpec`] if the identifier is already mounted.
    pub fn mount(&self, identifier: &str, spec: PathSpec) -> Result<(), VfsError> {
        let mut inner = self.inner.lock().expect("mount table lock");
        if inner.contains_key(identifier) {
            return Err(VfsError::PathSpec {
                reason: format!("mount point already exists: {identifier}"),
            });
        }
        inner.insert(identifier.to_string(), spec);
        Ok(())
    }

    /// Remove the mount under `identifier`.
    ///
    /// # Errors
    ///
    /// [`VfsError::NotFound`] if the identifier is not mounted.
    pub fn unmount(&self, identifier: &str) -> Result<PathSpec, VfsError> {
        let mut inner = self.inner.lock().expect("mount table lock");
        inner.remove(identifier).ok_or_else(|| VfsError::NotFound {
            location: format!("mount point {identifier}"),
        })
    }

    /// Resolve `identifier` to its mounted chain.
    ///
    /// # Errors
    ///
    /// [`VfsError::NotFound`] if the identifier is not mounted.
    pub fn get(&self, identifier: &str) -> Result<PathSpec, VfsError> {
        let inner = self.inner.lock().expect("mount table lock");
        inner.get(identifier).cloned().ok_or_else(|| VfsError::NotFound {
            location: format!("mount point {identifier}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_lookup_unmount() {
        let table = MountTable::new();
        table.mount("C", PathSpec::os("/images/c_drive.raw")).unwrap();
        assert_eq!(
            table.get("C").unwrap().location(),
            Some("/images/c_drive.raw")
        );
        table.unmount("C").unwrap();
        assert!(matches!(table.get("C"), Err(VfsError::NotFound { .. })));
    }

    #[test]
    fn duplicate_mount_fails() {
        let table = MountTable::new();
        table.mount("C", PathSpec::os("/a")).unwrap();
        let err = table.mount("C", PathSpec::os("/b")).unwrap_err();
        assert!(matches!(err, VfsError::PathSpec { .. }));
    }

    #[test]
    fn unknown_unmount_fails() {
        let table = MountTable::new();
        assert!(matches!(
            table.unmount("nope"),
            Err(VfsError::NotFound { .. })
        ));
    }
}
