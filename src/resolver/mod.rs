//! # Resolver
//!
//! Maps a path specification to a live object, walking the chain parent
//! first: each layer's back-end helper is invoked against the stream or file
//! system produced by its parent.
//!
//! ## Contexts
//!
//! A [`Context`] carries the per-use state: the file-system cache, the key
//! chain, and an optional interactive credential prompt. Opening is
//! idempotent within a context — repeated opens of the same comparable
//! return the same file-system object — while streams are never cached (one
//! handle per call).
//!
//! ## Example
//!
//! ```rust,no_run
//! use stackfs::resolver::{Context, Resolver};
//! use stackfs::{PathSpec, TypeIndicator};
//!
//! let resolver = Resolver::new();
//! let context = Context::new();
//! let spec = PathSpec::builder(TypeIndicator::Gzip)
//!     .parent(PathSpec::os("/var/log/old/syslog.gz"))
//!     .build()?;
//! let mut stream = resolver.open_file_object(&spec, &context)?;
//! # Ok::<(), stackfs::VfsError>(())
//! ```

mod helpers;
mod keychain;
mod mount;
mod registry;

pub use keychain::{Credential, KeyChain};
pub use mount::MountTable;
pub use registry::{HelperRegistry, ResolverHelper};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::spec::{AttributeValue, PathSpec, TypeIndicator};
use crate::stream::FileObject;
use crate::vfs::{FileEntry, FileSystem};
use crate::VfsError;

/// Interactive credential callback: given the chain and a credential name,
/// produce a value or decline.
pub type CredentialPrompt =
    Box<dyn Fn(&PathSpec, &str) -> Option<Credential> + Send + Sync>;

/// Per-use resolver state: file-system cache, key chain, credential prompt,
/// and the active cancellation token.
///
/// The cache holds weak references under a single mutex; a cached file
/// system lives exactly as long as external references to it, and its
/// back-end handle closes once, on the drop of the last reference.
///
/// A cancellation token attached to the context is handed to the transform
/// streams the helpers construct, so size scans and decompression replays
/// abort cooperatively; scanners attach their token before resolving.
#[derive(Default)]
pub struct Context {
    cache: Mutex<HashMap<String, Weak<dyn FileSystem>>>,
    key_chain: KeyChain,
    prompt: Option<CredentialPrompt>,
    cancel: Mutex<Option<CancelToken>>,
}

impl Context {
    /// A context with an empty key chain and no prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context sharing an existing key chain.
    pub fn with_key_chain(key_chain: KeyChain) -> Self {
        Self {
            key_chain,
            ..Self::default()
        }
    }

    /// Install an interactive credential prompt.
    pub fn set_credential_prompt(&mut self, prompt: CredentialPrompt) {
        self.prompt = Some(prompt);
    }

    /// The context's key chain.
    pub fn key_chain(&self) -> &KeyChain {
        &self.key_chain
    }

    /// Attach the cancellation token that transform streams opened through
    /// this context check during long scans. Replaces any previous token.
    pub fn set_cancel_token(&self, token: CancelToken) {
        *self.cancel.lock().expect("cancel token lock") = Some(token);
    }

    /// The active cancellation token, if one is attached.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.cancel.lock().expect("cancel token lock").clone()
    }

    /// Acquire a credential for `spec`, in order: explicit attribute on the
    /// specification, key-chain entry for the exact comparable, interactive
    /// prompt. `None` means locked.
    pub fn credential(&self, spec: &PathSpec, name: &str) -> Option<Credential> {
        match spec.get(name) {
            Some(AttributeValue::Text(text)) => return Some(Credential::Text(text.clone())),
            Some(AttributeValue::Bytes(bytes)) => {
                return Some(Credential::Bytes(bytes.clone()));
            }
            _ => {}
        }
        if let Some(found) = self.key_chain.get(spec, name) {
            return Some(found);
        }
        self.prompt.as_ref().and_then(|prompt| prompt(spec, name))
    }

    /// Pre-register a file system for a chain, bypassing its helper.
    ///
    /// This is how fake hierarchies enter resolution: build one, register it,
    /// and `FAKE` specifications resolve against it.
    pub fn register_file_system(&self, spec: &PathSpec, file_system: Arc<dyn FileSystem>) {
        let key = spec.file_system_spec().comparable();
        let mut cache = self.cache.lock().expect("resolver cache lock");
        cache.insert(key, Arc::downgrade(&file_system));
    }

    fn cached(&self, key: &str) -> Option<Arc<dyn FileSystem>> {
        let mut cache = self.cache.lock().expect("resolver cache lock");
        match cache.get(key) {
            Some(weak) => match weak.upgrade() {
                Some(strong) => Some(strong),
                None => {
                    cache.remove(key);
                    None
                }
            },
            None => None,
        }
    }

    fn store(&self, key: String, file_system: &Arc<dyn FileSystem>) {
        let mut cache = self.cache.lock().expect("resolver cache lock");
        cache.retain(|_, weak| weak.strong_count() > 0);
        cache.insert(key, Arc::downgrade(file_system));
    }
}

/// The chain-walking engine.
///
/// Holds the helper registry and the mount table; per-use state lives in a
/// [`Context`]. Cheap to construct with the built-in back-ends, or assemble
/// from parts to share process-wide tables.
pub struct Resolver {
    registry: Arc<HelperRegistry>,
    mounts: MountTable,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// A resolver with the built-in back-ends and a fresh mount table.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(HelperRegistry::with_builtins()),
            mounts: MountTable::new(),
        }
    }

    /// Assemble from an existing registry and mount table.
    pub fn with_parts(registry: Arc<HelperRegistry>, mounts: MountTable) -> Self {
        Self { registry, mounts }
    }

    /// The helper registry, for registering external back-ends.
    pub fn registry(&self) -> &HelperRegistry {
        &self.registry
    }

    /// The mount table consulted for `MOUNT` records.
    pub fn mount_table(&self) -> &MountTable {
        &self.mounts
    }

    /// Follow a `MOUNT` record to its mounted chain, if applicable.
    fn deref_mount(&self, spec: &PathSpec) -> Result<Option<PathSpec>, VfsError> {
        if spec.indicator() != TypeIndicator::Mount {
            return Ok(None);
        }
        let identifier = spec.text("identifier").ok_or_else(|| VfsError::PathSpec {
            reason: "MOUNT specification requires an identifier".into(),
        })?;
        let target = self.mounts.get(identifier)?;
        trace!(identifier, target = %target, "mount point resolved");
        Ok(Some(target))
    }

    /// Open a byte stream for `spec`. One fresh handle per call.
    pub fn open_file_object(
        &self,
        spec: &PathSpec,
        context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        if let Some(target) = self.deref_mount(spec)? {
            return self.open_file_object(&target, context);
        }
        trace!(spec = %spec, "opening file object");
        let helper = self.registry.helper(spec.indicator())?;
        helper.new_file_object(spec, self, context)
    }

    /// Open (or fetch from the context cache) the file system containing the
    /// entry `spec` addresses.
    pub fn open_file_system(
        &self,
        spec: &PathSpec,
        context: &Context,
    ) -> Result<Arc<dyn FileSystem>, VfsError> {
        if let Some(target) = self.deref_mount(spec)? {
            return self.open_file_system(&target, context);
        }
        let key = spec.file_system_spec().comparable();
        if let Some(cached) = context.cached(&key) {
            trace!(spec = %spec, "file system cache hit");
            return Ok(cached);
        }
        debug!(spec = %spec, "opening file system");
        let helper = self.registry.helper(spec.indicator())?;
        let file_system = helper.new_file_system(spec, self, context)?;
        context.store(key, &file_system);
        Ok(file_system)
    }

    /// Open the file entry `spec` addresses.
    pub fn open_file_entry(
        &self,
        spec: &PathSpec,
        context: &Context,
    ) -> Result<Box<dyn FileEntry>, VfsError> {
        if let Some(target) = self.deref_mount(spec)? {
            return self.open_file_entry(&target, context);
        }
        let file_system = self.open_file_system(spec, context)?;
        file_system.entry_by_spec(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FileObjectExt;
    use crate::vfs::fake::FakeFileSystemBuilder;
    use std::io::Write;

    fn os_fixture(content: &[u8]) -> (tempfile::TempDir, PathSpec) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.bin");
        std::fs::File::create(&path).unwrap().write_all(content).unwrap();
        let spec = PathSpec::os(path.to_str().unwrap());
        (dir, spec)
    }

    #[test]
    fn os_chain_resolves_to_stream() {
        let (_dir, spec) = os_fixture(b"raw bytes");
        let resolver = Resolver::new();
        let context = Context::new();
        let mut stream = resolver.open_file_object(&spec, &context).unwrap();
        assert_eq!(stream.read_to_end().unwrap(), b"raw bytes");
    }

    #[test]
    fn data_range_over_os() {
        let (_dir, os_spec) = os_fixture(b"0123456789");
        let spec = PathSpec::builder(TypeIndicator::DataRange)
            .parent(os_spec)
            .uint("range_offset", 4)
            .uint("range_size", 3)
            .build()
            .unwrap();
        let resolver = Resolver::new();
        let context = Context::new();
        let mut stream = resolver.open_file_object(&spec, &context).unwrap();
        assert_eq!(stream.size().unwrap(), 3);
        assert_eq!(stream.read_to_end().unwrap(), b"456");
    }

    #[test]
    fn mount_indirects_to_target() {
        let (_dir, os_spec) = os_fixture(b"mounted");
        let resolver = Resolver::new();
        resolver.mount_table().mount("evidence1", os_spec).unwrap();
        let context = Context::new();
        let mut stream = resolver
            .open_file_object(&PathSpec::mount("evidence1"), &context)
            .unwrap();
        assert_eq!(stream.read_to_end().unwrap(), b"mounted");
    }

    #[test]
    fn unknown_mount_fails() {
        let resolver = Resolver::new();
        let context = Context::new();
        let err = resolver
            .open_file_object(&PathSpec::mount("nope"), &context)
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[test]
    fn unsupported_type_fails() {
        let (_dir, os_spec) = os_fixture(b"");
        let spec = PathSpec::builder(TypeIndicator::Qcow)
            .parent(os_spec)
            .build()
            .unwrap();
        let resolver = Resolver::new();
        let context = Context::new();
        let err = resolver.open_file_object(&spec, &context).unwrap_err();
        assert!(matches!(err, VfsError::UnsupportedType { .. }));
    }

    #[test]
    fn file_system_cache_returns_same_object() {
        let fake = FakeFileSystemBuilder::new()
            .add_file("/a", b"x".to_vec())
            .add_file("/b", b"y".to_vec())
            .build();
        let resolver = Resolver::new();
        let context = Context::new();
        let handle: Arc<dyn FileSystem> = Arc::new(fake);
        context.register_file_system(&PathSpec::fake("/"), Arc::clone(&handle));

        let first = resolver
            .open_file_system(&PathSpec::fake("/a"), &context)
            .unwrap();
        let second = resolver
            .open_file_system(&PathSpec::fake("/b"), &context)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &handle));
    }

    #[test]
    fn cache_releases_on_last_drop() {
        let fake = FakeFileSystemBuilder::new().add_file("/a", b"x".to_vec()).build();
        let resolver = Resolver::new();
        let context = Context::new();
        let handle: Arc<dyn FileSystem> = Arc::new(fake);
        context.register_file_system(&PathSpec::fake("/"), Arc::clone(&handle));
        drop(handle);

        // The weak entry is dead: resolution falls through to the helper,
        // which has nothing registered for FAKE.
        let err = resolver
            .open_file_entry(&PathSpec::fake("/a"), &context)
            .unwrap_err();
        assert!(matches!(err, VfsError::BackEnd(_)));
    }

    #[test]
    fn context_cancel_token_reaches_transform_streams() {
        use crate::cancel::CancelToken;

        let encoded = {
            let mut encoder = flate2::write::GzEncoder::new(
                Vec::new(),
                flate2::Compression::default(),
            );
            encoder.write_all(&vec![0u8; 4 * 1024 * 1024]).unwrap();
            encoder.finish().unwrap()
        };
        let (_dir, os_spec) = os_fixture(&encoded);
        let spec = PathSpec::builder(TypeIndicator::Gzip)
            .parent(os_spec)
            .build()
            .unwrap();

        let resolver = Resolver::new();
        let context = Context::new();
        let token = CancelToken::new();
        token.cancel();
        context.set_cancel_token(token);

        let mut stream = resolver.open_file_object(&spec, &context).unwrap();
        assert!(matches!(stream.size(), Err(VfsError::Cancelled)));
    }

    #[test]
    fn credential_order_prefers_spec_attribute() {
        let spec = PathSpec::builder(TypeIndicator::EncryptedStream)
            .parent(PathSpec::os("/ct.bin"))
            .text("encryption_method", "rc4")
            .bytes("key", b"0123456789abcdef".to_vec())
            .build()
            .unwrap();
        let context = Context::new();
        context.key_chain().set(&spec, "key", "from-chain");
        let found = context.credential(&spec, "key").unwrap();
        assert_eq!(found.as_bytes(), b"0123456789abcdef");
    }

    #[test]
    fn credential_falls_back_to_prompt() {
        let spec = PathSpec::builder(TypeIndicator::Bde)
            .parent(PathSpec::os("/disk.raw"))
            .build()
            .unwrap();
        let mut context = Context::new();
        assert!(context.credential(&spec, "password").is_none());
        context.set_credential_prompt(Box::new(|_, name| {
            (name == "password").then(|| Credential::Text("prompted".into()))
        }));
        assert_eq!(
            context.credential(&spec, "password").unwrap().as_bytes(),
            b"prompted"
        );
    }
}
