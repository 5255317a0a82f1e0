//! Back-end helper registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::resolver::{Context, Resolver};
use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::FileObject;
use crate::vfs::FileSystem;
use crate::VfsError;

/// One back-end's resolver-side factory.
///
/// A helper declares what it can produce and builds it against the object
/// produced by the parent layer (obtained back through the [`Resolver`]).
/// Helpers may provide a stream, a file system, or both; the defaults wire
/// the two together — a file-system helper gets stream support for free by
/// serving the addressed entry's data stream.
pub trait ResolverHelper: Send + Sync {
    /// The type indicator this helper serves.
    fn type_indicator(&self) -> TypeIndicator;

    /// Whether [`new_file_object`](ResolverHelper::new_file_object) is
    /// supported.
    fn provides_file_object(&self) -> bool {
        true
    }

    /// Whether [`new_file_system`](ResolverHelper::new_file_system) is
    /// supported.
    fn provides_file_system(&self) -> bool {
        false
    }

    /// Open a byte stream for `spec`.
    ///
    /// The default serves the default (or spec-selected) data stream of the
    /// entry the specification addresses.
    fn new_file_object(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        let file_system = resolver.open_file_system(spec, context)?;
        let entry = file_system.entry_by_spec(spec)?;
        entry.file_object(spec.text("data_stream"))
    }

    /// Open a file system for `spec`.
    fn new_file_system(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Arc<dyn FileSystem>, VfsError> {
        let _ = (spec, resolver, context);
        Err(VfsError::UnsupportedType {
            indicator: self.type_indicator().as_str(),
        })
    }
}

impl std::fmt::Debug for dyn ResolverHelper + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ResolverHelper")
    }
}

/// Registry of resolver helpers, keyed on type indicator.
///
/// Registration is idempotent: re-registering a type indicator replaces the
/// previous helper. External decoders register here to extend the resolver
/// beyond the built-in back-ends.
#[derive(Default)]
pub struct HelperRegistry {
    helpers: Mutex<HashMap<TypeIndicator, Arc<dyn ResolverHelper>>>,
}

impl HelperRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in back-end registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        super::helpers::register_builtins(&registry);
        registry
    }

    /// Register (or replace) the helper for its type indicator.
    pub fn register(&self, helper: Arc<dyn ResolverHelper>) {
        let mut helpers = self.helpers.lock().expect("helper registry lock");
        helpers.insert(helper.type_indicator(), helper);
    }

    /// Remove the helper for `indicator`, if registered.
    pub fn deregister(&self, indicator: TypeIndicator) {
        let mut helpers = self.helpers.lock().expect("helper registry lock");
        helpers.remove(&indicator);
    }

    /// Look up the helper for `indicator`.
    ///
    /// # Errors
    ///
    /// [`VfsError::UnsupportedType`] when nothing is registered.
    pub fn helper(&self, indicator: TypeIndicator) -> Result<Arc<dyn ResolverHelper>, VfsError> {
        let helpers = self.helpers.lock().expect("helper registry lock");
        helpers
            .get(&indicator)
            .cloned()
            .ok_or(VfsError::UnsupportedType {
                indicator: indicator.as_str(),
            })
    }

    /// Whether a helper is registered for `indicator`.
    pub fn supports(&self, indicator: TypeIndicator) -> bool {
        let helpers = self.helpers.lock().expect("helper registry lock");
        helpers.contains_key(&indicator)
    }
}
