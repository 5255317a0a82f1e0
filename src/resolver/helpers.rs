//! Built-in resolver helpers.

use std::sync::Arc;

use crate::resolver::{Context, HelperRegistry, Resolver, ResolverHelper};
use crate::spec::{PathSpec, TypeIndicator};
use crate::stream::{
    CompressedStream, CompressionMethod, DataRangeStream, EncodedStream, EncodingMethod,
    EncryptedStream, EncryptionMethod, CipherMode, FileObject, GzipStream, OsFileStream,
};
use crate::vfs::os::OsFileSystem;
use crate::vfs::tar::TarFileSystem;
use crate::vfs::zip::ZipFileSystem;
use crate::vfs::FileSystem;
use crate::VfsError;

fn required_text<'spec>(spec: &'spec PathSpec, key: &str) -> Result<&'spec str, VfsError> {
    spec.text(key).ok_or_else(|| VfsError::PathSpec {
        reason: format!("{} requires a {key} attribute", spec.indicator()),
    })
}

fn required_uint(spec: &PathSpec, key: &str) -> Result<u64, VfsError> {
    spec.uint(key).ok_or_else(|| VfsError::PathSpec {
        reason: format!("{} requires a {key} attribute", spec.indicator()),
    })
}

fn open_parent(
    spec: &PathSpec,
    resolver: &Resolver,
    context: &Context,
) -> Result<Box<dyn FileObject>, VfsError> {
    let parent = spec.parent().ok_or_else(|| VfsError::PathSpec {
        reason: format!("{} requires a parent chain", spec.indicator()),
    })?;
    resolver.open_file_object(parent, context)
}

struct OsHelper;

impl ResolverHelper for OsHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Os
    }

    fn provides_file_system(&self) -> bool {
        true
    }

    fn new_file_object(
        &self,
        spec: &PathSpec,
        _resolver: &Resolver,
        _context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        let location = required_text(spec, "location")?;
        Ok(Box::new(OsFileStream::open(location)?))
    }

    fn new_file_system(
        &self,
        _spec: &PathSpec,
        _resolver: &Resolver,
        _context: &Context,
    ) -> Result<Arc<dyn FileSystem>, VfsError> {
        Ok(OsFileSystem::new())
    }
}

struct FakeHelper;

impl ResolverHelper for FakeHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Fake
    }

    fn provides_file_system(&self) -> bool {
        true
    }

    fn new_file_system(
        &self,
        _spec: &PathSpec,
        _resolver: &Resolver,
        _context: &Context,
    ) -> Result<Arc<dyn FileSystem>, VfsError> {
        // Fake hierarchies exist only where a test registered one.
        Err(VfsError::BackEnd(
            "no fake hierarchy registered in this context".into(),
        ))
    }
}

struct DataRangeHelper;

impl ResolverHelper for DataRangeHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::DataRange
    }

    fn new_file_object(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        let range_offset = required_uint(spec, "range_offset")?;
        let range_size = required_uint(spec, "range_size")?;
        let parent = open_parent(spec, resolver, context)?;
        Ok(Box::new(DataRangeStream::new(parent, range_offset, range_size)?))
    }
}

struct CompressedStreamHelper;

impl ResolverHelper for CompressedStreamHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::CompressedStream
    }

    fn new_file_object(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        let method = CompressionMethod::from_name(required_text(spec, "compression_method")?)?;
        let parent = open_parent(spec, resolver, context)?;
        let mut stream = CompressedStream::new(parent, method);
        if let Some(token) = context.cancel_token() {
            stream.set_cancel_token(token);
        }
        Ok(Box::new(stream))
    }
}

/// `BZIP2`, `XZ` and `LZMA` records are method-fixed compressed streams.
struct FixedCompressionHelper {
    indicator: TypeIndicator,
    method: CompressionMethod,
}

impl ResolverHelper for FixedCompressionHelper {
    fn type_indicator(&self) -> TypeIndicator {
        self.indicator
    }

    fn new_file_object(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        let parent = open_parent(spec, resolver, context)?;
        let mut stream = CompressedStream::new(parent, self.method);
        if let Some(token) = context.cancel_token() {
            stream.set_cancel_token(token);
        }
        Ok(Box::new(stream))
    }
}

struct GzipHelper;

impl ResolverHelper for GzipHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Gzip
    }

    fn new_file_object(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        let parent = open_parent(spec, resolver, context)?;
        let mut stream = GzipStream::new(parent);
        if let Some(token) = context.cancel_token() {
            stream.set_cancel_token(token);
        }
        Ok(Box::new(stream))
    }
}

struct EncodedStreamHelper;

impl ResolverHelper for EncodedStreamHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::EncodedStream
    }

    fn new_file_object(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        let method = EncodingMethod::from_name(required_text(spec, "encoding_method")?)?;
        let parent = open_parent(spec, resolver, context)?;
        Ok(Box::new(EncodedStream::new(parent, method)?))
    }
}

struct EncryptedStreamHelper;

impl ResolverHelper for EncryptedStreamHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::EncryptedStream
    }

    fn new_file_object(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Box<dyn FileObject>, VfsError> {
        let method = EncryptionMethod::from_name(required_text(spec, "encryption_method")?)?;
        let mode = spec
            .text("cipher_mode")
            .map(CipherMode::from_name)
            .transpose()?;
        // Explicit attribute, then key chain, then prompt.
        let key = context
            .credential(spec, "key")
            .ok_or_else(|| VfsError::EncryptedVolumeLocked {
                location: spec.to_string(),
            })?;
        let iv = spec.bytes("initialization_vector").map(<[u8]>::to_vec);
        let parent = open_parent(spec, resolver, context)?;
        Ok(Box::new(EncryptedStream::new(
            parent,
            method,
            mode,
            key.as_bytes(),
            iv.as_deref(),
        )?))
    }
}

struct TarHelper;

impl ResolverHelper for TarHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Tar
    }

    fn provides_file_system(&self) -> bool {
        true
    }

    fn new_file_system(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Arc<dyn FileSystem>, VfsError> {
        let parent = open_parent(spec, resolver, context)?;
        Ok(Arc::new(TarFileSystem::open(parent, spec)?))
    }
}

struct ZipHelper;

impl ResolverHelper for ZipHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Zip
    }

    fn provides_file_system(&self) -> bool {
        true
    }

    fn new_file_system(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Arc<dyn FileSystem>, VfsError> {
        let parent = open_parent(spec, resolver, context)?;
        Ok(Arc::new(ZipFileSystem::open(parent, spec)?))
    }
}

struct MbrHelper;

impl ResolverHelper for MbrHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Mbr
    }

    fn provides_file_system(&self) -> bool {
        true
    }

    fn new_file_system(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Arc<dyn FileSystem>, VfsError> {
        let parent = open_parent(spec, resolver, context)?;
        Ok(Arc::new(crate::vfs::mbr::open_mbr(parent, spec)?))
    }
}

struct GptHelper;

impl ResolverHelper for GptHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::Gpt
    }

    fn provides_file_system(&self) -> bool {
        true
    }

    fn new_file_system(
        &self,
        spec: &PathSpec,
        resolver: &Resolver,
        context: &Context,
    ) -> Result<Arc<dyn FileSystem>, VfsError> {
        let parent = open_parent(spec, resolver, context)?;
        Ok(Arc::new(crate::vfs::gpt::open_gpt(parent, spec)?))
    }
}

/// Register every built-in back-end.
pub fn register_builtins(registry: &HelperRegistry) {
    registry.register(Arc::new(OsHelper));
    registry.register(Arc::new(FakeHelper));
    registry.register(Arc::new(DataRangeHelper));
    registry.register(Arc::new(CompressedStreamHelper));
    registry.register(Arc::new(EncodedStreamHelper));
    registry.register(Arc::new(EncryptedStreamHelper));
    registry.register(Arc::new(GzipHelper));
    registry.register(Arc::new(FixedCompressionHelper {
        indicator: TypeIndicator::Bzip2,
        method: CompressionMethod::Bzip2,
    }));
    registry.register(Arc::new(FixedCompressionHelper {
        indicator: TypeIndicator::Xz,
        method: CompressionMethod::Xz,
    }));
    registry.register(Arc::new(FixedCompressionHelper {
        indicator: TypeIndicator::Lzma,
        method: CompressionMethod::Lzma,
    }));
    registry.register(Arc::new(TarHelper));
    registry.register(Arc::new(ZipHelper));
    registry.register(Arc::new(MbrHelper));
    registry.register(Arc::new(GptHelper));
}
