//! On-the-fly decompression transform.

use std::io::{Read, SeekFrom};

use bzip2::read::BzDecoder;
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use xz2::read::XzDecoder;

use crate::cancel::CancelToken;
use crate::stream::{FileObject, StreamReader};
use crate::VfsError;

/// Supported compression methods for `COMPRESSED_STREAM` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// bzip2.
    Bzip2,
    /// gzip, member-continuous (multiple members decode as one stream).
    Gzip,
    /// LZMA-alone.
    Lzma,
    /// xz.
    Xz,
    /// zlib-wrapped DEFLATE.
    Zlib,
    /// Raw DEFLATE without a container.
    Deflate,
}

impl CompressionMethod {
    /// Parse the `compression_method` attribute value.
    pub fn from_name(name: &str) -> Result<Self, VfsError> {
        match name.to_ascii_lowercase().as_str() {
            "bzip2" => Ok(Self::Bzip2),
            "gzip" => Ok(Self::Gzip),
            "lzma" => Ok(Self::Lzma),
            "xz" => Ok(Self::Xz),
            "zlib" => Ok(Self::Zlib),
            "deflate" => Ok(Self::Deflate),
            other => Err(VfsError::PathSpec {
                reason: format!("unknown compression method: {other}"),
            }),
        }
    }
}

type Parent = StreamReader<Box<dyn FileObject>>;

enum Decoder {
    Bzip2(BzDecoder<Parent>),
    Gzip(MultiGzDecoder<Parent>),
    Xz(XzDecoder<Parent>),
    Zlib(ZlibDecoder<Parent>),
    Deflate(DeflateDecoder<Parent>),
}

impl Decoder {
    fn new(method: CompressionMethod, parent: Parent) -> Result<Self, VfsError> {
        Ok(match method {
            CompressionMethod::Bzip2 => Self::Bzip2(BzDecoder::new(parent)),
            CompressionMethod::Gzip => Self::Gzip(MultiGzDecoder::new(parent)),
            CompressionMethod::Xz => Self::Xz(XzDecoder::new(parent)),
            CompressionMethod::Lzma => {
                let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX).map_err(|err| {
                    VfsError::InvalidData {
                        details: format!("lzma decoder setup failed: {err}"),
                    }
                })?;
                Self::Xz(XzDecoder::new_stream(parent, stream))
            }
            CompressionMethod::Zlib => Self::Zlib(ZlibDecoder::new(parent)),
            CompressionMethod::Deflate => Self::Deflate(DeflateDecoder::new(parent)),
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Bzip2(decoder) => decoder.read(buf),
            Self::Gzip(decoder) => decoder.read(buf),
            Self::Xz(decoder) => decoder.read(buf),
            Self::Zlib(decoder) => decoder.read(buf),
            Self::Deflate(decoder) => decoder.read(buf),
        }
    }

    fn into_inner(self) -> Parent {
        match self {
            Self::Bzip2(decoder) => decoder.into_inner(),
            Self::Gzip(decoder) => decoder.into_inner(),
            Self::Xz(decoder) => decoder.into_inner(),
            Self::Zlib(decoder) => decoder.into_inner(),
            Self::Deflate(decoder) => decoder.into_inner(),
        }
    }
}

enum State {
    Idle(Parent),
    Active { decoder: Decoder, decoded_pos: u64 },
    Poisoned,
}

/// Errors bubbling out of a decoder are either wrapped parent failures or
/// genuine decode failures.
fn map_decode_err(err: std::io::Error) -> VfsError {
    match err.downcast::<VfsError>() {
        Ok(vfs) => vfs,
        Err(other) => VfsError::InvalidData {
            details: format!("decompression failed: {other}"),
        },
    }
}

/// Seekable decompressed view over a parent stream.
///
/// Decoder state cannot be snapshotted mid-stream, so the only checkpoint for
/// these container-less methods is the stream start: seeking backwards
/// replays the decoder from offset zero and discards until the target. The
/// multi-member [`GzipStream`](crate::stream::GzipStream) adds member
/// boundaries as real checkpoints on top of the same machinery.
///
/// None of the supported containers reliably stores the decompressed size,
/// so the first [`size`](FileObject::size) query runs a one-pass scan to end
/// of stream and memoizes the result.
pub struct CompressedStream {
    method: CompressionMethod,
    state: State,
    offset: u64,
    size: Option<u64>,
    cancel: Option<CancelToken>,
}

impl CompressedStream {
    /// Wrap `parent` for on-the-fly decompression with `method`.
    pub fn new(parent: Box<dyn FileObject>, method: CompressionMethod) -> Self {
        Self {
            method,
            state: State::Idle(StreamReader::new(parent)),
            offset: 0,
            size: None,
            cancel: None,
        }
    }

    /// Attach a cancellation token, checked during replay skips and size
    /// scans.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    fn restart(&mut self) -> Result<(), VfsError> {
        let parent = match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Idle(parent) => parent,
            State::Active { decoder, .. } => decoder.into_inner(),
            State::Poisoned => {
                return Err(VfsError::BackEnd("compressed stream poisoned".into()));
            }
        };
        let mut parent = parent;
        parent.get_mut().seek(SeekFrom::Start(0))?;
        let decoder = Decoder::new(self.method, parent)?;
        self.state = State::Active {
            decoder,
            decoded_pos: 0,
        };
        Ok(())
    }

    /// Position the active decoder exactly at `target`, replaying from the
    /// start checkpoint when the decoder is past it.
    fn position_decoder(&mut self, target: u64) -> Result<(), VfsError> {
        let needs_restart = match &self.state {
            State::Active { decoded_pos, .. } => *decoded_pos > target,
            State::Idle(_) | State::Poisoned => true,
        };
        if needs_restart {
            self.restart()?;
        }
        let cancel = self.cancel.clone();
        let State::Active {
            decoder,
            decoded_pos,
        } = &mut self.state
        else {
            return Err(VfsError::BackEnd("compressed stream poisoned".into()));
        };
        let mut scratch = [0u8; 8192];
        let mut reads: u32 = 0;
        while *decoded_pos < target {
            let want = scratch.len().min((target - *decoded_pos) as usize);
            let count = decoder.read(&mut scratch[..want]).map_err(map_decode_err)?;
            if count == 0 {
                break;
            }
            *decoded_pos += count as u64;
            reads += 1;
            if reads % 16 == 0 {
                if let Some(token) = &cancel {
                    token.check()?;
                }
            }
        }
        Ok(())
    }
}

impl FileObject for CompressedStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        if let Some(size) = self.size {
            if self.offset >= size {
                return Ok(0);
            }
        }
        self.position_decoder(self.offset)?;
        let State::Active {
            decoder,
            decoded_pos,
        } = &mut self.state
        else {
            return Err(VfsError::BackEnd("compressed stream poisoned".into()));
        };
        if *decoded_pos < self.offset {
            // The stream ended before the requested offset.
            return Ok(0);
        }
        let count = decoder.read(buf).map_err(map_decode_err)?;
        *decoded_pos += count as u64;
        self.offset += count as u64;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError> {
        let end_base = match pos {
            SeekFrom::End(delta) => {
                if self.size.is_none() && delta > 0 {
                    return Err(VfsError::InvalidData {
                        details: "seek from end past an undetermined size".into(),
                    });
                }
                self.size()?
            }
            _ => self.size.unwrap_or(0),
        };
        self.offset = super::resolve_seek(self.offset, end_base, pos)?;
        Ok(self.offset)
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        // One-pass scan from wherever the decoder is; memoized.
        let resume = match &self.state {
            State::Active { decoded_pos, .. } => *decoded_pos,
            _ => 0,
        };
        self.position_decoder(resume)?;
        let State::Active {
            decoder,
            decoded_pos,
        } = &mut self.state
        else {
            return Err(VfsError::BackEnd("compressed stream poisoned".into()));
        };
        let mut scratch = [0u8; 8192];
        let mut reads: u32 = 0;
        loop {
            let count = decoder.read(&mut scratch).map_err(map_decode_err)?;
            if count == 0 {
                break;
            }
            *decoded_pos += count as u64;
            reads += 1;
            if reads % 16 == 0 {
                if let Some(token) = &self.cancel {
                    token.check()?;
                }
            }
        }
        let size = *decoded_pos;
        self.size = Some(size);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{FileObjectExt, MemoryStream};
    use flate2::Compression;
    use std::io::Write;

    fn gzip_bytes(payload: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib_bytes(payload: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn stream_over(method: CompressionMethod, encoded: Vec<u8>) -> CompressedStream {
        CompressedStream::new(Box::new(MemoryStream::new(encoded)), method)
    }

    #[test]
    fn gzip_round_trip() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let mut stream = stream_over(CompressionMethod::Gzip, gzip_bytes(&payload));
        assert_eq!(stream.read_to_end().unwrap(), payload);
    }

    #[test]
    fn zlib_round_trip() {
        let payload = b"stacked layers all the way down".to_vec();
        let mut stream = stream_over(CompressionMethod::Zlib, zlib_bytes(&payload));
        assert_eq!(stream.read_to_end().unwrap(), payload);
    }

    #[test]
    fn deflate_round_trip() {
        let payload = b"raw deflate without a container".to_vec();
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let encoded = encoder.finish().unwrap();
        let mut stream = stream_over(CompressionMethod::Deflate, encoded);
        assert_eq!(stream.read_to_end().unwrap(), payload);
    }

    #[test]
    fn size_scan_is_memoized_and_matches() {
        let payload = vec![7u8; 100_000];
        let mut stream = stream_over(CompressionMethod::Gzip, gzip_bytes(&payload));
        assert_eq!(stream.size().unwrap(), 100_000);
        assert_eq!(stream.size().unwrap(), 100_000);
    }

    #[test]
    fn backwards_seek_replays_from_start() {
        let payload: Vec<u8> = (0..50_000u32).map(|value| value as u8).collect();
        let mut stream = stream_over(CompressionMethod::Gzip, gzip_bytes(&payload));

        let mut tail = [0u8; 4];
        stream.read_exact_at(40_000, &mut tail).unwrap();
        assert_eq!(&tail, &payload[40_000..40_004]);

        let mut head = [0u8; 4];
        stream.read_exact_at(8, &mut head).unwrap();
        assert_eq!(&head, &payload[8..12]);
    }

    #[test]
    fn multi_member_gzip_is_continuous() {
        let mut encoded = gzip_bytes(b"first ");
        encoded.extend(gzip_bytes(b"second"));
        let mut stream = stream_over(CompressionMethod::Gzip, encoded);
        assert_eq!(stream.read_to_end().unwrap(), b"first second");
    }

    #[test]
    fn corrupt_payload_is_invalid_data() {
        let mut encoded = gzip_bytes(b"healthy payload");
        let mid = encoded.len() / 2;
        encoded[mid] ^= 0xff;
        encoded.truncate(mid + 1);
        let mut stream = stream_over(CompressionMethod::Gzip, encoded);
        let err = stream.read_to_end().unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }

    #[test]
    fn seek_end_before_size_known_is_rejected() {
        let mut stream = stream_over(CompressionMethod::Gzip, gzip_bytes(b"abc"));
        let err = stream.seek(SeekFrom::End(10)).unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
        // A non-positive delta determines the size and succeeds.
        assert_eq!(stream.seek(SeekFrom::End(-1)).unwrap(), 2);
    }

    #[test]
    fn cancellation_aborts_size_scan() {
        let payload = vec![0u8; 4 * 1024 * 1024];
        let mut stream = stream_over(CompressionMethod::Gzip, gzip_bytes(&payload));
        let token = CancelToken::new();
        token.cancel();
        stream.set_cancel_token(token);
        assert!(matches!(stream.size(), Err(VfsError::Cancelled)));
    }

    #[test]
    fn unknown_method_name_fails() {
        assert!(CompressionMethod::from_name("zstd").is_err());
    }
}
