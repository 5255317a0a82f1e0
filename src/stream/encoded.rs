//! RFC 4648 encoded stream transform.

use std::io::SeekFrom;

use base64::Engine as _;

use crate::stream::{FileObject, FileObjectExt};
use crate::VfsError;

/// Supported encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMethod {
    /// Hexadecimal, two symbols per byte.
    Base16,
    /// Base32, eight symbols per five bytes.
    Base32,
    /// Base64, four symbols per three bytes.
    Base64,
}

impl EncodingMethod {
    /// Parse the `encoding_method` attribute value.
    pub fn from_name(name: &str) -> Result<Self, VfsError> {
        match name.to_ascii_lowercase().as_str() {
            "base16" => Ok(Self::Base16),
            "base32" => Ok(Self::Base32),
            "base64" => Ok(Self::Base64),
            other => Err(VfsError::PathSpec {
                reason: format!("unknown encoding method: {other}"),
            }),
        }
    }

    /// Encoded symbols per block.
    const fn encoded_block(self) -> u64 {
        match self {
            Self::Base16 => 2,
            Self::Base32 => 8,
            Self::Base64 => 4,
        }
    }

    /// Decoded bytes per block.
    const fn decoded_block(self) -> u64 {
        match self {
            Self::Base16 => 1,
            Self::Base32 => 5,
            Self::Base64 => 3,
        }
    }

    /// Decoded bytes removed by `pad` trailing padding symbols in the final
    /// block, per RFC 4648.
    fn padding_reduction(self, pad: u64) -> Result<u64, VfsError> {
        let reduction = match (self, pad) {
            (_, 0) => Some(0),
            (Self::Base64, 1) => Some(1),
            (Self::Base64, 2) => Some(2),
            (Self::Base32, 1) => Some(1),
            (Self::Base32, 3) => Some(2),
            (Self::Base32, 4) => Some(3),
            (Self::Base32, 6) => Some(4),
            _ => None,
        };
        reduction.ok_or_else(|| VfsError::InvalidData {
            details: format!("invalid padding length {pad}"),
        })
    }

    fn decode(self, encoded: &[u8]) -> Result<Vec<u8>, VfsError> {
        let decoded = match self {
            Self::Base16 => hex::decode(encoded).map_err(|err| err.to_string()),
            Self::Base32 => data_encoding::BASE32
                .decode(encoded)
                .map_err(|err| err.to_string()),
            Self::Base64 => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|err| err.to_string()),
        };
        decoded.map_err(|details| VfsError::InvalidData {
            details: format!("encoded stream decode failed: {details}"),
        })
    }
}

/// Deterministic block-aligned decoder over a parent stream.
///
/// The encoded payload must be a whole number of blocks with padding only in
/// the final block; anything else, including whitespace, fails with
/// [`VfsError::InvalidData`]. Random access maps a decoded range onto the
/// covering encoded block range, so reads never touch more of the parent
/// than one block on each side of the requested window.
#[derive(Debug)]
pub struct EncodedStream {
    parent: Box<dyn FileObject>,
    method: EncodingMethod,
    decoded_size: u64,
    offset: u64,
}

impl EncodedStream {
    /// Wrap `parent`, validating block alignment and final-block padding.
    pub fn new(mut parent: Box<dyn FileObject>, method: EncodingMethod) -> Result<Self, VfsError> {
        let encoded_size = parent.size()?;
        let enc_block = method.encoded_block();
        if encoded_size % enc_block != 0 {
            return Err(VfsError::InvalidData {
                details: format!(
                    "encoded size {encoded_size} is not a multiple of the {enc_block}-symbol block"
                ),
            });
        }
        let decoded_size = if encoded_size == 0 {
            0
        } else {
            let mut tail = vec![0u8; enc_block as usize];
            parent.read_exact_at(encoded_size - enc_block, &mut tail)?;
            let pad = tail.iter().rev().take_while(|byte| **byte == b'=').count() as u64;
            let reduction = method.padding_reduction(pad)?;
            (encoded_size / enc_block) * method.decoded_block() - reduction
        };
        Ok(Self {
            parent,
            method,
            decoded_size,
            offset: 0,
        })
    }
}

impl FileObject for EncodedStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        if self.offset >= self.decoded_size {
            return Ok(0);
        }
        let want = buf.len().min((self.decoded_size - self.offset) as usize);
        if want == 0 {
            return Ok(0);
        }
        let dec_block = self.method.decoded_block();
        let enc_block = self.method.encoded_block();

        let first_block = self.offset / dec_block;
        let last_block = (self.offset + want as u64).div_ceil(dec_block);
        let enc_start = first_block * enc_block;
        let enc_end = (last_block * enc_block).min(self.parent.size()?);

        let mut encoded = vec![0u8; (enc_end - enc_start) as usize];
        self.parent.read_exact_at(enc_start, &mut encoded)?;
        let decoded = self.method.decode(&encoded)?;

        let skip = (self.offset - first_block * dec_block) as usize;
        let available = decoded.len().saturating_sub(skip).min(want);
        buf[..available].copy_from_slice(&decoded[skip..skip + available]);
        self.offset += available as u64;
        Ok(available)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError> {
        self.offset = super::resolve_seek(self.offset, self.decoded_size, pos)?;
        Ok(self.offset)
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        Ok(self.decoded_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn encoded(method: EncodingMethod, payload: &[u8]) -> EncodedStream {
        EncodedStream::new(Box::new(MemoryStream::new(payload)), method).unwrap()
    }

    #[test]
    fn base64_hello() {
        let mut stream = encoded(EncodingMethod::Base64, b"SGVsbG8=");
        assert_eq!(stream.size().unwrap(), 5);
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"Hello");
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn base64_random_access_mid_block() {
        let mut stream = encoded(EncodingMethod::Base64, b"SGVsbG8sIHdvcmxkIQ==");
        let mut buf = [0u8; 5];
        stream.read_exact_at(7, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn base16_decodes() {
        let mut stream = encoded(EncodingMethod::Base16, b"73746163");
        assert_eq!(stream.size().unwrap(), 4);
        assert_eq!(stream.read_to_end().unwrap(), b"stac");
    }

    #[test]
    fn base32_decodes_with_padding() {
        // BASE32("fs") = "MZZQ===="
        let mut stream = encoded(EncodingMethod::Base32, b"MZZQ====");
        assert_eq!(stream.size().unwrap(), 2);
        assert_eq!(stream.read_to_end().unwrap(), b"fs");
    }

    #[test]
    fn illegal_symbol_is_invalid_data() {
        let mut stream = encoded(EncodingMethod::Base64, b"SGV%bG8=");
        let mut buf = [0u8; 5];
        let err = stream.read(&mut buf).unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }

    #[test]
    fn misaligned_input_is_invalid_data() {
        let err =
            EncodedStream::new(Box::new(MemoryStream::new(&b"SGVsbG8"[..])), EncodingMethod::Base64)
                .unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }

    #[test]
    fn empty_input_is_empty_stream() {
        let mut stream = encoded(EncodingMethod::Base64, b"");
        assert_eq!(stream.size().unwrap(), 0);
        let mut buf = [0u8; 1];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn unknown_method_name_fails() {
        assert!(EncodingMethod::from_name("base58").is_err());
    }
}
