//! Decryption transform with block-aligned random access.

use std::io::SeekFrom;

use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit, StreamCipher};
use des::TdesEde3;
use rc4::Rc4;
use xts_mode::{Xts128, get_tweak_default};

use crate::stream::{FileObject, FileObjectExt};
use crate::VfsError;

/// XTS data-unit size in bytes.
const XTS_SECTOR_SIZE: usize = 512;

/// Supported ciphers for `ENCRYPTED_STREAM` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    /// AES with 128/192/256-bit keys.
    Aes,
    /// Blowfish with variable-length keys.
    Blowfish,
    /// Triple DES (EDE, three keys).
    Des3,
    /// RC4 stream cipher.
    Rc4,
}

impl EncryptionMethod {
    /// Parse the `encryption_method` attribute value.
    pub fn from_name(name: &str) -> Result<Self, VfsError> {
        match name.to_ascii_lowercase().as_str() {
            "aes" => Ok(Self::Aes),
            "blowfish" => Ok(Self::Blowfish),
            "des3" => Ok(Self::Des3),
            "rc4" => Ok(Self::Rc4),
            other => Err(VfsError::PathSpec {
                reason: format!("unknown encryption method: {other}"),
            }),
        }
    }
}

/// Supported block-cipher modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// Cipher block chaining.
    Cbc,
    /// Cipher feedback (full-block).
    Cfb,
    /// Electronic codebook.
    Ecb,
    /// Output feedback.
    Ofb,
    /// XEX tweaked codebook with ciphertext stealing disabled (AES only).
    Xts,
}

impl CipherMode {
    /// Parse the `cipher_mode` attribute value.
    pub fn from_name(name: &str) -> Result<Self, VfsError> {
        match name.to_ascii_lowercase().as_str() {
            "cbc" => Ok(Self::Cbc),
            "cfb" => Ok(Self::Cfb),
            "ecb" => Ok(Self::Ecb),
            "ofb" => Ok(Self::Ofb),
            "xts" => Ok(Self::Xts),
            other => Err(VfsError::PathSpec {
                reason: format!("unknown cipher mode: {other}"),
            }),
        }
    }
}

enum BlockCipherKind {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
    Blowfish(Box<Blowfish>),
    Des3(TdesEde3),
}

impl BlockCipherKind {
    fn new(method: EncryptionMethod, key: &[u8]) -> Result<Self, VfsError> {
        let bad_key = |details: String| VfsError::InvalidData { details };
        match method {
            EncryptionMethod::Aes => match key.len() {
                16 => Ok(Self::Aes128(Aes128::new(GenericArray::from_slice(key)))),
                24 => Ok(Self::Aes192(Aes192::new(GenericArray::from_slice(key)))),
                32 => Ok(Self::Aes256(Aes256::new(GenericArray::from_slice(key)))),
                other => Err(bad_key(format!("aes key must be 16, 24 or 32 bytes, got {other}"))),
            },
            EncryptionMethod::Blowfish => Blowfish::new_from_slice(key)
                .map(|cipher| Self::Blowfish(Box::new(cipher)))
                .map_err(|_| bad_key(format!("blowfish key length {} is invalid", key.len()))),
            EncryptionMethod::Des3 => TdesEde3::new_from_slice(key)
                .map(Self::Des3)
                .map_err(|_| bad_key(format!("des3 key must be 24 bytes, got {}", key.len()))),
            EncryptionMethod::Rc4 => Err(bad_key("rc4 is not a block cipher".into())),
        }
    }

    fn block_size(&self) -> usize {
        match self {
            Self::Aes128(_) | Self::Aes192(_) | Self::Aes256(_) => 16,
            Self::Blowfish(_) | Self::Des3(_) => 8,
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        match self {
            Self::Aes128(cipher) => cipher.encrypt_block(GenericArray::from_mut_slice(block)),
            Self::Aes192(cipher) => cipher.encrypt_block(GenericArray::from_mut_slice(block)),
            Self::Aes256(cipher) => cipher.encrypt_block(GenericArray::from_mut_slice(block)),
            Self::Blowfish(cipher) => cipher.encrypt_block(GenericArray::from_mut_slice(block)),
            Self::Des3(cipher) => cipher.encrypt_block(GenericArray::from_mut_slice(block)),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        match self {
            Self::Aes128(cipher) => cipher.decrypt_block(GenericArray::from_mut_slice(block)),
            Self::Aes192(cipher) => cipher.decrypt_block(GenericArray::from_mut_slice(block)),
            Self::Aes256(cipher) => cipher.decrypt_block(GenericArray::from_mut_slice(block)),
            Self::Blowfish(cipher) => cipher.decrypt_block(GenericArray::from_mut_slice(block)),
            Self::Des3(cipher) => cipher.decrypt_block(GenericArray::from_mut_slice(block)),
        }
    }
}

enum XtsKind {
    Aes128(Box<Xts128<Aes128>>),
    Aes256(Box<Xts128<Aes256>>),
}

impl XtsKind {
    fn new(key: &[u8]) -> Result<Self, VfsError> {
        match key.len() {
            32 => {
                let (k1, k2) = key.split_at(16);
                Ok(Self::Aes128(Box::new(Xts128::new(
                    Aes128::new(GenericArray::from_slice(k1)),
                    Aes128::new(GenericArray::from_slice(k2)),
                ))))
            }
            64 => {
                let (k1, k2) = key.split_at(32);
                Ok(Self::Aes256(Box::new(Xts128::new(
                    Aes256::new(GenericArray::from_slice(k1)),
                    Aes256::new(GenericArray::from_slice(k2)),
                ))))
            }
            other => Err(VfsError::InvalidData {
                details: format!("xts key must be 32 or 64 bytes, got {other}"),
            }),
        }
    }

    fn decrypt_area(&self, buffer: &mut [u8], first_sector: u128) {
        match self {
            Self::Aes128(xts) => {
                xts.decrypt_area(buffer, XTS_SECTOR_SIZE, first_sector, get_tweak_default)
            }
            Self::Aes256(xts) => {
                xts.decrypt_area(buffer, XTS_SECTOR_SIZE, first_sector, get_tweak_default)
            }
        }
    }
}

enum Rc4Kind {
    Key40(Rc4<rc4::consts::U5>),
    Key64(Rc4<rc4::consts::U8>),
    Key128(Rc4<rc4::consts::U16>),
}

impl Rc4Kind {
    fn new(key: &[u8]) -> Result<Self, VfsError> {
        match key.len() {
            5 => Ok(Self::Key40(Rc4::new(GenericArray::from_slice(key)))),
            8 => Ok(Self::Key64(Rc4::new(GenericArray::from_slice(key)))),
            16 => Ok(Self::Key128(Rc4::new(GenericArray::from_slice(key)))),
            other => Err(VfsError::InvalidData {
                details: format!("rc4 key must be 5, 8 or 16 bytes, got {other}"),
            }),
        }
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        match self {
            Self::Key40(cipher) => cipher.apply_keystream(data),
            Self::Key64(cipher) => cipher.apply_keystream(data),
            Self::Key128(cipher) => cipher.apply_keystream(data),
        }
    }
}

enum Engine {
    Block {
        cipher: BlockCipherKind,
        mode: CipherMode,
        iv: Vec<u8>,
        /// OFB keystream cache: (block index, keystream block).
        ofb_cache: Option<(u64, Vec<u8>)>,
    },
    Xts(XtsKind),
    Rc4 {
        key: Vec<u8>,
        /// Keystream position and cipher state for sequential reads; a
        /// backwards seek re-keys.
        state: Option<(u64, Rc4Kind)>,
    },
}

fn xor_in_place(target: &mut [u8], mask: &[u8]) {
    for (byte, mask_byte) in target.iter_mut().zip(mask) {
        *byte ^= mask_byte;
    }
}

/// Decrypted view over a parent ciphertext stream.
///
/// Random access works on cipher-block granularity: the block index is
/// computed from the requested offset, the covering ciphertext blocks (plus
/// the preceding block for CBC/CFB chaining) are read from the parent, the
/// mode's IV is derived, and only the needed window is decrypted. RC4 has no
/// random access; its keystream is kept as a bounded window that advances
/// for sequential reads and re-keys on backwards seeks.
///
/// The stream size equals the parent size; no padding is interpreted.
pub struct EncryptedStream {
    parent: Box<dyn FileObject>,
    engine: Engine,
    size: u64,
    offset: u64,
}

impl std::fmt::Debug for EncryptedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStream")
            .field("size", &self.size)
            .field("offset", &self.offset)
            .finish()
    }
}

impl EncryptedStream {
    /// Wrap `parent` for on-the-fly decryption.
    ///
    /// `mode` is required for the block ciphers and ignored for RC4. A
    /// missing `iv` defaults to all zeroes.
    pub fn new(
        mut parent: Box<dyn FileObject>,
        method: EncryptionMethod,
        mode: Option<CipherMode>,
        key: &[u8],
        iv: Option<&[u8]>,
    ) -> Result<Self, VfsError> {
        let size = parent.size()?;
        let engine = match method {
            EncryptionMethod::Rc4 => {
                Rc4Kind::new(key)?;
                Engine::Rc4 {
                    key: key.to_vec(),
                    state: None,
                }
            }
            _ => {
                let mode = mode.ok_or_else(|| VfsError::PathSpec {
                    reason: format!("{method:?} requires a cipher_mode attribute"),
                })?;
                if mode == CipherMode::Xts {
                    if method != EncryptionMethod::Aes {
                        return Err(VfsError::PathSpec {
                            reason: "xts mode is only defined for aes".into(),
                        });
                    }
                    if size % XTS_SECTOR_SIZE as u64 != 0 {
                        return Err(VfsError::InvalidData {
                            details: format!(
                                "xts ciphertext size {size} is not sector aligned"
                            ),
                        });
                    }
                    Engine::Xts(XtsKind::new(key)?)
                } else {
                    let cipher = BlockCipherKind::new(method, key)?;
                    let block = cipher.block_size();
                    let iv = match iv {
                        Some(iv) if iv.len() == block => iv.to_vec(),
                        Some(iv) => {
                            return Err(VfsError::InvalidData {
                                details: format!(
                                    "initialization vector must be {block} bytes, got {}",
                                    iv.len()
                                ),
                            });
                        }
                        None => vec![0u8; block],
                    };
                    if matches!(mode, CipherMode::Cbc | CipherMode::Ecb)
                        && size % block as u64 != 0
                    {
                        return Err(VfsError::InvalidData {
                            details: format!(
                                "ciphertext size {size} is not a multiple of the {block}-byte block"
                            ),
                        });
                    }
                    Engine::Block {
                        cipher,
                        mode,
                        iv,
                        ofb_cache: None,
                    }
                }
            }
        };
        Ok(Self {
            parent,
            engine,
            size,
            offset: 0,
        })
    }

    /// Decrypt `[offset, offset + out.len())` for the block-cipher modes.
    fn read_block_modes(&mut self, out: &mut [u8]) -> Result<usize, VfsError> {
        let Engine::Block {
            cipher,
            mode,
            iv,
            ofb_cache,
        } = &mut self.engine
        else {
            unreachable!("caller dispatched on engine kind");
        };
        let block = cipher.block_size() as u64;
        let first_block = self.offset / block;
        let end = self.offset + out.len() as u64;
        let last_block = end.div_ceil(block).min(self.size.div_ceil(block));

        // CBC and CFB derive each block's IV from the previous ciphertext
        // block, so fetch one extra block of context when available.
        let chained = matches!(mode, CipherMode::Cbc | CipherMode::Cfb);
        let fetch_first = if chained { first_block.saturating_sub(1) } else { first_block };
        let fetch_start = fetch_first * block;
        let fetch_end = (last_block * block).min(self.size);
        let mut ciphertext = vec![0u8; (fetch_end - fetch_start) as usize];
        self.parent.read_exact_at(fetch_start, &mut ciphertext)?;

        let lead = ((first_block - fetch_first) * block) as usize;
        let mut plaintext = ciphertext[lead..].to_vec();
        let chunks = plaintext.len().div_ceil(block as usize);
        for chunk_index in 0..chunks {
            let global_block = first_block + chunk_index as u64;
            let start = chunk_index * block as usize;
            let stop = (start + block as usize).min(plaintext.len());
            // Previous ciphertext block, only meaningful for the chained
            // modes; `lead` guarantees it was fetched.
            let prev_ciphertext = if !chained {
                None
            } else if global_block == 0 {
                Some(iv.clone())
            } else {
                let prev_start = start + lead - block as usize;
                Some(ciphertext[prev_start..prev_start + block as usize].to_vec())
            };
            match mode {
                CipherMode::Ecb => {
                    cipher.decrypt_block(&mut plaintext[start..stop]);
                }
                CipherMode::Cbc => {
                    cipher.decrypt_block(&mut plaintext[start..stop]);
                    let mask = prev_ciphertext.expect("cbc is chained");
                    xor_in_place(&mut plaintext[start..stop], &mask);
                }
                CipherMode::Cfb => {
                    let mut mask = prev_ciphertext.expect("cfb is chained");
                    cipher.encrypt_block(&mut mask);
                    xor_in_place(&mut plaintext[start..stop], &mask);
                }
                CipherMode::Ofb => {
                    // O_0 = E(IV), O_i = E(O_{i-1}); cache the most recent
                    // keystream block so sequential reads stay linear.
                    let mut keystream = match ofb_cache.take() {
                        Some((index, cached)) if index <= global_block => (index, cached),
                        _ => {
                            let mut first = iv.clone();
                            cipher.encrypt_block(&mut first);
                            (0, first)
                        }
                    };
                    while keystream.0 < global_block {
                        cipher.encrypt_block(&mut keystream.1);
                        keystream.0 += 1;
                    }
                    xor_in_place(&mut plaintext[start..stop], &keystream.1);
                    *ofb_cache = Some(keystream);
                }
                CipherMode::Xts => unreachable!("xts uses the dedicated engine"),
            }
        }

        let skip = (self.offset - first_block * block) as usize;
        let available = plaintext.len().saturating_sub(skip).min(out.len());
        out[..available].copy_from_slice(&plaintext[skip..skip + available]);
        Ok(available)
    }

    fn read_xts(&mut self, out: &mut [u8]) -> Result<usize, VfsError> {
        let Engine::Xts(xts) = &self.engine else {
            unreachable!("caller dispatched on engine kind");
        };
        let sector = XTS_SECTOR_SIZE as u64;
        let first_sector = self.offset / sector;
        let end = (self.offset + out.len() as u64).min(self.size);
        let last_sector = end.div_ceil(sector);

        let mut buffer = vec![0u8; ((last_sector - first_sector) * sector) as usize];
        self.parent
            .read_exact_at(first_sector * sector, &mut buffer)?;
        xts.decrypt_area(&mut buffer, first_sector as u128);

        let skip = (self.offset - first_sector * sector) as usize;
        let available = buffer.len().saturating_sub(skip).min(out.len());
        out[..available].copy_from_slice(&buffer[skip..skip + available]);
        Ok(available)
    }

    fn read_rc4(&mut self, out: &mut [u8]) -> Result<usize, VfsError> {
        let count = self.parent.read_at(self.offset, out)?;
        let Engine::Rc4 { key, state } = &mut self.engine else {
            unreachable!("caller dispatched on engine kind");
        };
        let mut current = match state.take() {
            Some((position, cipher)) if position <= self.offset => (position, cipher),
            _ => (0, Rc4Kind::new(key)?),
        };
        let mut gap = self.offset - current.0;
        let mut scratch = [0u8; 512];
        while gap > 0 {
            let chunk = scratch.len().min(gap as usize);
            scratch[..chunk].fill(0);
            current.1.apply_keystream(&mut scratch[..chunk]);
            gap -= chunk as u64;
        }
        current.1.apply_keystream(&mut out[..count]);
        *state = Some((self.offset + count as u64, current.1));
        Ok(count)
    }
}

impl FileObject for EncryptedStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        if self.offset >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min((self.size - self.offset) as usize);
        let count = if matches!(self.engine, Engine::Block { .. }) {
            self.read_block_modes(&mut buf[..want])?
        } else if matches!(self.engine, Engine::Xts(_)) {
            self.read_xts(&mut buf[..want])?
        } else {
            self.read_rc4(&mut buf[..want])?
        };
        self.offset += count as u64;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, VfsError> {
        self.offset = super::resolve_seek(self.offset, self.size, pos)?;
        Ok(self.offset)
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        Ok(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    const KEY: &[u8; 16] = b"0123456789abcdef";
    const IV: &[u8; 16] = b"fedcba9876543210";

    fn aes_encrypt_block(key: &[u8], block: &mut [u8]) {
        Aes128::new(GenericArray::from_slice(key))
            .encrypt_block(GenericArray::from_mut_slice(block));
    }

    fn cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
        assert_eq!(plaintext.len() % 16, 0);
        let mut previous = iv.to_vec();
        let mut out = Vec::with_capacity(plaintext.len());
        for chunk in plaintext.chunks(16) {
            let mut block = chunk.to_vec();
            xor_in_place(&mut block, &previous);
            aes_encrypt_block(key, &mut block);
            previous.clone_from(&block);
            out.extend_from_slice(&block);
        }
        out
    }

    fn stream(
        ciphertext: Vec<u8>,
        method: EncryptionMethod,
        mode: Option<CipherMode>,
        key: &[u8],
        iv: Option<&[u8]>,
    ) -> EncryptedStream {
        EncryptedStream::new(Box::new(MemoryStream::new(ciphertext)), method, mode, key, iv)
            .unwrap()
    }

    #[test]
    fn aes_cbc_round_trip() {
        let plaintext = b"sixteen byte blk".repeat(8);
        let ciphertext = cbc_encrypt(KEY, IV, &plaintext);
        let mut stream = stream(
            ciphertext,
            EncryptionMethod::Aes,
            Some(CipherMode::Cbc),
            KEY,
            Some(IV),
        );
        assert_eq!(stream.read_to_end().unwrap(), plaintext);
    }

    #[test]
    fn aes_cbc_random_access_mid_stream() {
        let plaintext = b"sixteen byte blk".repeat(8);
        let ciphertext = cbc_encrypt(KEY, IV, &plaintext);
        let mut stream = stream(
            ciphertext,
            EncryptionMethod::Aes,
            Some(CipherMode::Cbc),
            KEY,
            Some(IV),
        );
        // Lands mid-block and spans a block boundary.
        let mut buf = [0u8; 20];
        stream.read_exact_at(37, &mut buf).unwrap();
        assert_eq!(&buf[..], &plaintext[37..57]);
    }

    #[test]
    fn aes_ecb_round_trip() {
        let plaintext = b"ecb has no chain".repeat(4);
        let mut ciphertext = plaintext.clone();
        for chunk in ciphertext.chunks_mut(16) {
            aes_encrypt_block(KEY, chunk);
        }
        let mut stream = stream(
            ciphertext,
            EncryptionMethod::Aes,
            Some(CipherMode::Ecb),
            KEY,
            None,
        );
        assert_eq!(stream.read_to_end().unwrap(), plaintext);
    }

    #[test]
    fn aes_cfb_round_trip_with_partial_tail() {
        let plaintext = b"cfb acts like a stream cipher here".to_vec();
        let mut previous = IV.to_vec();
        let mut ciphertext = Vec::new();
        for chunk in plaintext.chunks(16) {
            let mut mask = previous.clone();
            aes_encrypt_block(KEY, &mut mask);
            let mut block = chunk.to_vec();
            xor_in_place(&mut block, &mask);
            if block.len() == 16 {
                previous.clone_from(&block);
            }
            ciphertext.extend_from_slice(&block);
        }
        let mut stream = stream(
            ciphertext,
            EncryptionMethod::Aes,
            Some(CipherMode::Cfb),
            KEY,
            Some(IV),
        );
        assert_eq!(stream.read_to_end().unwrap(), plaintext);
    }

    #[test]
    fn aes_ofb_round_trip() {
        let plaintext = b"ofb keystream is position only, nice for seeks".to_vec();
        let mut keystream_block = IV.to_vec();
        let mut ciphertext = plaintext.clone();
        for chunk in ciphertext.chunks_mut(16) {
            aes_encrypt_block(KEY, &mut keystream_block);
            xor_in_place(chunk, &keystream_block);
        }
        let mut stream = stream(
            ciphertext,
            EncryptionMethod::Aes,
            Some(CipherMode::Ofb),
            KEY,
            Some(IV),
        );
        assert_eq!(stream.read_to_end().unwrap(), plaintext);

        let mut buf = [0u8; 8];
        stream.read_exact_at(20, &mut buf).unwrap();
        assert_eq!(&buf[..], &plaintext[20..28]);
        stream.read_exact_at(4, &mut buf).unwrap();
        assert_eq!(&buf[..], &plaintext[4..12]);
    }

    #[test]
    fn aes_xts_round_trip() {
        let plaintext = vec![0x5au8; XTS_SECTOR_SIZE * 3];
        let key = [0x24u8; 32];
        let xts = Xts128::new(
            Aes128::new(GenericArray::from_slice(&key[..16])),
            Aes128::new(GenericArray::from_slice(&key[16..])),
        );
        let mut ciphertext = plaintext.clone();
        xts.encrypt_area(&mut ciphertext, XTS_SECTOR_SIZE, 0, get_tweak_default);

        let mut stream = stream(
            ciphertext,
            EncryptionMethod::Aes,
            Some(CipherMode::Xts),
            &key,
            None,
        );
        assert_eq!(stream.read_to_end().unwrap(), plaintext);

        let mut buf = [0u8; 32];
        stream.read_exact_at(XTS_SECTOR_SIZE as u64 + 100, &mut buf).unwrap();
        assert_eq!(&buf[..], &plaintext[XTS_SECTOR_SIZE + 100..XTS_SECTOR_SIZE + 132]);
    }

    #[test]
    fn rc4_round_trip_and_backwards_seek() {
        let plaintext = b"rc4 keystream over the whole stream".to_vec();
        let mut ciphertext = plaintext.clone();
        let mut cipher = Rc4::<rc4::consts::U16>::new(GenericArray::from_slice(KEY));
        cipher.apply_keystream(&mut ciphertext);

        let mut stream = stream(ciphertext, EncryptionMethod::Rc4, None, KEY, None);
        assert_eq!(stream.read_to_end().unwrap(), plaintext);

        let mut buf = [0u8; 4];
        stream.read_exact_at(4, &mut buf).unwrap();
        assert_eq!(&buf[..], &plaintext[4..8]);
    }

    #[test]
    fn cbc_rejects_misaligned_ciphertext() {
        let err = EncryptedStream::new(
            Box::new(MemoryStream::new(vec![0u8; 17])),
            EncryptionMethod::Aes,
            Some(CipherMode::Cbc),
            KEY,
            Some(IV),
        )
        .unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }

    #[test]
    fn block_cipher_requires_mode() {
        let err = EncryptedStream::new(
            Box::new(MemoryStream::new(vec![0u8; 16])),
            EncryptionMethod::Aes,
            None,
            KEY,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, VfsError::PathSpec { .. }));
    }

    #[test]
    fn bad_key_length_is_rejected() {
        let err = EncryptedStream::new(
            Box::new(MemoryStream::new(vec![0u8; 16])),
            EncryptionMethod::Aes,
            Some(CipherMode::Cbc),
            b"short",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, VfsError::InvalidData { .. }));
    }
}
