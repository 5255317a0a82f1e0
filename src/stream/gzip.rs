//! Format-aware multi-member gzip stream.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use flate2::bufread::GzDecoder;

use crate::cancel::CancelToken;
use crate::stream::{FileObject, StreamReader};
use crate::VfsError;

type Inner = BufReader<StreamReader<Box<dyn FileObject>>>;

/// A decoded-offset → encoded-offset checkpoint at a member boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Member {
    decoded_start: u64,
    encoded_start: u64,
}

enum State {
    /// Positioned at a member boundary (or end of stream).
    Between(Inner),
    /// Decoding inside a member.
    InMember(Box<GzDecoder<Inner>>),
    Poisoned,
}

fn map_io(err: std::io::Error) -> VfsError {
    match err.downcast::<VfsError>() {
        Ok(vfs) => vfs,
        Err(other) => VfsError::InvalidData {
            details: format!("gzip decode failed: {other}"),
        },
    }
}

/// Multi-member gzip presented as the concatenation of its decompressed
/// members.
///
/// Member boundaries are discovered during sequential decoding and kept in a
/// checkpoint index: a backwards seek (or a seek beyond the highest
/// checkpoint) replays the decoder from the nearest earlier member boundary
/// rather than from offset zero. A member whose trailer (CRC and ISIZE) is
/// missing or wrong fails with [`VfsError::InvalidData`].
pub struct GzipStream {
    state: State,
    /// Global decoded position of the decoder head.
    decoded_pos: u64,
    /// Logical stream position.
    offset: u64,
    size: Option<u64>,
    members: Vec<Member>,
    cancel: Option<CancelToken>,
}

impl GzipStream {
    /// Wrap `parent` as a multi-member gzip stream.
    pub fn new(parent: Box<dyn FileObject>) -> Self {
        Self {
            state: State::Between(BufReader::new(StreamReader::new(parent))),
            decoded_pos: 0,
            offset: 0,
            size: None,
            members: vec![Member {
                decoded_start: 0,
                encoded_start: 0,
            }],
            cancel: None,
        }
    }

    /// Attach a cancellation token, checked during replay skips and size
    /// scans.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    /// Member boundary offsets (decoded position of each member start)
    /// discovered so far.
    pub fn member_offsets(&self) -> Vec<u64> {
        self.members.iter().map(|member| member.decoded_start).collect()
    }

    /// Advance the decoder head by at most `buf.len()` bytes.
    ///
    /// Returns `Ok(0)` only at the true end of the stream (the final
    /// member's trailer has been validated).
    fn step(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        loop {
            match std::mem::replace(&mut self.state, State::Poisoned) {
                State::Between(mut reader) => {
                    let at_end = reader.fill_buf().map_err(map_io)?.is_empty();
                    if at_end {
                        if self.decoded_pos == 0 && self.members.len() == 1 {
                            return Err(VfsError::InvalidData {
                                details: "not a gzip stream: no member header".into(),
                            });
                        }
                        self.size = Some(self.decoded_pos);
                        self.state = State::Between(reader);
                        return Ok(0);
                    }
                    // A member starts here; index the boundary checkpoint if
                    // it is newly discovered.
                    let encoded_start = reader.stream_position().map_err(map_io)?;
                    let is_new = self
                        .members
                        .last()
                        .is_none_or(|last| encoded_start > last.encoded_start);
                    if is_new {
                        self.members.push(Member {
                            decoded_start: self.decoded_pos,
                            encoded_start,
                        });
                    }
                    self.state = State::InMember(Box::new(GzDecoder::new(reader)));
                }
                State::InMember(mut decoder) => {
                    let count = decoder.read(buf).map_err(map_io)?;
                    if count > 0 {
                        self.decoded_pos += count as u64;
                        self.state = State::InMember(decoder);
                        return Ok(count);
                    }
                    // Member finished; its trailer has been consumed and
                    // validated.
                    self.state = State::Between(decoder.into_inner());
                }
                State::Poisoned => {
                    return Err(VfsError::BackEnd("gzip stream poisoned".into()));
                }
            }
        }
    }

    /// Position the decoder head at `target`, replaying from the nearest
    /// earlier member checkpoint when needed.
    fn position(&mut self, target: u64) -> Result<(), VfsError> {
        if self.decoded_pos > target {
            let checkpoint = *self
                .members
                .iter()
                .rev()
                .find(|member| member.decoded_start <= target)
                .expect("member index always holds the zero checkpoint");
            let mut reader = match std::mem::replace(&mut self.state, State::Poisoned) {
                State::Between(reader) => reader,
                State::InMember(decoder) => decoder.into_inner(),
                State::Poisoned => {
                    return Err(VfsError::BackEnd("gzip stream poisoned".into()));
                }
            };
            reader
                .seek(SeekFrom::Start(checkpoint.encoded_start))
                .map_err(map_io)?;
            self.decoded_pos = checkpoint.decoded_start;
            self.state = State::Between(reader);
        }
        let cancel = self.cancel.clone();
        let mut scratch = [0u8; 8192];
        let mut reads: u32 = 0;
        while self.decoded_pos < target {
            let want = scratch.len().min((target - self.decoded_pos) as usize);
            if self.step(&mut scratch[..want])? == 0 {
                break;
            }
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

impl FileObject for GzipStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        self.position(self.offset)?;
        if self.decoded_pos < self.offset {
            return Ok(0);
        }
        let count = self.step(buf)?;
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
        let cancel = self.cancel.clone();
        let mut scratch = [0u8; 8192];
        let mut reads: u32 = 0;
        loop {
            if self.step(&mut scratch)? == 0 {
                break;
            }
            reads += 1;
            if reads % 16 == 0 {
                if let Some(token) = &cancel {
                    token.check()?;
                }
            }
        }
        Ok(self.size.expect("size is set when the stream ends"))
    }
}
