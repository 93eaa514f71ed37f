//! Chunked stream decryption.
//!
//! [`StreamDecryptor`] drives one secretstream from its 24-byte header to the
//! `FINAL` chunk:
//!
//! ```text
//! Uninitialized --init_pull--> Ready --pull_chunk--> Draining --FINAL--> Finished
//!        \                        \                     /
//!         `------------------------`--> Failed <-------'
//! ```
//!
//! [`ChunkReader`] supplies the ciphertext. It reads fixed-capacity chunks
//! from a blocking source into one reused buffer and reports end of input
//! explicitly, so the driver can tell a truncated stream apart from one that
//! is still delivering data.

use std::fmt;
use std::io::{self, ErrorKind, Read};

use thiserror::Error;
use tracing::{trace, warn};

use crate::crypto::keys::Key;
use crate::crypto::secretstream::{ABYTES, ChunkTag, HEADER_BYTES, PullError, PullStream};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Fewer bytes were available than a stream element requires.
    #[error("Truncated input: {what} needs {expected} bytes, got {actual}")]
    TruncatedInput {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Stream initialization rejected the header.
    #[error("Stream initialization failed: {reason}")]
    InitFailure { reason: String },

    /// Chunk authentication failed.
    ///
    /// Wrong password and corrupted or tampered data are indistinguishable
    /// here: both produce a MAC that does not verify.
    #[error("Authentication failed for chunk {chunk} - wrong password or corrupted backup")]
    AuthenticationFailure { chunk: usize },

    /// An authenticated chunk carried a tag outside MESSAGE/PUSH/REKEY/FINAL.
    #[error("Chunk {chunk} carries unknown tag {tag:#04x}")]
    UnknownTag { chunk: usize, tag: u8 },

    /// Input ended before a FINAL chunk was decrypted.
    #[error("Backup is truncated: input ended after {chunks} chunks without a final chunk")]
    MissingFinalTag { chunks: usize },

    #[error("Cannot {operation} while the decryptor is {state}")]
    InvalidState {
        operation: &'static str,
        state: DecryptorState,
    },

    #[error("Plaintext buffer too small: chunk needs {needed} bytes, buffer holds {available}")]
    OutputTooSmall { needed: usize, available: usize },
}

/// Lifecycle of a [`StreamDecryptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptorState {
    /// Waiting for the stream header.
    Uninitialized,
    /// Initialized, no chunk pulled yet.
    Ready,
    /// At least one non-final chunk pulled.
    Draining,
    /// The FINAL chunk has been pulled.
    Finished,
    /// A previous operation failed; the key state has been discarded.
    Failed,
}

impl fmt::Display for DecryptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecryptorState::Uninitialized => "uninitialized",
            DecryptorState::Ready => "ready",
            DecryptorState::Draining => "draining",
            DecryptorState::Finished => "finished",
            DecryptorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Authenticated decryption of one chunk stream.
///
/// The decryptor owns the stream key state exclusively. It is dropped (and
/// wiped) as soon as the stream finishes or fails, so a decryptor can never
/// be reused for a second stream.
pub struct StreamDecryptor {
    state: DecryptorState,
    stream: Option<PullStream>,
    chunks: usize,
}

impl Default for StreamDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDecryptor")
            .field("state", &self.state)
            .field("chunks", &self.chunks)
            .finish_non_exhaustive()
    }
}

impl StreamDecryptor {
    pub fn new() -> Self {
        Self {
            state: DecryptorState::Uninitialized,
            stream: None,
            chunks: 0,
        }
    }

    pub fn state(&self) -> DecryptorState {
        self.state
    }

    /// Number of chunks successfully pulled so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Initialize the stream from its key and the bytes read for its header.
    ///
    /// `header` is whatever the caller managed to read; fewer than 24 bytes
    /// is reported as [`StreamError::TruncatedInput`]. The key is consumed.
    #[allow(clippy::needless_pass_by_value)]
    pub fn init_pull(&mut self, key: Key, header: &[u8]) -> Result<(), StreamError> {
        if self.state != DecryptorState::Uninitialized {
            return Err(StreamError::InvalidState {
                operation: "initialize the stream",
                state: self.state,
            });
        }

        if header.len() < HEADER_BYTES {
            warn!(actual = header.len(), "Stream header truncated");
            return Err(self.fail(StreamError::TruncatedInput {
                what: "stream header",
                expected: HEADER_BYTES,
                actual: header.len(),
            }));
        }
        let Ok(header) = <&[u8; HEADER_BYTES]>::try_from(header) else {
            return Err(self.fail(StreamError::InitFailure {
                reason: format!("stream header must be {HEADER_BYTES} bytes, got {}", header.len()),
            }));
        };

        self.stream = Some(PullStream::init(key.expose_bytes(), header));
        self.state = DecryptorState::Ready;
        trace!("Stream initialized");
        Ok(())
    }

    /// Authenticate and decrypt one chunk into `out`.
    ///
    /// Returns the number of plaintext bytes written to the front of `out`
    /// and the chunk's tag. A chunk tagged [`ChunkTag::Final`] moves the
    /// decryptor to [`DecryptorState::Finished`]. On failure `out` is left
    /// untouched; any failure other than an undersized `out` moves the
    /// decryptor to [`DecryptorState::Failed`].
    pub fn pull_chunk(
        &mut self,
        ciphertext: &[u8],
        out: &mut [u8],
    ) -> Result<(usize, ChunkTag), StreamError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(StreamError::InvalidState {
                operation: "pull a chunk",
                state: self.state,
            });
        };

        let chunk = self.chunks;
        let (len, tag) = match stream.pull(ciphertext, out) {
            Ok(pulled) => pulled,
            Err(PullError::OutputTooSmall { needed, available }) => {
                return Err(StreamError::OutputTooSmall { needed, available });
            }
            Err(PullError::ChunkTooShort { len }) => {
                warn!(chunk, len, "Chunk shorter than its authentication overhead");
                return Err(self.fail(StreamError::TruncatedInput {
                    what: "chunk",
                    expected: ABYTES,
                    actual: len,
                }));
            }
            Err(PullError::Forged) => {
                warn!(chunk, "Chunk authentication failed");
                return Err(self.fail(StreamError::AuthenticationFailure { chunk }));
            }
            Err(PullError::UnknownTag(tag)) => {
                warn!(chunk, tag, "Chunk carries unknown tag");
                return Err(self.fail(StreamError::UnknownTag { chunk, tag }));
            }
        };

        trace!(chunk, ciphertext_len = ciphertext.len(), plaintext_len = len, ?tag, "Chunk decrypted");
        self.chunks += 1;
        if tag == ChunkTag::Final {
            self.state = DecryptorState::Finished;
            self.stream = None;
        } else {
            self.state = DecryptorState::Draining;
        }
        Ok((len, tag))
    }

    /// Check, once input is exhausted, that the stream ended properly.
    pub fn finish(&mut self) -> Result<(), StreamError> {
        match self.state {
            DecryptorState::Finished => Ok(()),
            DecryptorState::Ready | DecryptorState::Draining => {
                warn!(chunks = self.chunks, "Input ended without a final chunk");
                Err(self.fail(StreamError::MissingFinalTag { chunks: self.chunks }))
            }
            state => Err(StreamError::InvalidState {
                operation: "finish the stream",
                state,
            }),
        }
    }

    fn fail(&mut self, error: StreamError) -> StreamError {
        self.state = DecryptorState::Failed;
        self.stream = None;
        error
    }
}

/// Result of one [`ChunkReader::read_chunk`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome<'a> {
    /// Bytes for one chunk. Shorter than the capacity only at end of input.
    Chunk(&'a [u8]),
    /// The source is exhausted; no bytes were read.
    EndOfInput,
}

/// Fill `buf` from `reader`, stopping early only at end of input.
///
/// Returns the number of bytes read. Interrupted reads are retried; a read
/// of zero bytes is end of input.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads ciphertext chunks of a fixed capacity into a reused buffer.
pub struct ChunkReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> ChunkReader<R> {
    /// Reader for chunks carrying up to `chunk_size` plaintext bytes.
    ///
    /// `chunk_size` is expected to be at most [`MAX_CHUNK_SIZE`](crate::MAX_CHUNK_SIZE).
    pub fn new(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            buffer: vec![0u8; chunk_size + ABYTES],
        }
    }

    /// Ciphertext bytes read per chunk.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn read_chunk(&mut self) -> io::Result<ReadOutcome<'_>> {
        let n = read_full(&mut self.inner, &mut self.buffer)?;
        if n == 0 {
            return Ok(ReadOutcome::EndOfInput);
        }
        Ok(ReadOutcome::Chunk(&self.buffer[..n]))
    }

    /// Whether any bytes remain in the source. Consumes at most one byte.
    pub fn has_remaining(&mut self) -> io::Result<bool> {
        let mut probe = [0u8; 1];
        Ok(read_full(&mut self.inner, &mut probe)? > 0)
    }
}
