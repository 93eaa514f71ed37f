//! The decryption pipeline.
//!
//! ```text
//! backup header (55) -> HeaderEntries -> derive_key -> Key
//! stream header (24) -> StreamDecryptor::init_pull(Key)
//! chunks ...         -> StreamDecryptor::pull_chunk -> plaintext sink
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};
use zeroize::Zeroizing;

use crate::config::{DecryptOptions, IdentityCheck};
use crate::crypto::kdf::{KeyDerivationError, compute_identity_hash, derive_key};
use crate::crypto::keys::{Key, Password};
use crate::crypto::secretstream::{ChunkTag, HEADER_BYTES};
use crate::header::{HEADER_SIZE, HeaderEntries, HeaderError};
use crate::stream::{ChunkReader, ReadOutcome, StreamDecryptor, StreamError, read_full};

/// Where a pipeline error happened.
#[derive(Debug, Clone, Default)]
pub struct DecryptContext {
    /// The encrypted backup being read
    pub input: Option<PathBuf>,
    /// The plaintext file being written
    pub output: Option<PathBuf>,
    /// The chunk being processed (0-based)
    pub chunk: Option<usize>,
}

impl DecryptContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = Some(chunk);
        self
    }
}

impl fmt::Display for DecryptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref input) = self.input {
            parts.push(format!("backup {:?}", input.display()));
        }
        if let Some(chunk) = self.chunk {
            parts.push(format!("chunk {chunk}"));
        }
        if let Some(ref output) = self.output {
            parts.push(format!("output {:?}", output.display()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("Invalid backup: {0}")]
    Header(#[from] HeaderError),

    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),

    #[error("Decryption failed: {0}")]
    Stream(#[from] StreamError),

    /// The supplied identity string does not match the header's identity hash.
    #[error("Identity check failed: {reason}")]
    IdentityMismatch { reason: String },

    /// Only raised with [`DecryptOptions::strict_format`].
    #[error("Unsupported backup format: platform '{platform}', version {version}")]
    UnsupportedFormat { platform: String, version: u16 },

    #[error("Invalid decryption options: {0}")]
    InvalidOptions(String),

    #[error("IO error on {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: DecryptContext,
    },
}

impl DecryptError {
    /// Create an IO error with context
    #[must_use]
    pub fn io_with_context(source: io::Error, context: DecryptContext) -> Self {
        DecryptError::Io { source, context }
    }
}

/// Outcome of a successful decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptSummary {
    pub header: HeaderEntries,
    /// Plaintext bytes written to the sink.
    pub bytes_written: u64,
    /// Chunks decrypted, including the final one.
    pub chunks: usize,
}

/// Decrypt a backup read from `input` into `output`.
///
/// Plaintext is written chunk by chunk as each chunk authenticates. If a
/// later chunk fails, the bytes already written stay in `output`.
pub fn decrypt<R: Read, W: Write>(
    input: R,
    output: W,
    password: &Password,
    options: &DecryptOptions,
) -> Result<DecryptSummary, DecryptError> {
    decrypt_with_context(input, output, password, options, &DecryptContext::new())
}

/// Decrypt the backup at `input` into a newly created file at `output`.
#[instrument(level = "info", skip(password, options), fields(input = %input.display(), output = %output.display()))]
pub fn decrypt_file(
    input: &Path,
    output: &Path,
    password: &Password,
    options: &DecryptOptions,
) -> Result<DecryptSummary, DecryptError> {
    let input_context = DecryptContext::new().with_input(input);
    let reader = File::open(input)
        .map(BufReader::new)
        .map_err(|e| DecryptError::io_with_context(e, input_context))?;
    let output_context = DecryptContext::new().with_output(output);
    let writer = File::create(output)
        .map(BufWriter::new)
        .map_err(|e| DecryptError::io_with_context(e, output_context))?;

    let context = DecryptContext::new().with_input(input).with_output(output);
    decrypt_with_context(reader, writer, password, options, &context)
}

#[instrument(level = "debug", skip_all, fields(chunk_size = options.chunk_size, identity_check = %options.identity_check))]
fn decrypt_with_context<R: Read, W: Write>(
    mut input: R,
    output: W,
    password: &Password,
    options: &DecryptOptions,
    context: &DecryptContext,
) -> Result<DecryptSummary, DecryptError> {
    options.validate().map_err(DecryptError::InvalidOptions)?;

    let header = read_header(&mut input, context)?;
    check_format(&header, options.strict_format)?;
    verify_identity(&header, password, options.identity_check)?;

    let key = derive_key(password.expose_password(), &header.salt)?;
    decrypt_stream(input, output, key, header, options, context)
}

fn read_header<R: Read>(input: &mut R, context: &DecryptContext) -> Result<HeaderEntries, DecryptError> {
    let mut buf = [0u8; HEADER_SIZE];
    let n = read_full(input, &mut buf)
        .map_err(|e| DecryptError::io_with_context(e, context.clone()))?;
    Ok(HeaderEntries::decode(&buf[..n])?)
}

fn check_format(header: &HeaderEntries, strict: bool) -> Result<(), DecryptError> {
    if header.is_known_format() {
        return Ok(());
    }
    if strict {
        warn!(platform = %header.platform, version = header.version, "Rejecting unsupported backup format");
        return Err(DecryptError::UnsupportedFormat {
            platform: header.platform.clone(),
            version: header.version,
        });
    }
    warn!(platform = %header.platform, version = header.version, "Unsupported backup format, expect errors");
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(mode = %check))]
fn verify_identity(
    header: &HeaderEntries,
    password: &Password,
    check: IdentityCheck,
) -> Result<(), DecryptError> {
    if check == IdentityCheck::Skip {
        return Ok(());
    }

    let Some(uuid) = password.expose_uuid() else {
        if check == IdentityCheck::Enforce {
            warn!("Identity check enforced but no identity string supplied");
            return Err(DecryptError::IdentityMismatch {
                reason: "no identity string was supplied".to_string(),
            });
        }
        debug!("No identity string supplied, skipping identity check");
        return Ok(());
    };

    let hash = Zeroizing::new(compute_identity_hash(uuid, &header.salt)?);
    if bool::from(hash[..].ct_eq(&header.uuid_hash[..])) {
        debug!("Identity verified");
        return Ok(());
    }

    if check == IdentityCheck::Enforce {
        warn!("Identity string does not match the backup");
        return Err(DecryptError::IdentityMismatch {
            reason: "the backup was made for a different identity".to_string(),
        });
    }
    warn!("Identity string does not match the backup, continuing");
    Ok(())
}

/// Everything after key derivation: stream header, chunk loop, flush.
fn decrypt_stream<R: Read, W: Write>(
    mut input: R,
    mut output: W,
    key: Key,
    header: HeaderEntries,
    options: &DecryptOptions,
    context: &DecryptContext,
) -> Result<DecryptSummary, DecryptError> {
    let mut stream_header = [0u8; HEADER_BYTES];
    let n = read_full(&mut input, &mut stream_header)
        .map_err(|e| DecryptError::io_with_context(e, context.clone()))?;

    let mut decryptor = StreamDecryptor::new();
    decryptor.init_pull(key, &stream_header[..n])?;

    let mut reader = ChunkReader::new(input, options.chunk_size);
    let mut plaintext = Zeroizing::new(vec![0u8; options.chunk_size]);
    let mut bytes_written: u64 = 0;

    loop {
        let chunk = decryptor.chunks();
        let outcome = reader
            .read_chunk()
            .map_err(|e| DecryptError::io_with_context(e, context.clone().with_chunk(chunk)))?;
        let ciphertext = match outcome {
            ReadOutcome::Chunk(ciphertext) => ciphertext,
            ReadOutcome::EndOfInput => break,
        };

        let (len, tag) = decryptor.pull_chunk(ciphertext, &mut plaintext)?;
        output
            .write_all(&plaintext[..len])
            .map_err(|e| DecryptError::io_with_context(e, context.clone().with_chunk(chunk)))?;
        bytes_written += len as u64;
        trace!(chunk, bytes_written, "Chunk written");

        if tag == ChunkTag::Final {
            break;
        }
    }
    decryptor.finish()?;

    match reader.has_remaining() {
        Ok(true) => warn!("Ignoring trailing data after the final chunk"),
        Ok(false) => {}
        Err(e) => debug!(error = %e, "Could not probe for trailing data"),
    }

    output
        .flush()
        .map_err(|e| DecryptError::io_with_context(e, context.clone()))?;

    info!(bytes_written, chunks = decryptor.chunks(), "Backup decrypted");
    Ok(DecryptSummary {
        header,
        bytes_written,
        chunks: decryptor.chunks(),
    })
}
