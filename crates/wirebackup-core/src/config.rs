//! Options controlling a decryption pass.

use std::fmt;
use std::str::FromStr;

use crate::crypto::secretstream::ABYTES;

/// Default plaintext capacity of one chunk (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest accepted plaintext capacity of one chunk (64 MiB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// What to do with the identity hash stored in the backup header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentityCheck {
    /// Never compute the identity hash.
    Skip,
    /// Compare when an identity string is supplied; log a mismatch and continue.
    #[default]
    Warn,
    /// Require a matching identity string before deriving the key.
    Enforce,
}

impl fmt::Display for IdentityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdentityCheck::Skip => "skip",
            IdentityCheck::Warn => "warn",
            IdentityCheck::Enforce => "enforce",
        })
    }
}

impl FromStr for IdentityCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(IdentityCheck::Skip),
            "warn" => Ok(IdentityCheck::Warn),
            "enforce" => Ok(IdentityCheck::Enforce),
            other => Err(format!(
                "unknown identity check '{other}' (expected skip, warn or enforce)"
            )),
        }
    }
}

/// Settings for [`decrypt`](crate::decrypt::decrypt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptOptions {
    /// Plaintext bytes per chunk. The ciphertext read size adds the
    /// 17-byte chunk overhead.
    pub chunk_size: usize,
    pub identity_check: IdentityCheck,
    /// Reject headers other than platform `WBUI`, version 1, instead of
    /// warning about them.
    pub strict_format: bool,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            identity_check: IdentityCheck::default(),
            strict_format: false,
        }
    }
}

impl DecryptOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_identity_check(mut self, identity_check: IdentityCheck) -> Self {
        self.identity_check = identity_check;
        self
    }

    #[must_use]
    pub fn with_strict_format(mut self, strict_format: bool) -> Self {
        self.strict_format = strict_format;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk size must be greater than zero".to_string());
        }
        if self.chunk_size > MAX_CHUNK_SIZE || self.chunk_size.checked_add(ABYTES).is_none() {
            return Err(format!(
                "chunk size {} exceeds the maximum of {MAX_CHUNK_SIZE} bytes",
                self.chunk_size
            ));
        }
        Ok(())
    }
}
