//! Password-based key derivation.
//!
//! Both the stream key and the identity hash are Argon2i (v1.3, one lane)
//! outputs over the header salt, but at different cost limits: the key uses
//! the *moderate* limits and the identity hash the *interactive* ones. The
//! limits are the ones libsodium's `crypto_pwhash_argon2i` names, so a key
//! derived here matches one derived by the application that wrote the backup.

use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use super::keys::{KEY_SIZE, Key};
use crate::header::{SALT_SIZE, UUID_HASH_SIZE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyDerivationError {
    /// The Argon2 computation rejected its parameters or could not allocate
    /// its working memory.
    #[error("Key derivation failed: {0}")]
    ComputationFailed(String),
}

/// Argon2i cost limits, in libsodium's units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfLimits {
    /// Number of passes over memory.
    pub ops_limit: u32,
    /// Memory use in bytes.
    pub mem_limit: usize,
}

impl KdfLimits {
    /// `crypto_pwhash_argon2i_OPSLIMIT_MODERATE` / `MEMLIMIT_MODERATE` (128 MiB).
    pub const MODERATE: KdfLimits = KdfLimits {
        ops_limit: 6,
        mem_limit: 134_217_728,
    };

    /// `crypto_pwhash_argon2i_OPSLIMIT_INTERACTIVE` / `MEMLIMIT_INTERACTIVE` (32 MiB).
    pub const INTERACTIVE: KdfLimits = KdfLimits {
        ops_limit: 4,
        mem_limit: 33_554_432,
    };

    fn params(self, output_len: usize) -> Result<Params, KeyDerivationError> {
        let m_cost = u32::try_from(self.mem_limit / 1024).map_err(|_| {
            KeyDerivationError::ComputationFailed(format!(
                "memory limit of {} bytes is out of range",
                self.mem_limit
            ))
        })?;
        Params::new(m_cost, self.ops_limit, 1, Some(output_len))
            .map_err(|e| KeyDerivationError::ComputationFailed(format!("invalid Argon2 parameters: {e}")))
    }
}

fn argon2i_hash(
    secret: &[u8],
    salt: &[u8; SALT_SIZE],
    limits: KdfLimits,
    out: &mut [u8],
) -> Result<(), KeyDerivationError> {
    let params = limits.params(out.len())?;
    Argon2::new(Algorithm::Argon2i, Version::V0x13, params)
        .hash_password_into(secret, salt, out)
        .map_err(|e| {
            warn!(error = %e, "Argon2i computation failed");
            KeyDerivationError::ComputationFailed(e.to_string())
        })
}

/// Derive the 32-byte stream key from the backup password and header salt.
#[instrument(level = "debug", skip_all, fields(ops_limit = KdfLimits::MODERATE.ops_limit))]
pub fn derive_key(password: &str, salt: &[u8; SALT_SIZE]) -> Result<Key, KeyDerivationError> {
    let mut key_bytes = Zeroizing::new([0u8; KEY_SIZE]);
    argon2i_hash(password.as_bytes(), salt, KdfLimits::MODERATE, &mut key_bytes[..])?;
    debug!("Stream key derived");
    Ok(Key::from_zeroizing(key_bytes, *salt))
}

/// Hash an account identifier the way the backup header stores it.
#[instrument(level = "debug", skip_all, fields(ops_limit = KdfLimits::INTERACTIVE.ops_limit))]
pub fn compute_identity_hash(
    uuid: &str,
    salt: &[u8; SALT_SIZE],
) -> Result<[u8; UUID_HASH_SIZE], KeyDerivationError> {
    let mut hash = [0u8; UUID_HASH_SIZE];
    argon2i_hash(uuid.as_bytes(), salt, KdfLimits::INTERACTIVE, &mut hash)?;
    Ok(hash)
}
