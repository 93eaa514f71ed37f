//! Cryptographic primitives for backup decryption

pub mod kdf;
pub mod keys;
pub mod secretstream;

pub use kdf::{KdfLimits, KeyDerivationError, compute_identity_hash, derive_key};
pub use keys::{KEY_SIZE, Key, Password};
pub use secretstream::{ChunkTag, PullError, PullStream};
