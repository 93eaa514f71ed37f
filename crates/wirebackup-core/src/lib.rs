//! Decryption of chunked, password-protected messenger backups.
//!
//! A backup is a 55-byte header (format tag, version, KDF salt, identity
//! hash), a 24-byte secretstream header, and a sequence of XChaCha20-Poly1305
//! chunks ending in one tagged `FINAL`. The stream key is Argon2i over the
//! password and the header salt.
//!
//! ```no_run
//! use std::path::Path;
//! use wirebackup_core::{DecryptOptions, Password, decrypt_file};
//!
//! let password = Password::new("1235678");
//! let summary = decrypt_file(
//!     Path::new("backup.bin"),
//!     Path::new("backup.txt"),
//!     &password,
//!     &DecryptOptions::default(),
//! )?;
//! println!("{} bytes", summary.bytes_written);
//! # Ok::<(), wirebackup_core::DecryptError>(())
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod decrypt;
pub mod error;
pub mod header;
pub mod stream;

pub use config::{DEFAULT_CHUNK_SIZE, DecryptOptions, IdentityCheck, MAX_CHUNK_SIZE};
pub use crypto::keys::{Key, Password};
pub use decrypt::{DecryptContext, DecryptError, DecryptSummary, decrypt, decrypt_file};
pub use header::{HEADER_SIZE, HeaderEntries, HeaderError};
pub use stream::{ChunkReader, DecryptorState, ReadOutcome, StreamDecryptor, StreamError};
