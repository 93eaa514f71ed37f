use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::header::SALT_SIZE;

/// Length of the derived stream key.
pub const KEY_SIZE: usize = 32;

/// Caller-supplied credentials for one backup.
///
/// `uuid` is the account identifier the backup was made for. It is not needed
/// to decrypt, only to verify the stored identity hash.
pub struct Password {
    password: SecretString,
    uuid: Option<SecretString>,
}

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: SecretString::from(password.into()),
            uuid: None,
        }
    }

    /// Attach the identity string. An empty string counts as not supplied.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        let uuid = uuid.into();
        self.uuid = (!uuid.is_empty()).then(|| SecretString::from(uuid));
        self
    }

    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }

    pub fn expose_uuid(&self) -> Option<&str> {
        self.uuid.as_ref().map(|uuid| uuid.expose_secret())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("password", &"[REDACTED]")
            .field("uuid", &self.uuid.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A stream key derived from the backup password.
///
/// The key bytes are erased from memory when the `Key` is dropped, and the
/// `Debug` implementation never prints them.
pub struct Key {
    key_bytes: Zeroizing<[u8; KEY_SIZE]>,
    salt: [u8; SALT_SIZE],
}

impl Key {
    pub fn new(key_bytes: [u8; KEY_SIZE], salt: [u8; SALT_SIZE]) -> Self {
        Self {
            key_bytes: Zeroizing::new(key_bytes),
            salt,
        }
    }

    pub(crate) fn from_zeroizing(key_bytes: Zeroizing<[u8; KEY_SIZE]>, salt: [u8; SALT_SIZE]) -> Self {
        Self { key_bytes, salt }
    }

    pub fn expose_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key_bytes
    }

    /// The salt this key was derived with (copied from the header).
    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("key_bytes", &"[REDACTED]")
            .field("salt", &hex::encode(self.salt))
            .finish()
    }
}
