//! Backup header decoding.
//!
//! Every backup starts with a fixed 55-byte header:
//!
//! | Offset | Length | Field         | Encoding               |
//! |--------|--------|---------------|------------------------|
//! | 0      | 4      | platform tag  | ASCII                  |
//! | 4      | 1      | reserved      | raw, not validated     |
//! | 5      | 2      | version       | big-endian `u16`       |
//! | 7      | 16     | KDF salt      | raw                    |
//! | 23     | 32     | identity hash | raw (Argon2i output)   |
//!
//! The schema is static: [`HEADER_FIELDS`] lists each field's byte range and
//! decoder in on-disk order, and [`HeaderEntries::decode`] walks it once.

use std::fmt;

use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Platform tag of the only container format this crate knows.
pub const KNOWN_PLATFORM: &str = "WBUI";

/// Header version of the only container format this crate knows.
pub const KNOWN_VERSION: u16 = 1;

/// Length of the key-derivation salt.
pub const SALT_SIZE: usize = 16;

/// Length of the stored identity hash.
pub const UUID_HASH_SIZE: usize = 32;

/// Total size of the backup header in bytes.
pub const HEADER_SIZE: usize = header_size();

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The input ended before a complete header could be read.
    #[error("Backup header too short: expected {required} bytes, got {actual}")]
    TooShort { actual: usize, required: usize },
}

/// The decoded backup header.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderEntries {
    /// Producing application / format tag, e.g. `"WBUI"`.
    pub platform: String,
    /// Unused byte; carried through but never validated.
    pub reserved: u8,
    pub version: u16,
    pub salt: [u8; SALT_SIZE],
    /// Argon2i hash of the user identifier, salted with `salt`.
    pub uuid_hash: [u8; UUID_HASH_SIZE],
}

impl fmt::Debug for HeaderEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderEntries")
            .field("platform", &self.platform)
            .field("reserved", &self.reserved)
            .field("version", &self.version)
            .field("salt", &hex::encode(self.salt))
            .field("uuid_hash", &hex::encode(self.uuid_hash))
            .finish()
    }
}

/// One entry of the header schema: a contiguous byte range and the function
/// that stores its decoded value.
#[derive(Debug, Clone, Copy)]
pub struct HeaderField {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
    decode: fn(&[u8], &mut HeaderEntries),
}

impl HeaderField {
    const fn after(
        prev: &HeaderField,
        name: &'static str,
        len: usize,
        decode: fn(&[u8], &mut HeaderEntries),
    ) -> Self {
        HeaderField {
            name,
            offset: prev.offset + prev.len,
            len,
            decode,
        }
    }

    /// Byte range of this field within the header.
    pub const fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

const PLATFORM: HeaderField = HeaderField {
    name: "platform",
    offset: 0,
    len: 4,
    decode: |bytes, entries| entries.platform = read_ascii(bytes),
};
const RESERVED: HeaderField =
    HeaderField::after(&PLATFORM, "reserved", 1, |bytes, entries| entries.reserved = bytes[0]);
const VERSION: HeaderField = HeaderField::after(&RESERVED, "version", 2, |bytes, entries| {
    entries.version = read_u16_be(bytes);
});
const SALT: HeaderField = HeaderField::after(&VERSION, "salt", SALT_SIZE, |bytes, entries| {
    entries.salt.copy_from_slice(bytes);
});
const UUID_HASH: HeaderField =
    HeaderField::after(&SALT, "uuid_hash", UUID_HASH_SIZE, |bytes, entries| {
        entries.uuid_hash.copy_from_slice(bytes);
    });

/// The header schema in on-disk order.
pub const HEADER_FIELDS: [HeaderField; 5] = [PLATFORM, RESERVED, VERSION, SALT, UUID_HASH];

const fn header_size() -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < HEADER_FIELDS.len() {
        total += HEADER_FIELDS[i].len;
        i += 1;
    }
    total
}

// The layout is contiguous, so the size is also the end of the last field.
const _: () = assert!(header_size() == UUID_HASH.offset + UUID_HASH.len);
const _: () = assert!(header_size() == 55);

fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn read_ascii(bytes: &[u8]) -> String {
    // Non-ASCII bytes are not expected; map them lossily instead of failing so
    // that an unknown platform still surfaces as a readable warning.
    String::from_utf8_lossy(bytes).into_owned()
}

impl HeaderEntries {
    /// Number of bytes [`decode`](Self::decode) needs.
    pub const fn required_size() -> usize {
        HEADER_SIZE
    }

    /// Decode the header from the start of `buffer`.
    ///
    /// Bytes beyond [`HEADER_SIZE`] are ignored; the caller tracks its own
    /// read position.
    #[instrument(level = "debug", skip(buffer), fields(buffer_size = buffer.len()))]
    pub fn decode(buffer: &[u8]) -> Result<Self, HeaderError> {
        if buffer.len() < HEADER_SIZE {
            warn!(actual_size = buffer.len(), "Backup header too short");
            return Err(HeaderError::TooShort {
                actual: buffer.len(),
                required: HEADER_SIZE,
            });
        }

        let mut entries = HeaderEntries {
            platform: String::new(),
            reserved: 0,
            version: 0,
            salt: [0u8; SALT_SIZE],
            uuid_hash: [0u8; UUID_HASH_SIZE],
        };

        for field in &HEADER_FIELDS {
            (field.decode)(&buffer[field.range()], &mut entries);
        }

        debug!(
            platform = %entries.platform,
            version = entries.version,
            salt = %hex::encode(entries.salt),
            "Backup header decoded"
        );
        Ok(entries)
    }

    /// Whether this header names the platform/version pair this crate was built for.
    pub fn is_known_format(&self) -> bool {
        self.platform == KNOWN_PLATFORM && self.version == KNOWN_VERSION
    }
}
