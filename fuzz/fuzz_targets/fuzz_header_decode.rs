//! Fuzz target for backup header decoding
//!
//! Any input must either decode or fail with `TooShort`, never panic, and
//! decoding must only look at the first 55 bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wirebackup_core::header::{HEADER_SIZE, HeaderEntries, HeaderError};

fuzz_target!(|data: &[u8]| {
    match HeaderEntries::decode(data) {
        Ok(header) => {
            assert!(data.len() >= HEADER_SIZE);
            assert_eq!(header.salt[..], data[7..23]);
            assert_eq!(HeaderEntries::decode(&data[..HEADER_SIZE]).ok(), Some(header));
        }
        Err(HeaderError::TooShort { actual, required }) => {
            assert_eq!(actual, data.len());
            assert_eq!(required, HEADER_SIZE);
            assert!(actual < required);
        }
    }
});
