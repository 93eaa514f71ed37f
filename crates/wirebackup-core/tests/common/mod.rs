//! Shared fixtures for wirebackup-core integration tests.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing_subscriber::EnvFilter;

/// Header-only capture from a real backup.
pub const HEADER_FIXTURE: &str =
    "V0JVSQAAAQ8CgQ/ikb7pIkWDhhDkY7uMxemLjGnPNJ2ohITEekzYAzAxygPF36PpKw9HXrGZWg==";

/// A complete backup of the plaintext `123456789`.
pub const BACKUP_FIXTURE: &str = "V0JVSQAAAT5xxW76YX91IgLvJwXeC5x+q/8To15mBzbsA6rc5Dzf7xRyWH+LYv+bscKxj3c7Fl7trr/9qt78lgA5ZtyjK7d2ZBdSYl4HLskPjyUIseTjAZjGKt+7MEXp8aVBey8ooGep";

pub const BACKUP_PASSWORD: &str = "1235678";
pub const BACKUP_PLAINTEXT: &[u8] = b"123456789";

/// Byte offset of the first chunk in [`BACKUP_FIXTURE`].
pub const FIRST_CHUNK_OFFSET: usize = 55 + 24;

/// Route library logs to the test harness. `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn header_fixture() -> Vec<u8> {
    STANDARD.decode(HEADER_FIXTURE).unwrap()
}

pub fn backup_fixture() -> Vec<u8> {
    STANDARD.decode(BACKUP_FIXTURE).unwrap()
}
