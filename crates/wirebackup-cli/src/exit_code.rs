//! Exit codes for the CLI.
//!
//! These follow common Unix conventions and provide meaningful
//! status information for scripting and automation.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments or options)
pub const USAGE_ERROR: u8 = 2;

/// Authentication failed (wrong password or identity)
pub const AUTH_FAILED: u8 = 3;

/// Backup is invalid, truncated or corrupt
pub const BACKUP_INVALID: u8 = 4;

/// Permission denied reading the backup or writing the output
pub const PERMISSION_DENIED: u8 = 5;

/// Input file or output directory not found
pub const NOT_FOUND: u8 = 7;
