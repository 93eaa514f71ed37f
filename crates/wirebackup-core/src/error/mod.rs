//! Error types for the wirebackup-core crate
//!
//! Each component defines its own error enum next to the code that raises
//! it; this module gathers them in one place.

pub use crate::crypto::kdf::KeyDerivationError;
pub use crate::crypto::secretstream::PullError;
pub use crate::decrypt::{DecryptContext, DecryptError};
pub use crate::header::HeaderError;
pub use crate::stream::StreamError;
