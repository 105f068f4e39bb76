//! Cryptographic primitives for descriptor transport and storage.
//!
//! Provides AES-256-GCM with detached tags and symmetric key handling.

pub mod aead;
pub mod key;

pub use aead::{Sealed, open_detached, seal_detached};
pub use key::{StorageKey, SymmetricKey};

use crate::error::FaceError;

/// Length of a symmetric key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the nonce generated for new envelopes (12 bytes).
pub const NONCE_LEN: usize = 12;
/// Longer nonce accepted on decryption (16 bytes, older clients).
pub const LONG_NONCE_LEN: usize = 16;
/// Length of the GCM authentication tag (16 bytes).
pub const TAG_LEN: usize = 16;
/// Length of a transport key id before hex encoding (16 bytes / 128 bits).
pub const KEY_ID_LEN: usize = 16;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<(), FaceError> {
    getrandom::fill(buf).map_err(|_| FaceError::Rng)
}
