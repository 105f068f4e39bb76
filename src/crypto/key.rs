use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::Zeroize;

use super::{KEY_LEN, secure_random};
use crate::error::FaceError;

/// A 256-bit AES key, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh key from the OS random generator.
    pub fn generate() -> Result<Self, FaceError> {
        let mut bytes = [0u8; KEY_LEN];
        secure_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Parse a standard-alphabet base64 string holding exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, FaceError> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| FaceError::MalformedInput(format!("key is not valid base64: {e}")))?;

        if raw.len() != KEY_LEN {
            let got = raw.len();
            raw.zeroize();
            return Err(FaceError::MalformedInput(format!(
                "key must be {KEY_LEN} bytes, got {got}"
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self(bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// The long-lived key every stored descriptor is encrypted with.
///
/// Loaded once at start-up and passed explicitly to whatever needs it.
#[derive(Clone, Debug)]
pub struct StorageKey(SymmetricKey);

impl StorageKey {
    pub fn new(key: SymmetricKey) -> Self {
        Self(key)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, FaceError> {
        SymmetricKey::from_base64(encoded).map(Self)
    }

    pub fn generate() -> Result<Self, FaceError> {
        SymmetricKey::generate().map(Self)
    }

    pub fn as_key(&self) -> &SymmetricKey {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip() {
        let key = SymmetricKey::generate().unwrap();
        let parsed = SymmetricKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn short_key_is_rejected() {
        let short = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            SymmetricKey::from_base64(&short),
            Err(FaceError::MalformedInput(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(StorageKey::from_base64("not base64 !!").is_err());
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let key = SymmetricKey::from_bytes([0xAB; KEY_LEN]);
        let printed = format!("{key:?}");
        assert!(!printed.contains("171"));
        assert!(!printed.to_lowercase().contains("ab"));
    }
}
