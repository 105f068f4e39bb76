//! Descriptor codec: a [`FeatureVector`] sealed in an AES-GCM envelope.
//!
//! Envelope JSON shape, used on the wire and at rest:
//! ```text
//! { "iv": <base64>, "ciphertext": <base64>, "tag": <base64> }
//! ```
//! The plaintext is the vector's JSON numeric array.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{self, SymmetricKey};
use crate::descriptor::FeatureVector;
use crate::error::FaceError;

/// Nonce, ciphertext and tag of one encrypted descriptor, base64-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedEnvelope {
    iv: String,
    ciphertext: String,
    tag: String,
}

impl EncryptedEnvelope {
    /// Parse the stored-field / request-body JSON form.
    pub fn from_json(text: &str) -> Result<Self, FaceError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> String {
        // three plain strings always serialise
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Encrypt a descriptor under `key` with a fresh nonce.
pub fn encrypt(vector: &FeatureVector, key: &SymmetricKey) -> Result<EncryptedEnvelope, FaceError> {
    let plaintext = Zeroizing::new(vector.to_json());
    seal_bytes(&plaintext, key)
}

/// Decrypt and validate a descriptor.
///
/// # Errors
///
/// - [`FaceError::MalformedInput`] if a field is not base64 or has a bad length
/// - [`FaceError::Decryption`] if the tag does not verify or the plaintext is
///   not a 128-element numeric array
pub fn decrypt(envelope: &EncryptedEnvelope, key: &SymmetricKey) -> Result<FeatureVector, FaceError> {
    let plaintext = open_bytes(envelope, key)?;
    FeatureVector::from_json(&plaintext).map_err(|_| FaceError::Decryption)
}

/// Seal arbitrary bytes into an envelope.
pub fn seal_bytes(plaintext: &[u8], key: &SymmetricKey) -> Result<EncryptedEnvelope, FaceError> {
    let sealed = crypto::seal_detached(key, plaintext)?;

    Ok(EncryptedEnvelope {
        iv: STANDARD.encode(sealed.nonce),
        ciphertext: STANDARD.encode(&sealed.ciphertext),
        tag: STANDARD.encode(sealed.tag),
    })
}

/// Open an envelope without interpreting the plaintext.
pub fn open_bytes(
    envelope: &EncryptedEnvelope,
    key: &SymmetricKey,
) -> Result<Zeroizing<Vec<u8>>, FaceError> {
    let iv = decode_field("iv", &envelope.iv)?;
    let ciphertext = decode_field("ciphertext", &envelope.ciphertext)?;
    let tag = decode_field("tag", &envelope.tag)?;

    crypto::open_detached(key, &iv, &ciphertext, &tag)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, FaceError> {
    STANDARD
        .decode(value)
        .map_err(|e| FaceError::MalformedInput(format!("{name} is not valid base64: {e}")))
}
