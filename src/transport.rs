//! Client-to-server descriptor transport.
//!
//! Request body shared by signup, login and confirmation:
//! ```text
//! { "key_id": "<hex>", "face_descriptor": { "iv": .., "ciphertext": .., "tag": .. } }
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::{self, EncryptedEnvelope};
use crate::descriptor::FeatureVector;
use crate::error::FaceError;
use crate::keystore::{EphemeralKeyStore, IssuedKey, KeyCache};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescriptorSubmission {
    pub key_id: String,
    pub face_descriptor: EncryptedEnvelope,
}

impl DescriptorSubmission {
    pub fn from_json(body: &str) -> Result<Self, FaceError> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Encrypt a captured descriptor with an issued transport key (client side).
pub fn seal(vector: &FeatureVector, issued: &IssuedKey) -> Result<DescriptorSubmission, FaceError> {
    let key = issued.raw_key()?;
    Ok(DescriptorSubmission {
        key_id: issued.key_id.clone(),
        face_descriptor: codec::encrypt(vector, &key)?,
    })
}

/// Resolve the transport key and decrypt a submission (server side).
///
/// # Errors
///
/// - [`FaceError::KeyExpired`] if the key id no longer resolves
/// - [`FaceError::MalformedInput`] / [`FaceError::Decryption`] from the codec
pub fn open<C: KeyCache>(
    keys: &EphemeralKeyStore<C>,
    submission: &DescriptorSubmission,
) -> Result<FeatureVector, FaceError> {
    let key = keys.fetch_key(&submission.key_id)?;
    codec::decrypt(&submission.face_descriptor, &key).inspect_err(|e| {
        if matches!(e, FaceError::Decryption) {
            warn!(key_id = %submission.key_id, "submitted face descriptor failed authentication");
        }
    })
}
