//! Decrypted view over every registered descriptor.

use tracing::warn;

use crate::codec::{self, EncryptedEnvelope};
use crate::crypto::StorageKey;
use crate::descriptor::FeatureVector;
use crate::error::FaceError;
use crate::format::{self, StoredFormat};
use crate::identity::{Identity, IdentityStore};

pub struct DescriptorRepository<'a, S: IdentityStore + ?Sized> {
    store: &'a S,
    storage_key: &'a StorageKey,
}

impl<'a, S: IdentityStore + ?Sized> DescriptorRepository<'a, S> {
    pub fn new(store: &'a S, storage_key: &'a StorageKey) -> Self {
        Self { store, storage_key }
    }

    /// Lazily yields `(identity, vector)` for every readable stored descriptor.
    ///
    /// A record that fails to parse or decrypt is logged and skipped; it never
    /// ends the scan. Each call walks the store afresh.
    pub fn all_registered(&self) -> impl Iterator<Item = (&'a Identity, FeatureVector)> + 'a {
        let key = self.storage_key;
        self.store
            .get_all_with_descriptor()
            .filter_map(move |identity| readable(identity, decode_stored(identity, key)))
    }

    /// Like [`all_registered`](Self::all_registered), but also yields faces
    /// still stored as legacy plaintext arrays.
    ///
    /// Uniqueness checks use this so a face awaiting migration stays taken.
    pub fn all_known_faces(&self) -> impl Iterator<Item = (&'a Identity, FeatureVector)> + 'a {
        let key = self.storage_key;
        self.store.get_all_with_descriptor().filter_map(move |identity| {
            let decoded = match identity.face_descriptor().map(format::classify) {
                Some(StoredFormat::LegacyPlain(vector)) => Ok(vector),
                _ => decode_stored(identity, key),
            };
            readable(identity, decoded)
        })
    }
}

fn readable(
    identity: &Identity,
    decoded: Result<FeatureVector, FaceError>,
) -> Option<(&Identity, FeatureVector)> {
    match decoded {
        Ok(vector) => Some((identity, vector)),
        Err(e) => {
            warn!(
                identity = identity.id(),
                error = %e,
                "skipping unreadable stored face descriptor"
            );
            None
        }
    }
}

/// Decrypt one identity's stored descriptor with the storage key.
pub fn decode_stored(identity: &Identity, key: &StorageKey) -> Result<FeatureVector, FaceError> {
    let text = identity
        .face_descriptor()
        .ok_or(FaceError::CorruptStoredRecord(identity.id()))?;
    let envelope = EncryptedEnvelope::from_json(text)?;
    codec::decrypt(&envelope, key.as_key())
}
