//! Re-authentication of the signed-in user for sensitive actions.

use tracing::{debug, info, warn};

use crate::crypto::StorageKey;
use crate::descriptor::FeatureVector;
use crate::error::FaceError;
use crate::identity::Identity;
use crate::matcher::MatchStrategy;
use crate::repository::decode_stored;

/// Confirm that `input` is the face of `session_identity` itself.
///
/// # Errors
///
/// - [`FaceError::Mismatch`] if the face is someone else's, or the identity
///   never registered one
/// - [`FaceError::CorruptStoredRecord`] if the stored descriptor cannot be
///   read; this is never treated as a match
pub fn confirm_self<M: MatchStrategy>(
    session_identity: &Identity,
    input: &FeatureVector,
    storage_key: &StorageKey,
    matcher: &M,
) -> Result<(), FaceError> {
    if session_identity.face_descriptor().is_none() {
        info!(identity = session_identity.id(), "no registered face to confirm against");
        return Err(FaceError::Mismatch);
    }

    let known = decode_stored(session_identity, storage_key).map_err(|e| {
        warn!(
            identity = session_identity.id(),
            error = %e,
            "stored face descriptor unreadable during confirmation"
        );
        FaceError::CorruptStoredRecord(session_identity.id())
    })?;

    let distance = input.distance(&known);
    debug!(
        identity = session_identity.id(),
        distance,
        threshold = matcher.threshold(),
        "self-confirmation distance"
    );

    if matcher.verify_identity(input, &known) {
        Ok(())
    } else {
        info!(identity = session_identity.id(), "self-confirmation rejected");
        Err(FaceError::Mismatch)
    }
}
