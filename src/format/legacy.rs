//! Unencrypted descriptor records.
//!
//! Legacy Format:
//! ```text
//! [f0, f1, ..., f127]
//! ```
//! A bare JSON numeric array, written before descriptors were encrypted.

use crate::descriptor::FeatureVector;
use crate::error::FaceError;

/// Parse a legacy plaintext descriptor.
///
/// # Errors
///
/// Returns [`FaceError::MalformedInput`] if the text is not a numeric array of
/// exactly 128 finite numbers.
pub fn parse(text: &str) -> Result<FeatureVector, FaceError> {
    FeatureVector::from_json(text.trim().as_bytes())
}
