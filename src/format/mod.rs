//! Stored descriptor field formats.
//!
//! The canonical at-rest format is the AES-GCM envelope JSON. Older records
//! may still hold the vector as a plain JSON numeric array; those are
//! recognised only so they can be migrated. Anything else is unreadable and
//! is never interpreted further.

pub mod legacy;

use crate::codec::EncryptedEnvelope;
use crate::descriptor::FeatureVector;

/// What a stored descriptor field turned out to contain.
#[derive(Debug)]
pub enum StoredFormat {
    Envelope(EncryptedEnvelope),
    LegacyPlain(FeatureVector),
    Unreadable(String),
}

/// Classify a stored descriptor field.
pub fn classify(text: &str) -> StoredFormat {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return match EncryptedEnvelope::from_json(trimmed) {
            Ok(envelope) => StoredFormat::Envelope(envelope),
            Err(e) => StoredFormat::Unreadable(e.to_string()),
        };
    }

    if trimmed.starts_with('[') {
        return match legacy::parse(trimmed) {
            Ok(vector) => StoredFormat::LegacyPlain(vector),
            Err(e) => StoredFormat::Unreadable(e.to_string()),
        };
    }

    StoredFormat::Unreadable("unrecognised stored descriptor format".into())
}
