//! Signup checks: one face per identity, unique email and phone.

use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::descriptor::FeatureVector;
use crate::error::FaceError;
use crate::identity::{IdentityStore, NewIdentity};
use crate::matcher::MatchStrategy;
use crate::repository::DescriptorRepository;

/// Field name to message, in the shape a form renders next to its inputs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Fail with [`FaceError::DuplicateFace`] if anyone registered already has
/// this face, including faces still stored as legacy plaintext. The matched
/// identity is not reported.
pub fn ensure_not_duplicate<S, M>(
    input: &FeatureVector,
    repository: &DescriptorRepository<'_, S>,
    matcher: &M,
) -> Result<(), FaceError>
where
    S: IdentityStore + ?Sized,
    M: MatchStrategy,
{
    let candidates = repository.all_known_faces().map(|(i, v)| (i.id(), v));
    if matcher.find_best_match(input, candidates).is_match() {
        info!("signup rejected: face already registered");
        return Err(FaceError::DuplicateFace);
    }
    Ok(())
}

/// Check every unique field of a signup in one pass.
///
/// All conflicts found are reported together in [`FaceError::Registration`].
pub fn validate_signup<S, M>(
    candidate: &NewIdentity,
    input: &FeatureVector,
    store: &S,
    repository: &DescriptorRepository<'_, S>,
    matcher: &M,
) -> Result<(), FaceError>
where
    S: IdentityStore + ?Sized,
    M: MatchStrategy,
{
    let mut errors = ValidationErrors::default();

    if candidate.email.trim().is_empty() {
        errors.add("email", "email is required");
    } else if store.email_taken(&candidate.email) {
        errors.add("email", "a user with this email already exists");
    }

    if candidate
        .mobile_phone
        .as_deref()
        .is_some_and(|p| store.phone_taken(p))
    {
        errors.add("mobile_phone", "a user with this mobile phone already exists");
    }

    match ensure_not_duplicate(input, repository, matcher) {
        Ok(()) => {}
        Err(FaceError::DuplicateFace) => {
            errors.add("face_descriptor", FaceError::DuplicateFace.to_string());
        }
        Err(e) => return Err(e),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(FaceError::Registration(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::config::MatchConfig;
    use crate::crypto::StorageKey;
    use crate::descriptor::{DESCRIPTOR_LEN, sample_vector};
    use crate::identity::Registry;
    use crate::matcher::LinearScan;

    fn enrolled(key: &StorageKey, email: &str, phone: Option<&str>, v: &FeatureVector) -> Registry {
        let mut registry = Registry::new();
        let envelope = codec::encrypt(v, key.as_key()).unwrap();
        registry
            .insert(NewIdentity {
                email: email.into(),
                mobile_phone: phone.map(String::from),
                face_descriptor: Some(envelope.to_json()),
                ..Default::default()
            })
            .unwrap();
        registry
    }

    fn shifted(v: &FeatureVector, by: f32) -> FeatureVector {
        let mut components = v.as_slice().to_vec();
        components[0] += by;
        FeatureVector::new(components).unwrap()
    }

    #[test]
    fn identical_face_is_duplicate() {
        let key = StorageKey::generate().unwrap();
        let v = sample_vector(1);
        let registry = enrolled(&key, "a@corp.test", None, &v);
        let repo = DescriptorRepository::new(&registry, &key);

        assert!(matches!(
            ensure_not_duplicate(&v, &repo, &LinearScan::default()),
            Err(FaceError::DuplicateFace)
        ));
    }

    #[test]
    fn face_at_threshold_is_accepted() {
        let key = StorageKey::generate().unwrap();
        let base = FeatureVector::new(vec![0.0; DESCRIPTOR_LEN]).unwrap();
        let registry = enrolled(&key, "a@corp.test", None, &base);
        let repo = DescriptorRepository::new(&registry, &key);
        let matcher = LinearScan::new(&MatchConfig::new(0.5).unwrap());

        assert!(ensure_not_duplicate(&shifted(&base, 0.5), &repo, &matcher).is_ok());
        assert!(ensure_not_duplicate(&shifted(&base, 0.75), &repo, &matcher).is_ok());
        assert!(ensure_not_duplicate(&shifted(&base, 0.25), &repo, &matcher).is_err());
    }

    #[test]
    fn all_conflicts_are_reported_together() {
        let key = StorageKey::generate().unwrap();
        let v = sample_vector(2);
        let registry = enrolled(&key, "a@corp.test", Some("+7100"), &v);
        let repo = DescriptorRepository::new(&registry, &key);

        let candidate = NewIdentity {
            email: "A@corp.test".into(),
            mobile_phone: Some("+7100".into()),
            ..Default::default()
        };
        match validate_signup(&candidate, &v, &registry, &repo, &LinearScan::default()) {
            Err(FaceError::Registration(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.get("email").is_some());
                assert!(errors.get("mobile_phone").is_some());
                let face = errors.get("face_descriptor").unwrap();
                assert!(!face.contains("a@corp.test"));
            }
            other => panic!("expected Registration, got: {other:?}"),
        }
    }

    #[test]
    fn clean_signup_passes() {
        let key = StorageKey::generate().unwrap();
        let registry = enrolled(&key, "a@corp.test", None, &sample_vector(2));
        let repo = DescriptorRepository::new(&registry, &key);

        let candidate = NewIdentity {
            email: "b@corp.test".into(),
            ..Default::default()
        };
        assert!(
            validate_signup(&candidate, &sample_vector(9), &registry, &repo, &LinearScan::default())
                .is_ok()
        );
    }

    #[test]
    fn display_lists_fields() {
        let mut errors = ValidationErrors::default();
        errors.add("email", "taken");
        errors.add("face_descriptor", "dup");
        assert_eq!(errors.to_string(), "email: taken; face_descriptor: dup");
    }

    #[test]
    fn legacy_plaintext_face_is_duplicate() {
        let key = StorageKey::generate().unwrap();
        let v = sample_vector(4);
        let mut registry = Registry::new();
        registry
            .insert(NewIdentity {
                email: "old@corp.test".into(),
                face_descriptor: Some(String::from_utf8(v.to_json()).unwrap()),
                ..Default::default()
            })
            .unwrap();
        let repo = DescriptorRepository::new(&registry, &key);

        assert!(matches!(
            ensure_not_duplicate(&v, &repo, &LinearScan::default()),
            Err(FaceError::DuplicateFace)
        ));
    }
}
