pub mod codec;
pub mod config;
pub mod crypto;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod identity;
pub mod keystore;
pub mod matcher;
pub mod registration;
pub mod repository;
mod storage;
pub mod transport;
pub mod verification;

use std::fmt;
use std::sync::Arc;

pub use crate::config::MatchConfig;
pub use crate::crypto::StorageKey;
pub use crate::descriptor::{DESCRIPTOR_LEN, FeatureVector};
pub use crate::error::{FaceError, StoreError};
pub use crate::keystore::{EphemeralKeyStore, IssuedKey};
pub use crate::storage::Storage;
pub use crate::transport::DescriptorSubmission;

use crate::codec::EncryptedEnvelope;
use crate::format::StoredFormat;
use crate::identity::{Identity, IdentityId, IdentityStore, NewIdentity, Registry};
use crate::matcher::{LinearScan, MatchResult, MatchStrategy};
use crate::registration::ValidationErrors;
use crate::repository::DescriptorRepository;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Signup form: account fields plus the transported face descriptor.
#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub email: String,
    pub first_name: Option<String>,
    pub mobile_phone: Option<String>,
    pub is_staff: bool,
    pub submission: DescriptorSubmission,
}

/// Body returned on a successful face login.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginSummary {
    pub user_id: IdentityId,
    pub email: String,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated(LoginSummary),
    /// The face belongs to a staff account; those sign in through the admin login.
    StaffRedirect,
    NotRecognized,
}

impl LoginOutcome {
    pub fn status(&self) -> u16 {
        match self {
            LoginOutcome::Authenticated(_) => 200,
            LoginOutcome::StaffRedirect => 403,
            LoginOutcome::NotRecognized => 401,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub already_encrypted: usize,
    pub unreadable: usize,
}

pub struct Info {
    path: String,
    created: String,
    identities: usize,
    with_descriptor: usize,
    threshold: f64,
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Registry:        {}", self.path)?;
        writeln!(f, "Created:         {}", self.created)?;
        writeln!(f, "Identities:      {}", self.identities)?;
        writeln!(f, "With face:       {}", self.with_descriptor)?;
        write!(f, "Match threshold: {}", self.threshold)
    }
}

/// Face sign-in service over a file-backed identity registry.
pub struct Facegate {
    registry: Registry,
    storage: Storage,
    storage_key: StorageKey,
    keys: Arc<EphemeralKeyStore>,
    matcher: LinearScan,
}

impl Facegate {
    pub fn init(storage_key: StorageKey, config: MatchConfig) -> Result<Self> {
        Self::init_with_storage(default_storage()?, storage_key, config)
    }

    pub fn init_with_storage(
        storage: Storage,
        storage_key: StorageKey,
        config: MatchConfig,
    ) -> Result<Self> {
        if storage.exists() {
            bail!("facegate registry already exists");
        }
        config.validate()?;

        let mut registry = Registry::new();
        let check = codec::seal_bytes(KEY_CHECK_PLAINTEXT, storage_key.as_key())?;
        registry.set_key_check(check.to_json());
        storage.save_registry(&registry)?;
        info!(path = %storage.path().display(), "registry initialized");

        Ok(Self {
            registry,
            storage,
            storage_key,
            keys: Arc::new(EphemeralKeyStore::new()),
            matcher: LinearScan::new(&config),
        })
    }

    pub fn open(storage_key: StorageKey, config: MatchConfig) -> Result<Self> {
        Self::open_with_storage(default_storage()?, storage_key, config)
    }

    pub fn open_with_storage(
        storage: Storage,
        storage_key: StorageKey,
        config: MatchConfig,
    ) -> Result<Self> {
        if !storage.exists() {
            bail!("facegate registry does not exist");
        }
        config.validate()?;

        let mut registry = storage.load_registry()?;
        check_storage_key(&mut registry, &storage_key)?;

        Ok(Self {
            registry,
            storage,
            storage_key,
            keys: Arc::new(EphemeralKeyStore::new()),
            matcher: LinearScan::new(&config),
        })
    }

    /// Share a key store with other request handlers.
    pub fn with_key_store(mut self, keys: Arc<EphemeralKeyStore>) -> Self {
        self.keys = keys;
        self
    }

    /// Issue a transport key for one client submission.
    pub fn issue_key(&self) -> Result<IssuedKey, FaceError> {
        self.keys.issue_key()
    }

    /// Register a new identity with its face.
    ///
    /// Email, phone and face conflicts are reported together. The descriptor
    /// is re-encrypted under the storage key before it is stored.
    pub fn register(&mut self, signup: SignupRequest) -> Result<IdentityId, FaceError> {
        let vector = transport::open(self.keys.as_ref(), &signup.submission)?;

        let mut candidate = NewIdentity {
            email: signup.email,
            first_name: signup.first_name,
            mobile_phone: signup.mobile_phone,
            is_staff: signup.is_staff,
            face_descriptor: None,
        };

        {
            let repo = DescriptorRepository::new(&self.registry, &self.storage_key);
            registration::validate_signup(&candidate, &vector, &self.registry, &repo, &self.matcher)?;
        }

        let envelope = codec::encrypt(&vector, self.storage_key.as_key())?;
        candidate.face_descriptor = Some(envelope.to_json());

        let id = self.registry.insert(candidate).map_err(conflict_to_registration)?;
        info!(identity = id, "identity registered");
        Ok(id)
    }

    /// Identify the submitted face among all registered identities.
    pub fn login(&self, submission: &DescriptorSubmission) -> Result<LoginOutcome, FaceError> {
        let vector = transport::open(self.keys.as_ref(), submission)?;

        let repo = DescriptorRepository::new(&self.registry, &self.storage_key);
        let outcome = match self.matcher.find_best_match(&vector, repo.all_registered()) {
            MatchResult::Matched { id: identity, distance } => {
                debug!(identity = identity.id(), distance, "face matched");
                if identity.is_staff() {
                    info!(identity = identity.id(), "staff face login refused");
                    LoginOutcome::StaffRedirect
                } else {
                    info!(identity = identity.id(), "face login succeeded");
                    LoginOutcome::Authenticated(LoginSummary {
                        user_id: identity.id(),
                        email: identity.email().to_string(),
                        first_name: identity.first_name().map(String::from),
                    })
                }
            }
            MatchResult::NoMatch => {
                info!("face not recognized");
                LoginOutcome::NotRecognized
            }
        };
        Ok(outcome)
    }

    /// Check that the submitted face belongs to `identity_id` itself.
    pub fn confirm(
        &self,
        identity_id: IdentityId,
        submission: &DescriptorSubmission,
    ) -> Result<(), FaceError> {
        let identity = self
            .registry
            .get_by_id(identity_id)
            .ok_or(FaceError::IdentityNotFound(identity_id))?;
        let vector = transport::open(self.keys.as_ref(), submission)?;
        verification::confirm_self(identity, &vector, &self.storage_key, &self.matcher)
    }

    /// Re-encrypt plaintext legacy descriptors under the storage key.
    pub fn migrate_legacy(&mut self) -> Result<MigrationReport, FaceError> {
        let mut report = MigrationReport::default();

        let classified: Vec<(IdentityId, StoredFormat)> = self
            .registry
            .get_all_with_descriptor()
            .filter_map(|i| Some((i.id(), format::classify(i.face_descriptor()?))))
            .collect();

        for (id, stored) in classified {
            match stored {
                StoredFormat::Envelope(_) => report.already_encrypted += 1,
                StoredFormat::LegacyPlain(vector) => {
                    let envelope = codec::encrypt(&vector, self.storage_key.as_key())?;
                    self.registry
                        .save_descriptor(id, envelope.to_json())
                        .map_err(|_| FaceError::IdentityNotFound(id))?;
                    report.migrated += 1;
                }
                StoredFormat::Unreadable(reason) => {
                    warn!(identity = id, reason = %reason, "stored face descriptor left unmigrated");
                    report.unreadable += 1;
                }
            }
        }

        info!(
            migrated = report.migrated,
            unreadable = report.unreadable,
            "legacy descriptor migration finished"
        );
        Ok(report)
    }

    pub fn identities(&self) -> Vec<&Identity> {
        self.registry.entries().collect()
    }

    pub fn identity(&self, id: IdentityId) -> Option<&Identity> {
        self.registry.get_by_id(id)
    }

    pub fn info(&self) -> Info {
        Info {
            path: self.storage.path().display().to_string(),
            created: self.registry.creation_date().to_string(),
            identities: self.registry.len(),
            with_descriptor: self.registry.with_descriptor_count(),
            threshold: self.matcher.threshold(),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.storage.save_registry(&self.registry)
    }
}

const KEY_CHECK_PLAINTEXT: &[u8] = b"facegate registry key check v1";

/// Refuse a storage key the registry was not written with.
///
/// Registries saved before the check existed are verified against their
/// encrypted descriptors instead, then get a check value on the next save.
fn check_storage_key(registry: &mut Registry, storage_key: &StorageKey) -> Result<()> {
    if let Some(check) = registry.key_check() {
        let matches = EncryptedEnvelope::from_json(check)
            .and_then(|envelope| codec::open_bytes(&envelope, storage_key.as_key()))
            .is_ok_and(|plaintext| plaintext.as_slice() == KEY_CHECK_PLAINTEXT);
        if !matches {
            bail!("storage key does not match this registry");
        }
        return Ok(());
    }

    let (encrypted, readable) = registry
        .get_all_with_descriptor()
        .filter_map(|i| match format::classify(i.face_descriptor()?) {
            StoredFormat::Envelope(envelope) => Some(envelope),
            _ => None,
        })
        .fold((0usize, 0usize), |(total, ok), envelope| {
            let opened = codec::decrypt(&envelope, storage_key.as_key()).is_ok();
            (total + 1, ok + usize::from(opened))
        });
    if encrypted > 0 && readable == 0 {
        bail!("storage key does not match this registry");
    }

    warn!("registry has no key check value; adding one");
    let check = codec::seal_bytes(KEY_CHECK_PLAINTEXT, storage_key.as_key())?;
    registry.set_key_check(check.to_json());
    Ok(())
}

fn conflict_to_registration(e: StoreError) -> FaceError {
    let mut errors = ValidationErrors::default();
    match &e {
        StoreError::EmailTaken(_) => errors.add("email", e.to_string()),
        StoreError::PhoneTaken(_) => errors.add("mobile_phone", e.to_string()),
        StoreError::NotFound(id) => return FaceError::IdentityNotFound(*id),
    }
    FaceError::Registration(errors)
}

pub fn default_storage() -> Result<Storage> {
    let project_dirs =
        ProjectDirs::from("", "", "facegate").context("could not determine platform directories")?;

    let path = project_dirs.data_dir().join("registry.json");

    Ok(Storage::new(path))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::descriptor::sample_vector;
    use crate::keystore::tests::ManualClock;
    use crate::keystore::{KEY_TTL, MemoryCache};

    fn fresh() -> (tempfile::TempDir, Facegate) {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("registry.json"));
        let fg = Facegate::init_with_storage(
            storage,
            StorageKey::generate().unwrap(),
            MatchConfig::default(),
        )
        .unwrap();
        (dir, fg)
    }

    fn submit(fg: &Facegate, vector: &FeatureVector) -> DescriptorSubmission {
        let issued = fg.issue_key().unwrap();
        transport::seal(vector, &issued).unwrap()
    }

    fn signup(fg: &Facegate, email: &str, vector: &FeatureVector) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            first_name: Some("Anna".into()),
            mobile_phone: None,
            is_staff: false,
            submission: submit(fg, vector),
        }
    }

    fn negated(v: &FeatureVector) -> FeatureVector {
        FeatureVector::new(v.as_slice().iter().map(|c| -c).collect()).unwrap()
    }

    #[test]
    fn register_login_and_duplicate_scenario() {
        let (_dir, mut fg) = fresh();
        let va = sample_vector(21);

        let request = signup(&fg, "a@corp.test", &va);
        let a = fg.register(request).unwrap();

        match fg.login(&submit(&fg, &va)).unwrap() {
            LoginOutcome::Authenticated(summary) => {
                assert_eq!(summary.user_id, a);
                assert_eq!(summary.email, "a@corp.test");
                assert_eq!(summary.first_name.as_deref(), Some("Anna"));
            }
            other => panic!("expected Authenticated, got: {other:?}"),
        }

        let outcome = fg.login(&submit(&fg, &negated(&va))).unwrap();
        assert_eq!(outcome, LoginOutcome::NotRecognized);
        assert_eq!(outcome.status(), 401);

        let again = signup(&fg, "b@corp.test", &va);
        match fg.register(again) {
            Err(FaceError::Registration(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors.get("face_descriptor").is_some());
            }
            other => panic!("expected Registration, got: {other:?}"),
        }
    }

    #[test]
    fn stored_descriptor_is_encrypted_under_storage_key() {
        let (_dir, mut fg) = fresh();
        let va = sample_vector(5);
        let request = signup(&fg, "a@corp.test", &va);
        let id = fg.register(request).unwrap();

        let stored = fg.identity(id).unwrap().face_descriptor().unwrap();
        let envelope = codec::EncryptedEnvelope::from_json(stored).unwrap();
        assert_eq!(codec::decrypt(&envelope, fg.storage_key.as_key()).unwrap(), va);
    }

    #[test]
    fn login_picks_the_nearest_identity() {
        let (_dir, mut fg) = fresh();
        let request = signup(&fg, "a@corp.test", &sample_vector(1));
        fg.register(request).unwrap();
        let request = signup(&fg, "b@corp.test", &sample_vector(2));
        let b = fg.register(request).unwrap();

        let mut near_b = sample_vector(2).as_slice().to_vec();
        near_b[3] += 0.05;
        let near = FeatureVector::new(near_b).unwrap();

        match fg.login(&submit(&fg, &near)).unwrap() {
            LoginOutcome::Authenticated(summary) => assert_eq!(summary.user_id, b),
            other => panic!("expected Authenticated, got: {other:?}"),
        }
    }

    #[test]
    fn staff_face_is_redirected() {
        let (_dir, mut fg) = fresh();
        let v = sample_vector(8);
        let mut request = signup(&fg, "admin@corp.test", &v);
        request.is_staff = true;
        fg.register(request).unwrap();

        let outcome = fg.login(&submit(&fg, &v)).unwrap();
        assert_eq!(outcome, LoginOutcome::StaffRedirect);
        assert_eq!(outcome.status(), 403);
    }

    #[test]
    fn expired_transport_key_is_reported_as_such() {
        let clock = ManualClock::new();
        let keys = Arc::new(EphemeralKeyStore::with_cache(MemoryCache::with_clock(
            clock.clone(),
        )));
        let (_dir, fg) = fresh();
        let fg = fg.with_key_store(keys);

        let submission = submit(&fg, &sample_vector(1));
        clock.advance(KEY_TTL + Duration::from_secs(1));

        assert!(matches!(fg.login(&submission), Err(FaceError::KeyExpired)));
    }

    #[test]
    fn confirm_accepts_self_and_rejects_others() {
        let (_dir, mut fg) = fresh();
        let request = signup(&fg, "a@corp.test", &sample_vector(1));
        let a = fg.register(request).unwrap();
        let request = signup(&fg, "b@corp.test", &sample_vector(2));
        fg.register(request).unwrap();

        assert!(fg.confirm(a, &submit(&fg, &sample_vector(1))).is_ok());
        assert!(matches!(
            fg.confirm(a, &submit(&fg, &sample_vector(2))),
            Err(FaceError::Mismatch)
        ));
        assert!(matches!(
            fg.confirm(99, &submit(&fg, &sample_vector(1))),
            Err(FaceError::IdentityNotFound(99))
        ));
    }

    #[test]
    fn corrupt_record_does_not_break_login() {
        let (_dir, mut fg) = fresh();
        let request = signup(&fg, "a@corp.test", &sample_vector(1));
        let a = fg.register(request).unwrap();
        let request = signup(&fg, "b@corp.test", &sample_vector(2));
        let b = fg.register(request).unwrap();
        fg.registry.save_descriptor(a, "{\"iv\":\"x\"}".into()).unwrap();

        match fg.login(&submit(&fg, &sample_vector(2))).unwrap() {
            LoginOutcome::Authenticated(summary) => assert_eq!(summary.user_id, b),
            other => panic!("expected Authenticated, got: {other:?}"),
        }
    }

    #[test]
    fn migrate_encrypts_legacy_plaintext() {
        let (_dir, mut fg) = fresh();
        let legacy = sample_vector(4);
        fg.registry
            .insert(NewIdentity {
                email: "old@corp.test".into(),
                face_descriptor: Some(String::from_utf8(legacy.to_json()).unwrap()),
                ..Default::default()
            })
            .unwrap();
        fg.registry
            .insert(NewIdentity {
                email: "broken@corp.test".into(),
                face_descriptor: Some("eval('x')".into()),
                ..Default::default()
            })
            .unwrap();
        let request = signup(&fg, "new@corp.test", &sample_vector(6));
        fg.register(request).unwrap();

        assert_eq!(fg.login(&submit(&fg, &legacy)).unwrap(), LoginOutcome::NotRecognized);

        let report = fg.migrate_legacy().unwrap();
        assert_eq!(
            report,
            MigrationReport {
                migrated: 1,
                already_encrypted: 1,
                unreadable: 1,
            }
        );
        assert!(fg.login(&submit(&fg, &legacy)).unwrap().status() == 200);
    }

    #[test]
    fn save_and_reopen() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("registry.json"));
        let key = StorageKey::generate().unwrap();
        let v = sample_vector(3);

        let mut fg =
            Facegate::init_with_storage(storage.clone(), key.clone(), MatchConfig::default())
                .unwrap();
        let request = signup(&fg, "a@corp.test", &v);
        fg.register(request).unwrap();
        fg.save().unwrap();

        let reopened = Facegate::open_with_storage(storage, key, MatchConfig::default()).unwrap();
        assert_eq!(reopened.identities().len(), 1);
        assert_eq!(reopened.login(&submit(&reopened, &v)).unwrap().status(), 200);
    }

    #[test]
    fn init_fails_if_registry_exists() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("registry.json"));
        let key = StorageKey::generate().unwrap();
        Facegate::init_with_storage(storage.clone(), key.clone(), MatchConfig::default()).unwrap();
        assert!(Facegate::init_with_storage(storage, key, MatchConfig::default()).is_err());
    }

    #[test]
    fn open_with_other_storage_key_fails() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("registry.json"));
        let v = sample_vector(3);

        let mut fg = Facegate::init_with_storage(
            storage.clone(),
            StorageKey::generate().unwrap(),
            MatchConfig::default(),
        )
        .unwrap();
        let request = signup(&fg, "a@corp.test", &v);
        fg.register(request).unwrap();
        fg.save().unwrap();

        let err = Facegate::open_with_storage(
            storage,
            StorageKey::generate().unwrap(),
            MatchConfig::default(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("storage key does not match"));
    }

    #[test]
    fn registry_without_key_check_is_verified_against_records() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("registry.json"));
        let key = StorageKey::generate().unwrap();

        let mut registry = Registry::new();
        let envelope = codec::encrypt(&sample_vector(2), key.as_key()).unwrap();
        registry
            .insert(NewIdentity {
                email: "a@corp.test".into(),
                face_descriptor: Some(envelope.to_json()),
                ..Default::default()
            })
            .unwrap();
        storage.save_registry(&registry).unwrap();

        assert!(
            Facegate::open_with_storage(
                storage.clone(),
                StorageKey::generate().unwrap(),
                MatchConfig::default()
            )
            .is_err()
        );

        let fg = Facegate::open_with_storage(storage.clone(), key.clone(), MatchConfig::default())
            .unwrap();
        fg.save().unwrap();
        assert!(storage.load_registry().unwrap().key_check().is_some());
        assert!(
            Facegate::open_with_storage(storage, StorageKey::generate().unwrap(), MatchConfig::default())
                .is_err()
        );
    }

    #[test]
    fn legacy_face_cannot_be_registered_again() {
        let (_dir, mut fg) = fresh();
        let legacy = sample_vector(4);
        fg.registry
            .insert(NewIdentity {
                email: "old@corp.test".into(),
                face_descriptor: Some(String::from_utf8(legacy.to_json()).unwrap()),
                ..Default::default()
            })
            .unwrap();

        let request = signup(&fg, "new@corp.test", &legacy);
        match fg.register(request) {
            Err(FaceError::Registration(errors)) => {
                assert!(errors.get("face_descriptor").is_some());
            }
            other => panic!("expected Registration, got: {other:?}"),
        }

        fg.migrate_legacy().unwrap();
        match fg.login(&submit(&fg, &legacy)).unwrap() {
            LoginOutcome::Authenticated(summary) => assert_eq!(summary.email, "old@corp.test"),
            other => panic!("expected Authenticated, got: {other:?}"),
        }
        assert_eq!(fg.identities().len(), 1);
    }
}
