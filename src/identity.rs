use std::collections::BTreeMap;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub type IdentityId = u64;

/// A registered user as far as face matching is concerned.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Identity {
    id: IdentityId,
    email: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    mobile_phone: Option<String>,
    #[serde(default)]
    is_staff: bool,
    /// Envelope JSON encrypted under the storage key.
    #[serde(default)]
    face_descriptor: Option<String>,
    registered_at: String,
}

impl Identity {
    pub fn id(&self) -> IdentityId {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    pub fn is_staff(&self) -> bool {
        self.is_staff
    }

    /// Stored descriptor text, `None` when empty or absent.
    pub fn face_descriptor(&self) -> Option<&str> {
        self.face_descriptor
            .as_deref()
            .filter(|d| !d.trim().is_empty())
    }

    pub fn registered_at(&self) -> &str {
        &self.registered_at
    }
}

/// Fields of a not-yet-stored identity.
#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub email: String,
    pub first_name: Option<String>,
    pub mobile_phone: Option<String>,
    pub is_staff: bool,
    pub face_descriptor: Option<String>,
}

/// The user-account store the face subsystem reads from and writes to.
pub trait IdentityStore {
    /// Every identity whose descriptor field is non-empty.
    fn get_all_with_descriptor(&self) -> Box<dyn Iterator<Item = &Identity> + '_>;

    fn get_by_id(&self, id: IdentityId) -> Option<&Identity>;

    fn save_descriptor(&mut self, id: IdentityId, envelope_json: String) -> Result<(), StoreError>;

    fn email_taken(&self, email: &str) -> bool;

    fn phone_taken(&self, phone: &str) -> bool;

    fn insert(&mut self, identity: NewIdentity) -> Result<IdentityId, StoreError>;
}

/// In-memory identity table, persisted as one JSON document.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Registry {
    identities: BTreeMap<IdentityId, Identity>,
    next_id: IdentityId,
    creation_date: String,
    /// Known plaintext sealed under the storage key the registry was created with.
    #[serde(default)]
    key_check: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            identities: BTreeMap::new(),
            next_id: 1,
            creation_date: Local::now().to_string(),
            key_check: None,
        }
    }

    pub fn key_check(&self) -> Option<&str> {
        self.key_check.as_deref()
    }

    pub fn set_key_check(&mut self, envelope_json: String) {
        self.key_check = Some(envelope_json);
    }

    pub fn entries(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn creation_date(&self) -> &str {
        &self.creation_date
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn with_descriptor_count(&self) -> usize {
        self.get_all_with_descriptor().count()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IdentityStore for Registry {
    fn get_all_with_descriptor(&self) -> Box<dyn Iterator<Item = &Identity> + '_> {
        Box::new(
            self.identities
                .values()
                .filter(|i| i.face_descriptor().is_some()),
        )
    }

    fn get_by_id(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.get(&id)
    }

    fn save_descriptor(&mut self, id: IdentityId, envelope_json: String) -> Result<(), StoreError> {
        match self.identities.get_mut(&id) {
            Some(identity) => {
                identity.face_descriptor = Some(envelope_json);
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn email_taken(&self, email: &str) -> bool {
        let wanted = normalize_email(email);
        self.identities
            .values()
            .any(|i| normalize_email(&i.email) == wanted)
    }

    fn phone_taken(&self, phone: &str) -> bool {
        let wanted = phone.trim();
        self.identities
            .values()
            .any(|i| i.mobile_phone.as_deref().map(str::trim) == Some(wanted))
    }

    fn insert(&mut self, new: NewIdentity) -> Result<IdentityId, StoreError> {
        if self.email_taken(&new.email) {
            return Err(StoreError::EmailTaken(new.email));
        }
        if let Some(phone) = new.mobile_phone.as_deref().filter(|p| self.phone_taken(p)) {
            return Err(StoreError::PhoneTaken(phone.to_string()));
        }

        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.identities.insert(
            id,
            Identity {
                id,
                email: new.email.trim().to_string(),
                first_name: new.first_name,
                mobile_phone: new.mobile_phone,
                is_staff: new.is_staff,
                face_descriptor: new.face_descriptor,
                registered_at: Local::now().to_string(),
            },
        );
        Ok(id)
    }
}
