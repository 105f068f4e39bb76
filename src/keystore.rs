//! Short-lived transport keys.
//!
//! A client asks for a key, encrypts its descriptor with it and sends the
//! envelope back together with the key id. Keys live for [`KEY_TTL`] and are
//! not consumed on use; they simply stop resolving once expired.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::{KEY_ID_LEN, SymmetricKey, secure_random};
use crate::error::FaceError;

/// Lifetime of an issued transport key.
pub const KEY_TTL: Duration = Duration::from_secs(300);

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Expiring key/value cache.
///
/// `get` must never return an entry whose ttl has elapsed.
pub trait KeyCache: Send + Sync {
    fn set(&self, key: String, value: SymmetricKey, ttl: Duration);
    fn get(&self, key: &str) -> Option<SymmetricKey>;
}

struct CacheEntry {
    value: SymmetricKey,
    expires_at: Instant,
}

/// In-process [`KeyCache`]. Expired entries are dropped on every access.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| now < e.expires_at);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCache for MemoryCache {
    fn set(&self, key: String, value: SymmetricKey, ttl: Duration) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| now < e.expires_at);
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    fn get(&self, key: &str) -> Option<SymmetricKey> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(e) if now < e.expires_at => Some(e.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

/// Response body of the key-issuance endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuedKey {
    pub key_id: String,
    pub key: String,
}

/// Issues and resolves transport keys. Safe to share across threads.
pub struct EphemeralKeyStore<C: KeyCache = MemoryCache> {
    cache: C,
    ttl: Duration,
}

impl EphemeralKeyStore<MemoryCache> {
    pub fn new() -> Self {
        Self::with_cache(MemoryCache::new())
    }
}

impl Default for EphemeralKeyStore<MemoryCache> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: KeyCache> EphemeralKeyStore<C> {
    pub fn with_cache(cache: C) -> Self {
        Self {
            cache,
            ttl: KEY_TTL,
        }
    }

    /// Generate a 256-bit key under a random 128-bit hex id.
    pub fn issue_key(&self) -> Result<IssuedKey, FaceError> {
        let key = SymmetricKey::generate()?;

        let mut id = [0u8; KEY_ID_LEN];
        secure_random(&mut id)?;
        let key_id = hex::encode(id);

        let encoded = key.to_base64();
        self.cache.set(key_id.clone(), key, self.ttl);
        debug!(key_id = %key_id, "issued transport key");

        Ok(IssuedKey {
            key_id,
            key: encoded,
        })
    }

    /// Resolve a key id.
    ///
    /// # Errors
    ///
    /// [`FaceError::KeyExpired`] if the id was never issued or its ttl elapsed.
    pub fn fetch_key(&self, key_id: &str) -> Result<SymmetricKey, FaceError> {
        if key_id.len() != KEY_ID_LEN * 2 {
            debug!(key_id = %key_id, "transport key id has unexpected length");
            return Err(FaceError::KeyExpired);
        }
        self.cache.get(key_id).ok_or(FaceError::KeyExpired)
    }
}

impl IssuedKey {
    /// Decode the raw key, as a client does before encrypting.
    pub fn raw_key(&self) -> Result<SymmetricKey, FaceError> {
        SymmetricKey::from_base64(&self.key)
    }
}
