//! Persistence contract between the consumer and the relying party, plus two
//! bundled backends: a [`MemoryStore`] for single-process deployments and
//! tests, and a stateless [`DumbStore`].

use crate::association::Association;
use crate::crypto;
use crate::types::{AssociationHandle, AuthKey, Nonce, ServerUrl};

use rand::{thread_rng, Rng};

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Persistence operations the consumer needs between requests.
///
/// The store is the only mutable resource shared across concurrent logins,
/// so implementations must be safe for concurrent callers. In particular,
/// [`use_nonce`](Self::use_nonce) must be atomic: for any nonce, at most one
/// call across all callers may return `true`.
///
/// Stores are expected to evict nonces and associations past some retention
/// horizon of their own choosing; the consumer does not drive garbage
/// collection. Nonces must remain present for at least five minutes (the
/// token lifetime) after issuance.
pub trait Store {
    /// A stable secret used only to authenticate bridge tokens. Rotating it
    /// invalidates every outstanding token.
    fn auth_key(&self) -> AuthKey;

    /// When `true`, the consumer skips association caching entirely and
    /// verifies every callback with a `check_authentication` round trip.
    fn is_dumb(&self) -> bool {
        false
    }

    /// Persist an association under its provider endpoint, replacing any
    /// previous one.
    fn store_association(&self, server_url: &ServerUrl, association: Association);

    /// Load the association stored for a provider endpoint, if any.
    fn get_association(&self, server_url: &ServerUrl) -> Option<Association>;

    /// Remove the stored association if its handle matches. Returns whether
    /// anything was removed.
    fn remove_association(&self, server_url: &ServerUrl, handle: &AssociationHandle) -> bool;

    /// Remember that a nonce was issued.
    fn store_nonce(&self, nonce: &Nonce);

    /// Atomically consume a nonce. Returns `true` iff it was present and had
    /// not been used yet.
    fn use_nonce(&self, nonce: &Nonce) -> bool;
}

impl<S: Store + ?Sized> Store for &S {
    fn auth_key(&self) -> AuthKey {
        (**self).auth_key()
    }

    fn is_dumb(&self) -> bool {
        (**self).is_dumb()
    }

    fn store_association(&self, server_url: &ServerUrl, association: Association) {
        (**self).store_association(server_url, association)
    }

    fn get_association(&self, server_url: &ServerUrl) -> Option<Association> {
        (**self).get_association(server_url)
    }

    fn remove_association(&self, server_url: &ServerUrl, handle: &AssociationHandle) -> bool {
        (**self).remove_association(server_url, handle)
    }

    fn store_nonce(&self, nonce: &Nonce) {
        (**self).store_nonce(nonce)
    }

    fn use_nonce(&self, nonce: &Nonce) -> bool {
        (**self).use_nonce(nonce)
    }
}

/// In-memory store backed by mutex-protected maps.
///
/// State does not survive the process, so every process restart invalidates
/// outstanding logins; fine for development, tests, and single-process
/// relying parties.
pub struct MemoryStore {
    auth_key: AuthKey,
    associations: Mutex<HashMap<String, Association>>,
    nonces: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// Create an empty store with a fresh random auth key.
    pub fn new() -> Self {
        let key: Vec<u8> = (0..crypto::SHA1_LEN).map(|_| thread_rng().gen::<u8>()).collect();
        Self {
            auth_key: AuthKey::new(key),
            associations: Mutex::new(HashMap::new()),
            nonces: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn auth_key(&self) -> AuthKey {
        self.auth_key.clone()
    }

    fn store_association(&self, server_url: &ServerUrl, association: Association) {
        self.associations
            .lock()
            .expect("association lock poisoned")
            .insert(server_url.to_string(), association);
    }

    fn get_association(&self, server_url: &ServerUrl) -> Option<Association> {
        self.associations
            .lock()
            .expect("association lock poisoned")
            .get(server_url.as_str())
            .cloned()
    }

    fn remove_association(&self, server_url: &ServerUrl, handle: &AssociationHandle) -> bool {
        let mut associations = self.associations.lock().expect("association lock poisoned");
        match associations.get(server_url.as_str()) {
            Some(stored) if stored.handle() == handle => {
                associations.remove(server_url.as_str());
                true
            }
            _ => false,
        }
    }

    fn store_nonce(&self, nonce: &Nonce) {
        self.nonces
            .lock()
            .expect("nonce lock poisoned")
            .insert(nonce.secret().clone());
    }

    fn use_nonce(&self, nonce: &Nonce) -> bool {
        // Removal under the lock makes single use exclusive.
        self.nonces
            .lock()
            .expect("nonce lock poisoned")
            .remove(nonce.secret())
    }
}

/// A store that stores nothing.
///
/// The auth key is derived from a caller-supplied secret phrase, so it is
/// stable across processes without shared state. `is_dumb` forces every
/// callback through the `check_authentication` recheck. Nonce tracking
/// degrades to always-true, which weakens replay protection; prefer
/// [`MemoryStore`] or a persistent store wherever state can be kept.
pub struct DumbStore {
    auth_key: AuthKey,
}

impl DumbStore {
    /// Create a store whose auth key is the SHA-1 of the given phrase.
    pub fn new(secret_phrase: &str) -> Self {
        Self {
            auth_key: AuthKey::new(crypto::sha1(secret_phrase.as_bytes())),
        }
    }
}

impl Store for DumbStore {
    fn auth_key(&self) -> AuthKey {
        self.auth_key.clone()
    }

    fn is_dumb(&self) -> bool {
        true
    }

    fn store_association(&self, _server_url: &ServerUrl, _association: Association) {}

    fn get_association(&self, _server_url: &ServerUrl) -> Option<Association> {
        None
    }

    fn remove_association(&self, _server_url: &ServerUrl, _handle: &AssociationHandle) -> bool {
        false
    }

    fn store_nonce(&self, _nonce: &Nonce) {}

    fn use_nonce(&self, _nonce: &Nonce) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{DumbStore, MemoryStore, Store};
    use crate::association::Association;
    use crate::types::{AssociationHandle, AssociationType, MacKey, Nonce, ServerUrl};

    use chrono::Utc;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn server_url() -> ServerUrl {
        ServerUrl::new("http://idp.example/op".to_string()).unwrap()
    }

    fn association(handle: &str) -> Association {
        Association::new(
            AssociationHandle::new(handle.to_string()),
            MacKey::new(b"x".repeat(20)),
            AssociationType::HmacSha1,
            Utc::now(),
            3600,
        )
    }

    #[test]
    fn test_association_lifecycle() {
        let store = MemoryStore::new();
        let url = server_url();
        assert!(store.get_association(&url).is_none());

        store.store_association(&url, association("h1"));
        assert_eq!(
            store.get_association(&url).unwrap().handle().as_str(),
            "h1"
        );

        // Replacement: last store wins.
        store.store_association(&url, association("h2"));
        assert_eq!(
            store.get_association(&url).unwrap().handle().as_str(),
            "h2"
        );

        // Removal requires a matching handle.
        assert!(!store.remove_association(&url, &AssociationHandle::new("h1".to_string())));
        assert!(store.get_association(&url).is_some());
        assert!(store.remove_association(&url, &AssociationHandle::new("h2".to_string())));
        assert!(store.get_association(&url).is_none());
    }

    #[test]
    fn test_nonce_single_use() {
        let store = MemoryStore::new();
        let nonce = Nonce::new_random();

        // Unknown nonces never consume.
        assert!(!store.use_nonce(&nonce));

        store.store_nonce(&nonce);
        assert!(store.use_nonce(&nonce));
        assert!(!store.use_nonce(&nonce));
    }

    #[test]
    fn test_nonce_single_use_concurrent() {
        let store = Arc::new(MemoryStore::new());
        let nonce = Nonce::new("race0001".to_string());
        store.store_nonce(&nonce);

        let successes = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let successes = Arc::clone(&successes);
                let nonce = nonce.clone();
                std::thread::spawn(move || {
                    if store.use_nonce(&nonce) {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auth_key_stable() {
        let store = MemoryStore::new();
        assert_eq!(store.auth_key().secret(), store.auth_key().secret());
        assert_eq!(store.auth_key().secret().len(), 20);
    }

    #[test]
    fn test_dumb_store() {
        let store = DumbStore::new("a secret phrase");
        assert!(store.is_dumb());
        assert_eq!(
            store.auth_key().secret(),
            DumbStore::new("a secret phrase").auth_key().secret()
        );

        let url = server_url();
        store.store_association(&url, association("h1"));
        assert!(store.get_association(&url).is_none());

        // A dumb store cannot track nonces.
        assert!(store.use_nonce(&Nonce::new_random()));
    }
}
