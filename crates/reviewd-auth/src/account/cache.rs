//! Derived account caches.
//!
//! The caches are never authoritative: entries are loaded from
//! [`AccountStorage`] on a miss and dropped, never patched, when the
//! underlying rows change. Every eviction bumps a generation counter; a load
//! that started before an eviction does not store its result, so a slow
//! reader cannot put back data the writer just invalidated.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use super::model::{Account, AccountExternalId, AccountId};
use crate::error::AuthResult;
use crate::storage::AccountStorage;

/// Name of the by-id cache.
pub const ACCOUNTS_CACHE: &str = "accounts";

/// Name of the by-email cache.
pub const ACCOUNTS_BY_EMAIL_CACHE: &str = "accounts_byemail";

/// An account together with all of its external identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    /// The account row.
    pub account: Account,
    /// Every external identity bound to the account.
    pub external_ids: Vec<AccountExternalId>,
}

impl AccountState {
    /// The account id.
    #[must_use]
    pub fn id(&self) -> AccountId {
        self.account.id
    }

    /// Email addresses recorded on any of the account's identities.
    #[must_use]
    pub fn emails(&self) -> BTreeSet<&str> {
        self.external_ids
            .iter()
            .filter_map(|e| e.email_address.as_deref())
            .collect()
    }
}

struct Entries<K, V> {
    map: RwLock<HashMap<K, V>>,
    generation: AtomicU64,
}

impl<K: Eq + Hash, V: Clone> Entries<K, V> {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    async fn get(&self, key: &K) -> Option<V> {
        self.map.read().await.get(key).cloned()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Stores `value` unless an eviction happened since `generation` was read.
    async fn insert_if_current(&self, key: K, value: V, generation: u64) -> bool {
        let mut map = self.map.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        map.insert(key, value);
        true
    }

    async fn evict(&self, key: &K) {
        let mut map = self.map.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        map.remove(key);
    }

    async fn clear(&self) {
        let mut map = self.map.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        map.clear();
    }

    async fn contains(&self, key: &K) -> bool {
        self.map.read().await.contains_key(key)
    }

    async fn len(&self) -> usize {
        self.map.read().await.len()
    }
}

/// Account-by-id cache.
pub struct AccountCache {
    storage: Arc<dyn AccountStorage>,
    entries: Entries<AccountId, Arc<AccountState>>,
}

impl AccountCache {
    /// Creates an empty cache backed by `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn AccountStorage>) -> Self {
        Self {
            storage,
            entries: Entries::new(),
        }
    }

    /// Returns the account state, loading it on a miss.
    ///
    /// Missing accounts are not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn get(&self, id: AccountId) -> AuthResult<Option<Arc<AccountState>>> {
        if let Some(state) = self.entries.get(&id).await {
            tracing::trace!(account_id = %id, "Account cache hit");
            return Ok(Some(state));
        }

        let generation = self.entries.generation();
        let Some(account) = self.storage.find_account(id).await? else {
            return Ok(None);
        };
        let external_ids = self.storage.external_ids_by_account(id).await?;
        let state = Arc::new(AccountState {
            account,
            external_ids,
        });

        if !self
            .entries
            .insert_if_current(id, Arc::clone(&state), generation)
            .await
        {
            tracing::trace!(account_id = %id, "Discarding account load raced by eviction");
        }
        Ok(Some(state))
    }

    /// Drops the entry for `id`. Idempotent.
    pub async fn evict(&self, id: AccountId) {
        self.entries.evict(&id).await;
    }

    /// Returns `true` if `id` is currently cached.
    pub async fn contains(&self, id: AccountId) -> bool {
        self.entries.contains(&id).await
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.clear().await;
    }

    /// Number of cached accounts.
    pub async fn len(&self) -> usize {
        self.entries.len().await
    }

    /// Returns `true` if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Email-to-accounts cache.
pub struct AccountByEmailCache {
    storage: Arc<dyn AccountStorage>,
    entries: Entries<String, Arc<BTreeSet<AccountId>>>,
}

impl AccountByEmailCache {
    /// Creates an empty cache backed by `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn AccountStorage>) -> Self {
        Self {
            storage,
            entries: Entries::new(),
        }
    }

    /// Returns the accounts using `email`, loading them on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn get(&self, email: &str) -> AuthResult<Arc<BTreeSet<AccountId>>> {
        let key = email.to_string();
        if let Some(ids) = self.entries.get(&key).await {
            return Ok(ids);
        }

        let generation = self.entries.generation();
        let ids: BTreeSet<AccountId> = self
            .storage
            .accounts_by_email(email)
            .await?
            .into_iter()
            .collect();
        let ids = Arc::new(ids);

        self.entries
            .insert_if_current(key, Arc::clone(&ids), generation)
            .await;
        Ok(ids)
    }

    /// Drops the entry for `email`. Idempotent.
    pub async fn evict(&self, email: &str) {
        self.entries.evict(&email.to_string()).await;
    }

    /// Returns `true` if `email` is currently cached.
    pub async fn contains(&self, email: &str) -> bool {
        self.entries.contains(&email.to_string()).await
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.clear().await;
    }

    /// Number of cached addresses.
    pub async fn len(&self) -> usize {
        self.entries.len().await
    }

    /// Returns `true` if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Keeps the derived account caches coherent with external identity writes.
///
/// Callers invoke these hooks after the store write has committed.
pub struct AccountCaches {
    by_id: AccountCache,
    by_email: AccountByEmailCache,
}

impl AccountCaches {
    /// Creates both caches over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn AccountStorage>) -> Self {
        Self {
            by_id: AccountCache::new(Arc::clone(&storage)),
            by_email: AccountByEmailCache::new(storage),
        }
    }

    /// The account-by-id cache.
    #[must_use]
    pub fn by_id(&self) -> &AccountCache {
        &self.by_id
    }

    /// The account-by-email cache.
    #[must_use]
    pub fn by_email(&self) -> &AccountByEmailCache {
        &self.by_email
    }

    /// A new external identity (and possibly a new account) was stored.
    pub async fn external_id_created(&self, account_id: AccountId, email: Option<&str>) {
        if let Some(email) = email {
            self.by_email.evict(email).await;
        }
        self.by_id.evict(account_id).await;
        tracing::debug!(account_id = %account_id, "Evicted caches after identity creation");
    }

    /// The email recorded on one of the account's identities changed.
    pub async fn email_changed(
        &self,
        account_id: AccountId,
        old_email: Option<&str>,
        new_email: Option<&str>,
    ) {
        for email in [old_email, new_email].into_iter().flatten() {
            self.by_email.evict(email).await;
        }
        self.by_id.evict(account_id).await;
        tracing::debug!(account_id = %account_id, "Evicted caches after email change");
    }

    /// Drops every entry of both caches.
    pub async fn clear(&self) {
        self.by_id.clear().await;
        self.by_email.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::model::ExternalIdKey;
    use crate::storage::InMemoryAccountStorage;

    async fn seeded() -> (Arc<InMemoryAccountStorage>, AccountCaches) {
        let storage = Arc::new(InMemoryAccountStorage::new());
        let account = Account::new(AccountId(1)).with_preferred_email(Some("a@example.com".into()));
        let ext = AccountExternalId::new(ExternalIdKey::new(AccountId(1), "https://idp/a"))
            .with_email(Some("a@example.com".into()));
        storage.create_account(&account, &ext).await.unwrap();
        let caches = AccountCaches::new(storage.clone());
        (storage, caches)
    }

    #[tokio::test]
    async fn test_by_id_loads_and_caches() {
        let (_storage, caches) = seeded().await;

        let state = caches.by_id().get(AccountId(1)).await.unwrap().unwrap();
        assert_eq!(state.id(), AccountId(1));
        assert_eq!(state.external_ids.len(), 1);
        assert!(state.emails().contains("a@example.com"));
        assert!(caches.by_id().contains(AccountId(1)).await);

        assert!(caches.by_id().get(AccountId(99)).await.unwrap().is_none());
        assert_eq!(caches.by_id().len().await, 1);
    }

    #[tokio::test]
    async fn test_by_email_loads_and_evicts() {
        let (_storage, caches) = seeded().await;

        let ids = caches.by_email().get("a@example.com").await.unwrap();
        assert!(ids.contains(&AccountId(1)));
        assert!(caches.by_email().contains("a@example.com").await);

        caches.by_email().evict("a@example.com").await;
        caches.by_email().evict("a@example.com").await;
        assert!(caches.by_email().is_empty().await);
    }

    #[tokio::test]
    async fn test_email_changed_evicts_both_addresses() {
        let (_storage, caches) = seeded().await;
        caches.by_id().get(AccountId(1)).await.unwrap();
        caches.by_email().get("a@example.com").await.unwrap();
        caches.by_email().get("b@example.com").await.unwrap();

        caches
            .email_changed(AccountId(1), Some("a@example.com"), Some("b@example.com"))
            .await;

        assert!(!caches.by_email().contains("a@example.com").await);
        assert!(!caches.by_email().contains("b@example.com").await);
        assert!(!caches.by_id().contains(AccountId(1)).await);
    }

    #[tokio::test]
    async fn test_stale_load_is_not_stored() {
        let (_storage, caches) = seeded().await;
        let entries = &caches.by_email().entries;

        let generation = entries.generation();
        caches.by_email().evict("a@example.com").await;

        let stored = entries
            .insert_if_current(
                "a@example.com".to_string(),
                Arc::new(BTreeSet::new()),
                generation,
            )
            .await;
        assert!(!stored);
        assert!(!caches.by_email().contains("a@example.com").await);
    }

    #[tokio::test]
    async fn test_clear() {
        let (_storage, caches) = seeded().await;
        caches.by_id().get(AccountId(1)).await.unwrap();
        caches.by_email().get("a@example.com").await.unwrap();

        caches.clear().await;
        assert!(caches.by_id().is_empty().await);
        assert!(caches.by_email().is_empty().await);
    }
}
