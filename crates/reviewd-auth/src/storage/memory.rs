//! In-memory account storage.
//!
//! All tables live behind a single lock so that multi-row writes are atomic
//! and the external id uniqueness check and insert happen in one critical
//! section.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AccountStorage, StorageError, StorageResult};
use crate::account::{Account, AccountExternalId, AccountId, ExternalIdKey};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    external_ids: BTreeMap<ExternalIdKey, AccountExternalId>,
}

impl Tables {
    fn external_id_taken(&self, external_id: &str) -> bool {
        self.external_ids
            .keys()
            .any(|k| k.external_id == external_id)
    }
}

/// Process-local [`AccountStorage`] implementation.
#[derive(Debug)]
pub struct InMemoryAccountStorage {
    tables: RwLock<Tables>,
    next_id: AtomicI32,
    unavailable: AtomicBool,
}

impl Default for InMemoryAccountStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAccountStorage {
    /// Creates an empty store. Account ids start at 1000000.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicI32::new(1_000_000),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent operation fail with
    /// [`StorageError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Inserts an account without any external identity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateKey`] if the id is taken.
    pub async fn insert_account(&self, account: &Account) -> StorageResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&account.id) {
            return Err(StorageError::DuplicateKey(format!("account {}", account.id)));
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(())
    }

    /// Inserts an external identity bypassing the uniqueness constraint.
    ///
    /// Only meant for reproducing corrupted data, e.g. rows imported before
    /// the constraint existed.
    pub async fn insert_external_id_unchecked(&self, external_id: &AccountExternalId) {
        let mut tables = self.tables.write().await;
        tables
            .external_ids
            .insert(external_id.key.clone(), external_id.clone());
    }

    /// Number of stored accounts.
    pub async fn account_count(&self) -> usize {
        self.tables.read().await.accounts.len()
    }

    /// Number of stored external identities.
    pub async fn external_id_count(&self) -> usize {
        self.tables.read().await.external_ids.len()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStorage for InMemoryAccountStorage {
    async fn next_account_id(&self) -> StorageResult<AccountId> {
        self.check_available()?;
        Ok(AccountId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn create_account(
        &self,
        account: &Account,
        external_id: &AccountExternalId,
    ) -> StorageResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        if tables.accounts.contains_key(&account.id) {
            return Err(StorageError::DuplicateKey(format!("account {}", account.id)));
        }
        if tables.external_id_taken(external_id.external_id()) {
            return Err(StorageError::DuplicateKey(external_id.external_id().to_string()));
        }

        tables.accounts.insert(account.id, account.clone());
        tables
            .external_ids
            .insert(external_id.key.clone(), external_id.clone());
        Ok(())
    }

    async fn find_account(&self, id: AccountId) -> StorageResult<Option<Account>> {
        self.check_available()?;
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn insert_external_id(&self, external_id: &AccountExternalId) -> StorageResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables.external_id_taken(external_id.external_id()) {
            return Err(StorageError::DuplicateKey(external_id.external_id().to_string()));
        }
        tables
            .external_ids
            .insert(external_id.key.clone(), external_id.clone());
        Ok(())
    }

    async fn update_external_id(&self, external_id: &AccountExternalId) -> StorageResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        match tables.external_ids.get_mut(&external_id.key) {
            Some(row) => {
                *row = external_id.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "{} for account {}",
                external_id.external_id(),
                external_id.account_id()
            ))),
        }
    }

    async fn find_external_id(
        &self,
        key: &ExternalIdKey,
    ) -> StorageResult<Option<AccountExternalId>> {
        self.check_available()?;
        Ok(self.tables.read().await.external_ids.get(key).cloned())
    }

    async fn external_ids_by_external(
        &self,
        external_id: &str,
    ) -> StorageResult<Vec<AccountExternalId>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .external_ids
            .values()
            .filter(|e| e.external_id() == external_id)
            .cloned()
            .collect())
    }

    async fn external_ids_by_email(&self, email: &str) -> StorageResult<Vec<AccountExternalId>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .external_ids
            .values()
            .filter(|e| e.email_address.as_deref() == Some(email))
            .cloned()
            .collect())
    }

    async fn external_ids_by_account(
        &self,
        account_id: AccountId,
    ) -> StorageResult<Vec<AccountExternalId>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .external_ids
            .values()
            .filter(|e| e.account_id() == account_id)
            .cloned()
            .collect())
    }

    async fn accounts_by_email(&self, email: &str) -> StorageResult<Vec<AccountId>> {
        self.check_available()?;
        let tables = self.tables.read().await;

        let mut ids: BTreeSet<AccountId> = tables
            .accounts
            .values()
            .filter(|a| a.preferred_email.as_deref() == Some(email))
            .map(|a| a.id)
            .collect();
        ids.extend(
            tables
                .external_ids
                .values()
                .filter(|e| e.email_address.as_deref() == Some(email))
                .map(AccountExternalId::account_id),
        );

        Ok(ids.into_iter().collect())
    }
}
