//! Account storage interface.
//!
//! The account store is the single source of truth for accounts and their
//! external identities. Implementations must enforce uniqueness of
//! [`ExternalIdKey::external_id`](crate::account::ExternalIdKey) across the
//! whole store: this constraint is what keeps two concurrent sign-ins of a
//! never-seen identity from creating two accounts.
//!
//! # Implementations
//!
//! - [`memory::InMemoryAccountStorage`] - process-local store for tests and
//!   single-node deployments

pub mod memory;

use async_trait::async_trait;

use crate::account::{Account, AccountExternalId, AccountId, ExternalIdKey};

pub use memory::InMemoryAccountStorage;

/// Errors reported by an [`AccountStorage`] backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// A unique constraint rejected the write.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// An update targeted a row that does not exist.
    #[error("Row not found: {0}")]
    NotFound(String),

    /// The backend could not be reached or failed transiently.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns `true` if the write lost a uniqueness race.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage trait for accounts and external identities.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Allocates the next account id.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence cannot be advanced.
    async fn next_account_id(&self) -> StorageResult<AccountId>;

    /// Inserts a new account together with its first external identity.
    ///
    /// Both rows are written atomically: if the identity violates the
    /// external id uniqueness constraint, neither row is stored and
    /// [`StorageError::DuplicateKey`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if either row cannot be written.
    async fn create_account(
        &self,
        account: &Account,
        external_id: &AccountExternalId,
    ) -> StorageResult<()>;

    /// Finds an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_account(&self, id: AccountId) -> StorageResult<Option<Account>>;

    /// Inserts an external identity for an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateKey`] if the external identifier is
    /// already bound to any account.
    async fn insert_external_id(&self, external_id: &AccountExternalId) -> StorageResult<()>;

    /// Replaces the stored row with the same key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no row has this key.
    async fn update_external_id(&self, external_id: &AccountExternalId) -> StorageResult<()>;

    /// Finds an external identity by primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_external_id(&self, key: &ExternalIdKey)
    -> StorageResult<Option<AccountExternalId>>;

    /// Returns every row whose external identifier equals `external_id`.
    ///
    /// With the uniqueness constraint intact this is at most one row; callers
    /// must treat more than one as a consistency error rather than pick one.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn external_ids_by_external(
        &self,
        external_id: &str,
    ) -> StorageResult<Vec<AccountExternalId>>;

    /// Returns every row recording `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn external_ids_by_email(&self, email: &str) -> StorageResult<Vec<AccountExternalId>>;

    /// Returns every external identity of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn external_ids_by_account(
        &self,
        account_id: AccountId,
    ) -> StorageResult<Vec<AccountExternalId>>;

    /// Returns the accounts reachable from `email`, either as preferred email
    /// or through an external identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn accounts_by_email(&self, email: &str) -> StorageResult<Vec<AccountId>>;
}
