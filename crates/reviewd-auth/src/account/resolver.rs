//! Identity resolution.
//!
//! Maps a verified external identifier onto an internal account. The
//! external identity table is the only source of truth: the derived caches
//! are evicted after every committed write, and the store's uniqueness
//! constraint on the external identifier decides concurrent account
//! creation for the same identity.

use std::sync::Arc;

use super::cache::AccountCaches;
use super::model::{
    Account, AccountExternalId, AccountId, ExternalIdKey, is_google_identifier,
    legacy_google_identifier,
};
use crate::error::{AuthError, AuthResult};
use crate::openid::mode::SignInMode;
use crate::storage::AccountStorage;
use crate::user::IdentifiedUser;

/// An identity asserted by the provider and checked by the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// The verified external identifier.
    pub identifier: String,
    /// Display name supplied by the provider, if any.
    pub full_name: Option<String>,
    /// Email address supplied by the provider, if any.
    pub email: Option<String>,
}

impl VerifiedIdentity {
    /// Creates an identity without profile attributes.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            full_name: None,
            email: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_full_name(mut self, full_name: Option<String>) -> Self {
        self.full_name = full_name;
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved account.
    pub account: Account,
    /// `true` if the account was created by this resolution.
    pub is_new: bool,
}

impl Resolution {
    /// The resolved account id.
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.account.id
    }
}

/// Resolves verified identities to accounts.
pub struct IdentityResolver {
    storage: Arc<dyn AccountStorage>,
    caches: Arc<AccountCaches>,
    allow_google_account_upgrade: bool,
}

impl IdentityResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        storage: Arc<dyn AccountStorage>,
        caches: Arc<AccountCaches>,
        allow_google_account_upgrade: bool,
    ) -> Self {
        Self {
            storage,
            caches,
            allow_google_account_upgrade,
        }
    }

    /// Resolves `identity` under `mode`.
    ///
    /// Sign-in and register find or create the account owning the identity.
    /// Link-identity attaches the identity to `caller`'s account.
    ///
    /// # Errors
    ///
    /// - `Consistency` if the store holds more than one row for the identifier
    ///   or a row points at a missing account
    /// - `Unauthorized` if linking without a signed-in caller
    /// - `Conflict` if linking an identifier owned by another account
    /// - `Storage` if the store fails
    pub async fn resolve(
        &self,
        mode: SignInMode,
        identity: &VerifiedIdentity,
        caller: Option<&IdentifiedUser>,
    ) -> AuthResult<Resolution> {
        match mode {
            SignInMode::SignIn | SignInMode::Register => self.open_account(identity).await,
            SignInMode::LinkIdentity => {
                let caller = caller.ok_or_else(|| {
                    AuthError::unauthorized("Linking an identity requires a signed-in user")
                })?;
                self.link(caller.id(), identity).await
            }
        }
    }

    async fn open_account(&self, identity: &VerifiedIdentity) -> AuthResult<Resolution> {
        if let Some(existing) = self.lookup(&identity.identifier).await? {
            return self.refresh_existing(existing, identity).await;
        }

        if self.allow_google_account_upgrade
            && is_google_identifier(&identity.identifier)
            && let Some(email) = identity.email.as_deref()
            && let Some(legacy) = self.lookup_google_account(email).await?
        {
            return self.upgrade_google_account(legacy, identity).await;
        }

        self.create(identity).await
    }

    /// Finds the single row for `identifier`.
    async fn lookup(&self, identifier: &str) -> AuthResult<Option<AccountExternalId>> {
        let mut rows = self.storage.external_ids_by_external(identifier).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => {
                let accounts: Vec<String> =
                    rows.iter().map(|r| r.account_id().to_string()).collect();
                tracing::error!(
                    identifier = %identifier,
                    rows = n,
                    accounts = %accounts.join(","),
                    "External identifier is bound to more than one account"
                );
                Err(AuthError::consistency(format!(
                    "More than one account matches: {identifier}"
                )))
            }
        }
    }

    /// Finds the unique legacy `Google Account <email>` row.
    async fn lookup_google_account(&self, email: &str) -> AuthResult<Option<AccountExternalId>> {
        let legacy = legacy_google_identifier(email);
        let mut matches: Vec<AccountExternalId> = self
            .storage
            .external_ids_by_email(email)
            .await?
            .into_iter()
            .filter(|row| row.external_id() == legacy)
            .collect();

        if matches.len() == 1 {
            return Ok(matches.pop());
        }
        if matches.len() > 1 {
            tracing::warn!(
                email = %email,
                matches = matches.len(),
                "Ambiguous legacy Google accounts, not upgrading"
            );
        }
        Ok(None)
    }

    async fn upgrade_google_account(
        &self,
        legacy: AccountExternalId,
        identity: &VerifiedIdentity,
    ) -> AuthResult<Resolution> {
        let account_id = legacy.account_id();
        let row = AccountExternalId::new(ExternalIdKey::new(account_id, &identity.identifier));

        match self.storage.insert_external_id(&row).await {
            Ok(()) => {
                self.caches.external_id_created(account_id, None).await;
                tracing::info!(
                    account_id = %account_id,
                    identifier = %identity.identifier,
                    "Attached Google OpenID identity to legacy account"
                );
                self.refresh_existing(row, identity).await
            }
            Err(e) if e.is_duplicate_key() => self.continue_after_duplicate(identity).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Records a sign-in on an existing row.
    async fn refresh_existing(
        &self,
        mut row: AccountExternalId,
        identity: &VerifiedIdentity,
    ) -> AuthResult<Resolution> {
        row.touch();
        let previous_email = row.update_email(identity.email.as_deref());
        self.storage.update_external_id(&row).await?;

        let account_id = row.account_id();
        match previous_email {
            Some(old) => {
                tracing::info!(account_id = %account_id, "Recorded new email for external identity");
                self.caches
                    .email_changed(account_id, old.as_deref(), row.email_address.as_deref())
                    .await;
            }
            None => self.caches.by_id().evict(account_id).await,
        }

        let account = self.load_account(account_id).await?;
        Ok(Resolution {
            account,
            is_new: false,
        })
    }

    async fn create(&self, identity: &VerifiedIdentity) -> AuthResult<Resolution> {
        let account_id = self.storage.next_account_id().await?;
        let account = Account::new(account_id)
            .with_full_name(identity.full_name.clone())
            .with_preferred_email(identity.email.clone());
        let mut row = AccountExternalId::new(ExternalIdKey::new(account_id, &identity.identifier))
            .with_email(identity.email.clone());
        row.touch();

        match self.storage.create_account(&account, &row).await {
            Ok(()) => {
                self.caches
                    .external_id_created(account_id, identity.email.as_deref())
                    .await;
                tracing::info!(
                    account_id = %account_id,
                    identifier = %identity.identifier,
                    "Created account for new external identity"
                );
                Ok(Resolution {
                    account,
                    is_new: true,
                })
            }
            Err(e) if e.is_duplicate_key() => self.continue_after_duplicate(identity).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Another request stored the identity first; use its row.
    async fn continue_after_duplicate(&self, identity: &VerifiedIdentity) -> AuthResult<Resolution> {
        tracing::debug!(
            identifier = %identity.identifier,
            "Lost account creation race, re-reading external identity"
        );
        let existing = self.lookup(&identity.identifier).await?.ok_or_else(|| {
            AuthError::storage(format!(
                "Duplicate key on insert but no row found for {}",
                identity.identifier
            ))
        })?;
        self.refresh_existing(existing, identity).await
    }

    async fn link(
        &self,
        account_id: AccountId,
        identity: &VerifiedIdentity,
    ) -> AuthResult<Resolution> {
        let key = ExternalIdKey::new(account_id, &identity.identifier);
        if let Some(existing) = self.storage.find_external_id(&key).await? {
            return self.refresh_existing(existing, identity).await;
        }

        if let Some(other) = self.lookup(&identity.identifier).await? {
            return Err(AuthError::conflict(format!(
                "{} is already linked to account {}",
                identity.identifier,
                other.account_id()
            )));
        }

        let mut row = AccountExternalId::new(key).with_email(identity.email.clone());
        row.touch();
        match self.storage.insert_external_id(&row).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate_key() => {
                return Err(AuthError::conflict(format!(
                    "{} was linked to another account concurrently",
                    identity.identifier
                )));
            }
            Err(e) => return Err(e.into()),
        }

        self.caches
            .external_id_created(account_id, identity.email.as_deref())
            .await;
        tracing::info!(
            account_id = %account_id,
            identifier = %identity.identifier,
            "Linked external identity"
        );

        let account = self.load_account(account_id).await?;
        Ok(Resolution {
            account,
            is_new: false,
        })
    }

    async fn load_account(&self, account_id: AccountId) -> AuthResult<Account> {
        let state = self.caches.by_id().get(account_id).await?.ok_or_else(|| {
            tracing::error!(account_id = %account_id, "External identity references missing account");
            AuthError::consistency(format!("Account {account_id} does not exist"))
        })?;
        Ok(state.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use super::*;
    use crate::config::GroupConfig;
    use crate::storage::{InMemoryAccountStorage, StorageResult};
    use crate::user::AccessPath;

    const ALICE: &str = "https://idp.example/alice";
    const GOOGLE_ID: &str = "https://www.google.com/accounts/o8/id?id=AItOawkBob";

    fn setup(
        allow_google_account_upgrade: bool,
    ) -> (Arc<InMemoryAccountStorage>, Arc<AccountCaches>, IdentityResolver) {
        let storage = Arc::new(InMemoryAccountStorage::new());
        let caches = Arc::new(AccountCaches::new(storage.clone()));
        let resolver = IdentityResolver::new(
            storage.clone(),
            Arc::clone(&caches),
            allow_google_account_upgrade,
        );
        (storage, caches, resolver)
    }

    fn caller(account_id: AccountId) -> IdentifiedUser {
        IdentifiedUser::new(account_id, AccessPath::WebUi, &GroupConfig::default(), [])
    }

    async fn seed_account(storage: &InMemoryAccountStorage, id: i32, external: &str, email: &str) {
        let account = Account::new(AccountId(id)).with_preferred_email(Some(email.to_string()));
        let row = AccountExternalId::new(ExternalIdKey::new(AccountId(id), external))
            .with_email(Some(email.to_string()));
        storage.create_account(&account, &row).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_creates_account() {
        let (storage, caches, resolver) = setup(false);
        caches.by_email().get("alice@example.com").await.unwrap();

        let identity = VerifiedIdentity::new(ALICE)
            .with_full_name(Some("Alice A".into()))
            .with_email(Some("alice@example.com".into()));
        let resolution = resolver
            .resolve(SignInMode::Register, &identity, None)
            .await
            .unwrap();

        assert!(resolution.is_new);
        assert_eq!(resolution.account.full_name.as_deref(), Some("Alice A"));
        assert_eq!(storage.account_count().await, 1);
        assert_eq!(storage.external_id_count().await, 1);
        assert!(!caches.by_email().contains("alice@example.com").await);
    }

    #[tokio::test]
    async fn test_sign_in_existing_account() {
        let (storage, _caches, resolver) = setup(false);
        let identity = VerifiedIdentity::new(ALICE);

        let first = resolver
            .resolve(SignInMode::Register, &identity, None)
            .await
            .unwrap();
        let second = resolver
            .resolve(SignInMode::SignIn, &identity, None)
            .await
            .unwrap();

        assert!(!second.is_new);
        assert_eq!(first.account_id(), second.account_id());
        assert_eq!(storage.account_count().await, 1);

        let row = storage
            .find_external_id(&ExternalIdKey::new(first.account_id(), ALICE))
            .await
            .unwrap()
            .unwrap();
        assert!(row.last_used_on.is_some());
    }

    #[tokio::test]
    async fn test_email_change_evicts_old_and_new() {
        let (storage, caches, resolver) = setup(false);
        seed_account(&storage, 10, ALICE, "old@example.com").await;
        caches.by_email().get("old@example.com").await.unwrap();
        caches.by_email().get("new@example.com").await.unwrap();
        caches.by_id().get(AccountId(10)).await.unwrap();

        let identity = VerifiedIdentity::new(ALICE).with_email(Some("new@example.com".into()));
        let resolution = resolver
            .resolve(SignInMode::SignIn, &identity, None)
            .await
            .unwrap();
        assert_eq!(resolution.account_id(), AccountId(10));

        let row = storage
            .find_external_id(&ExternalIdKey::new(AccountId(10), ALICE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.email_address.as_deref(), Some("new@example.com"));
        assert!(!caches.by_email().contains("old@example.com").await);
        assert!(!caches.by_email().contains("new@example.com").await);
    }

    #[tokio::test]
    async fn test_duplicate_rows_are_a_consistency_error() {
        let (storage, _caches, resolver) = setup(false);
        for id in [1, 2] {
            storage
                .insert_external_id_unchecked(
                    &AccountExternalId::new(ExternalIdKey::new(AccountId(id), ALICE))
                        .with_email(Some("a@example.com".into())),
                )
                .await;
        }

        let identity = VerifiedIdentity::new(ALICE).with_email(Some("b@example.com".into()));
        let err = resolver
            .resolve(SignInMode::SignIn, &identity, None)
            .await
            .unwrap_err();
        assert!(err.is_fatal());

        // Nothing was touched.
        assert_eq!(storage.account_count().await, 0);
        let rows = storage.external_ids_by_external(ALICE).await.unwrap();
        assert!(rows.iter().all(|r| r.last_used_on.is_none()));
        assert!(
            rows.iter()
                .all(|r| r.email_address.as_deref() == Some("a@example.com"))
        );
    }

    #[tokio::test]
    async fn test_row_without_account_is_a_consistency_error() {
        let (storage, _caches, resolver) = setup(false);
        storage
            .insert_external_id(&AccountExternalId::new(ExternalIdKey::new(
                AccountId(5),
                ALICE,
            )))
            .await
            .unwrap();

        let err = resolver
            .resolve(SignInMode::SignIn, &VerifiedIdentity::new(ALICE), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Consistency { .. }));
    }

    #[tokio::test]
    async fn test_storage_failure() {
        let (storage, _caches, resolver) = setup(false);
        storage.set_unavailable(true);

        let err = resolver
            .resolve(SignInMode::SignIn, &VerifiedIdentity::new(ALICE), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_google_upgrade_single_match() {
        let (storage, _caches, resolver) = setup(true);
        seed_account(&storage, 20, "Google Account bob@gmail.com", "bob@gmail.com").await;

        let identity = VerifiedIdentity::new(GOOGLE_ID).with_email(Some("bob@gmail.com".into()));
        let resolution = resolver
            .resolve(SignInMode::SignIn, &identity, None)
            .await
            .unwrap();

        assert!(!resolution.is_new);
        assert_eq!(resolution.account_id(), AccountId(20));
        assert_eq!(storage.account_count().await, 1);

        let row = storage
            .find_external_id(&ExternalIdKey::new(AccountId(20), GOOGLE_ID))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.email_address.as_deref(), Some("bob@gmail.com"));
    }

    #[tokio::test]
    async fn test_google_upgrade_no_match_creates_account() {
        let (storage, _caches, resolver) = setup(true);

        let identity = VerifiedIdentity::new(GOOGLE_ID).with_email(Some("bob@gmail.com".into()));
        let resolution = resolver
            .resolve(SignInMode::SignIn, &identity, None)
            .await
            .unwrap();

        assert!(resolution.is_new);
        assert_eq!(storage.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_google_upgrade_ambiguous_creates_account() {
        let (storage, _caches, resolver) = setup(true);
        seed_account(&storage, 20, "Google Account bob@gmail.com", "bob@gmail.com").await;
        storage
            .insert_account(&Account::new(AccountId(21)))
            .await
            .unwrap();
        storage
            .insert_external_id_unchecked(
                &AccountExternalId::new(ExternalIdKey::new(
                    AccountId(21),
                    "Google Account bob@gmail.com",
                ))
                .with_email(Some("bob@gmail.com".into())),
            )
            .await;

        let identity = VerifiedIdentity::new(GOOGLE_ID).with_email(Some("bob@gmail.com".into()));
        let resolution = resolver
            .resolve(SignInMode::SignIn, &identity, None)
            .await
            .unwrap();

        assert!(resolution.is_new);
        assert_eq!(storage.account_count().await, 3);
    }

    #[tokio::test]
    async fn test_google_upgrade_disabled() {
        let (storage, _caches, resolver) = setup(false);
        seed_account(&storage, 20, "Google Account bob@gmail.com", "bob@gmail.com").await;

        let identity = VerifiedIdentity::new(GOOGLE_ID).with_email(Some("bob@gmail.com".into()));
        let resolution = resolver
            .resolve(SignInMode::SignIn, &identity, None)
            .await
            .unwrap();
        assert!(resolution.is_new);
    }

    #[tokio::test]
    async fn test_link_requires_caller() {
        let (_storage, _caches, resolver) = setup(false);
        let err = resolver
            .resolve(SignInMode::LinkIdentity, &VerifiedIdentity::new(ALICE), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_link_new_identity() {
        let (storage, caches, resolver) = setup(false);
        seed_account(&storage, 30, "https://idp.example/carol", "carol@example.com").await;
        let before = caches.by_id().get(AccountId(30)).await.unwrap().unwrap();
        caches.by_email().get("c@other.example").await.unwrap();
        caches.by_email().get("carol@example.com").await.unwrap();

        let identity =
            VerifiedIdentity::new("https://other.example/carol").with_email(Some("c@other.example".into()));
        let resolution = resolver
            .resolve(
                SignInMode::LinkIdentity,
                &identity,
                Some(&caller(AccountId(30))),
            )
            .await
            .unwrap();

        assert!(!resolution.is_new);
        assert_eq!(resolution.account_id(), AccountId(30));
        let state = caches.by_id().get(AccountId(30)).await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&before, &state));
        assert_eq!(state.external_ids.len(), 2);

        assert!(!caches.by_email().contains("c@other.example").await);
        assert!(caches.by_email().contains("carol@example.com").await);
        let ids = caches.by_email().get("c@other.example").await.unwrap();
        assert!(ids.contains(&AccountId(30)));
    }

    #[tokio::test]
    async fn test_link_identity_of_other_account_conflicts() {
        let (storage, _caches, resolver) = setup(false);
        seed_account(&storage, 30, ALICE, "alice@example.com").await;
        seed_account(&storage, 31, "https://idp.example/dave", "dave@example.com").await;

        let err = resolver
            .resolve(
                SignInMode::LinkIdentity,
                &VerifiedIdentity::new(ALICE),
                Some(&caller(AccountId(31))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_link_existing_identity_refreshes() {
        let (storage, caches, resolver) = setup(false);
        seed_account(&storage, 30, ALICE, "alice@example.com").await;
        let before = caches.by_id().get(AccountId(30)).await.unwrap().unwrap();
        caches.by_email().get("alice@example.com").await.unwrap();
        caches.by_email().get("alice@new.example").await.unwrap();
        caches.by_email().get("bystander@example.com").await.unwrap();

        let identity = VerifiedIdentity::new(ALICE).with_email(Some("alice@new.example".into()));
        resolver
            .resolve(
                SignInMode::LinkIdentity,
                &identity,
                Some(&caller(AccountId(30))),
            )
            .await
            .unwrap();

        let row = storage
            .find_external_id(&ExternalIdKey::new(AccountId(30), ALICE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.email_address.as_deref(), Some("alice@new.example"));
        assert!(row.last_used_on.is_some());

        assert!(!caches.by_email().contains("alice@example.com").await);
        assert!(!caches.by_email().contains("alice@new.example").await);
        assert!(caches.by_email().contains("bystander@example.com").await);

        let after = caches.by_id().get(AccountId(30)).await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.emails().contains("alice@new.example"));
    }

    /// Holds the first two identifier lookups until both have happened, so
    /// both resolutions decide to create before either inserts.
    struct RacingStorage {
        inner: InMemoryAccountStorage,
        barrier: Barrier,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl AccountStorage for RacingStorage {
        async fn next_account_id(&self) -> StorageResult<AccountId> {
            self.inner.next_account_id().await
        }

        async fn create_account(
            &self,
            account: &Account,
            external_id: &AccountExternalId,
        ) -> StorageResult<()> {
            self.inner.create_account(account, external_id).await
        }

        async fn find_account(&self, id: AccountId) -> StorageResult<Option<Account>> {
            self.inner.find_account(id).await
        }

        async fn insert_external_id(&self, external_id: &AccountExternalId) -> StorageResult<()> {
            self.inner.insert_external_id(external_id).await
        }

        async fn update_external_id(&self, external_id: &AccountExternalId) -> StorageResult<()> {
            self.inner.update_external_id(external_id).await
        }

        async fn find_external_id(
            &self,
            key: &ExternalIdKey,
        ) -> StorageResult<Option<AccountExternalId>> {
            self.inner.find_external_id(key).await
        }

        async fn external_ids_by_external(
            &self,
            external_id: &str,
        ) -> StorageResult<Vec<AccountExternalId>> {
            let rows = self.inner.external_ids_by_external(external_id).await;
            if self.lookups.fetch_add(1, Ordering::SeqCst) < 2 {
                self.barrier.wait().await;
            }
            rows
        }

        async fn external_ids_by_email(
            &self,
            email: &str,
        ) -> StorageResult<Vec<AccountExternalId>> {
            self.inner.external_ids_by_email(email).await
        }

        async fn external_ids_by_account(
            &self,
            account_id: AccountId,
        ) -> StorageResult<Vec<AccountExternalId>> {
            self.inner.external_ids_by_account(account_id).await
        }

        async fn accounts_by_email(&self, email: &str) -> StorageResult<Vec<AccountId>> {
            self.inner.accounts_by_email(email).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_account() {
        let storage = Arc::new(RacingStorage {
            inner: InMemoryAccountStorage::new(),
            barrier: Barrier::new(2),
            lookups: AtomicUsize::new(0),
        });
        let caches = Arc::new(AccountCaches::new(storage.clone()));
        let resolver = Arc::new(IdentityResolver::new(storage.clone(), caches, false));
        let identity = VerifiedIdentity::new(ALICE).with_email(Some("alice@example.com".into()));

        let a = {
            let resolver = Arc::clone(&resolver);
            let identity = identity.clone();
            tokio::spawn(async move { resolver.resolve(SignInMode::Register, &identity, None).await })
        };
        let b = {
            let resolver = Arc::clone(&resolver);
            let identity = identity.clone();
            tokio::spawn(async move { resolver.resolve(SignInMode::Register, &identity, None).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a.account_id(), b.account_id());
        assert_eq!(usize::from(a.is_new) + usize::from(b.is_new), 1);
        assert_eq!(storage.inner.account_count().await, 1);
        assert_eq!(storage.inner.external_id_count().await, 1);
    }
}
