//! The OpenID sign-in service.
//!
//! [`OpenIdService`] owns the discovery cache, the account caches and the
//! components of the flow. It is constructed explicitly with its
//! configuration and collaborators; there is no global instance.

use std::sync::Arc;

use crate::account::cache::{ACCOUNTS_BY_EMAIL_CACHE, ACCOUNTS_CACHE};
use crate::account::{AccountCaches, AccountId, IdentityResolver};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::openid::callback::CallbackDispatcher;
use crate::openid::consumer::{CallbackParams, OpenIdConsumer};
use crate::openid::discovery::{DiscoveryCache, DiscoveryCacheConfig};
use crate::openid::request::{DiscoveryRequest, DiscoveryResult, RequestBuilder};
use crate::openid::response::{AttemptOutcome, CallbackContext, ResponseHandler};
use crate::storage::AccountStorage;
use crate::user::IdentifiedUser;

/// Name of the discovery cache.
pub const OPENID_CACHE: &str = "openid";

/// What the transport should do with the browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Establish a session for the account.
    SignIn {
        /// The signed-in account.
        account_id: AccountId,
        /// Keep the session across browser restarts.
        remember: bool,
    },
    /// Drop any existing session.
    SignOut,
    /// Leave the session as it is.
    Keep,
}

/// What the transport should do with the last-identifier cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastIdUpdate {
    /// Remember this identifier.
    Set(String),
    /// Forget the remembered identifier.
    Clear,
    /// Leave the cookie as it is.
    Keep,
}

/// Response to a provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    /// Redirect target.
    pub location: String,
    /// Session change to apply.
    pub session: SessionUpdate,
    /// Last-identifier cookie change to apply.
    pub last_id: LastIdUpdate,
}

/// Which caches to flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSelection {
    /// Every cache.
    All,
    /// The named caches.
    Named(Vec<String>),
}

/// Error returned when flushing a cache that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown cache: {0}")]
pub struct UnknownCacheError(pub String);

/// External identity sign-in service.
pub struct OpenIdService {
    config: AuthConfig,
    discovery: Arc<DiscoveryCache>,
    caches: Arc<AccountCaches>,
    requests: RequestBuilder,
    responses: ResponseHandler,
    resolver: IdentityResolver,
    dispatcher: CallbackDispatcher,
}

impl OpenIdService {
    /// Creates the service.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the configuration is invalid.
    pub fn new(
        config: AuthConfig,
        consumer: Arc<dyn OpenIdConsumer>,
        storage: Arc<dyn AccountStorage>,
    ) -> AuthResult<Self> {
        config.validate()?;
        let context_url = config.context_url()?;

        let discovery = Arc::new(DiscoveryCache::new(
            Arc::clone(&consumer),
            DiscoveryCacheConfig::new().with_ttl(config.openid.discovery_cache_ttl),
        ));
        let caches = Arc::new(AccountCaches::new(Arc::clone(&storage)));

        let requests = RequestBuilder::new(
            Arc::clone(&discovery),
            Arc::clone(&consumer),
            Arc::clone(&storage),
            context_url.clone(),
        );
        let responses = ResponseHandler::new(Arc::clone(&discovery), consumer, context_url.clone());
        let resolver = IdentityResolver::new(
            storage,
            Arc::clone(&caches),
            config.openid.allow_google_account_upgrade,
        );
        let dispatcher = CallbackDispatcher::new(context_url.clone());

        tracing::info!(
            context_url = %context_url,
            discovery_ttl = ?config.openid.discovery_cache_ttl,
            google_upgrade = config.openid.allow_google_account_upgrade,
            "OpenID service initialized"
        );

        Ok(Self {
            config,
            discovery,
            caches,
            requests,
            responses,
            resolver,
            dispatcher,
        })
    }

    /// The configuration the service was built with.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The account caches.
    #[must_use]
    pub fn caches(&self) -> &Arc<AccountCaches> {
        &self.caches
    }

    /// The discovery cache.
    #[must_use]
    pub fn discovery_cache(&self) -> &Arc<DiscoveryCache> {
        &self.discovery
    }

    /// Starts a sign-in.
    pub async fn discover(&self, request: &DiscoveryRequest) -> DiscoveryResult {
        self.requests.discover(request).await
    }

    /// Completes a sign-in from the provider callback.
    ///
    /// `caller` is the currently signed-in user, needed to link identities.
    pub async fn handle_callback(
        &self,
        params: &CallbackParams,
        caller: Option<&IdentifiedUser>,
    ) -> CallbackResponse {
        match self.responses.handle(params).await {
            AttemptOutcome::Succeeded { context, identity } => {
                match self.resolver.resolve(context.mode, &identity, caller).await {
                    Ok(resolution) => {
                        tracing::info!(
                            account_id = %resolution.account_id(),
                            mode = %context.mode,
                            is_new = resolution.is_new,
                            "OpenID sign-in succeeded"
                        );
                        let location = self.dispatcher.success(&context.token, resolution.is_new);
                        if context.mode.is_sign_in() {
                            CallbackResponse {
                                location,
                                session: SessionUpdate::SignIn {
                                    account_id: resolution.account_id(),
                                    remember: context.remember,
                                },
                                last_id: if context.remember {
                                    LastIdUpdate::Set(identity.identifier)
                                } else {
                                    LastIdUpdate::Clear
                                },
                            }
                        } else {
                            CallbackResponse {
                                location,
                                session: SessionUpdate::Keep,
                                last_id: LastIdUpdate::Keep,
                            }
                        }
                    }
                    Err(e) => {
                        log_resolution_error(&e, &identity.identifier);
                        self.unresolved(&context, "")
                    }
                }
            }
            AttemptOutcome::Failed { context, detail } => self.unresolved(&context, &detail),
            AttemptOutcome::Canceled { context } => self.unresolved(&context, ""),
        }
    }

    fn unresolved(&self, context: &CallbackContext, detail: &str) -> CallbackResponse {
        CallbackResponse {
            location: self.dispatcher.failure(context.mode, detail),
            session: if context.mode.is_sign_in() {
                SessionUpdate::SignOut
            } else {
                SessionUpdate::Keep
            },
            last_id: LastIdUpdate::Keep,
        }
    }

    /// Names of the caches [`OpenIdService::flush_caches`] accepts.
    #[must_use]
    pub fn cache_names(&self) -> Vec<&'static str> {
        vec![ACCOUNTS_CACHE, ACCOUNTS_BY_EMAIL_CACHE, OPENID_CACHE]
    }

    /// Flushes the selected caches.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown cache; nothing is flushed
    /// in that case.
    pub async fn flush_caches(&self, selection: CacheSelection) -> Result<(), UnknownCacheError> {
        let names: Vec<String> = match selection {
            CacheSelection::All => self.cache_names().into_iter().map(String::from).collect(),
            CacheSelection::Named(names) => names,
        };

        let known = self.cache_names();
        if let Some(unknown) = names.iter().find(|n| !known.contains(&n.as_str())) {
            return Err(UnknownCacheError(unknown.clone()));
        }

        for name in &names {
            match name.as_str() {
                ACCOUNTS_CACHE => self.caches.by_id().clear().await,
                ACCOUNTS_BY_EMAIL_CACHE => self.caches.by_email().clear().await,
                OPENID_CACHE => self.discovery.clear().await,
                _ => {}
            }
            tracing::info!(cache = %name, "Flushed cache");
        }
        Ok(())
    }

    /// Releases cached state.
    pub async fn shutdown(&self) {
        self.discovery.clear().await;
        self.caches.clear().await;
        tracing::info!("OpenID service stopped");
    }
}

fn log_resolution_error(error: &AuthError, identifier: &str) {
    if error.is_fatal() {
        tracing::error!(
            identifier = %identifier,
            category = %error.category(),
            error = %error,
            "Account data is inconsistent, refusing sign-in"
        );
    } else {
        tracing::warn!(
            identifier = %identifier,
            category = %error.category(),
            error = %error,
            "Cannot resolve account for verified identity"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountExternalId, ExternalIdKey};
    use crate::config::GroupConfig;
    use crate::openid::{OPENID_IDENTITY, OPENID_MODE, P_MODE, P_REMEMBER, P_TOKEN};
    use crate::openid::mode::SignInMode;
    use crate::openid::consumer::VerificationResult;
    use crate::storage::InMemoryAccountStorage;
    use crate::testing::ScriptedConsumer;
    use crate::user::AccessPath;

    const CONTEXT: &str = "https://review.example.com/";
    const ALICE: &str = "https://idp.example/alice";

    fn service() -> (Arc<ScriptedConsumer>, Arc<InMemoryAccountStorage>, OpenIdService) {
        let consumer = Arc::new(ScriptedConsumer::new());
        consumer.add_provider(ALICE, "https://idp.example/op");
        let storage = Arc::new(InMemoryAccountStorage::new());
        let service = OpenIdService::new(
            AuthConfig::with_canonical_web_url(CONTEXT),
            consumer.clone(),
            storage.clone(),
        )
        .unwrap();
        (consumer, storage, service)
    }

    fn callback(mode: &str, extra: &[(&str, &str)]) -> CallbackParams {
        let mut params: CallbackParams = [
            (P_MODE, mode),
            (OPENID_MODE, "id_res"),
            (OPENID_IDENTITY, ALICE),
        ]
        .into_iter()
        .collect();
        for (k, v) in extra {
            params.insert(*k, *v);
        }
        params
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let consumer = Arc::new(ScriptedConsumer::new());
        let storage = Arc::new(InMemoryAccountStorage::new());
        let result = OpenIdService::new(AuthConfig::default(), consumer, storage);
        let Err(err) = result else {
            panic!("service accepted a config without canonical_web_url");
        };
        assert!(matches!(err, AuthError::Configuration { .. }));
        assert!(err.to_string().contains("canonical_web_url"));
    }

    #[tokio::test]
    async fn test_register_then_sign_in() {
        let (consumer, _storage, service) = service();
        consumer.script_verification(
            ALICE,
            Ok(VerificationResult::verified(ALICE)
                .with_sreg([("fullname", "Alice A"), ("email", "alice@example.com")])),
        );

        let first = service
            .handle_callback(&callback("register", &[(P_TOKEN, "mine"), (P_REMEMBER, "1")]), None)
            .await;
        assert_eq!(first.location, "https://review.example.com/#newly-registered,mine");
        assert_eq!(first.last_id, LastIdUpdate::Set(ALICE.to_string()));
        let SessionUpdate::SignIn { account_id, remember } = first.session else {
            panic!("expected sign-in, got {:?}", first.session);
        };
        assert!(remember);

        let second = service.handle_callback(&callback("sign-in", &[]), None).await;
        assert_eq!(second.location, "https://review.example.com/#mine");
        assert_eq!(second.last_id, LastIdUpdate::Clear);
        assert_eq!(
            second.session,
            SessionUpdate::SignIn {
                account_id,
                remember: false
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_signs_out() {
        let (_consumer, _storage, service) = service();

        let response = service
            .handle_callback(&callback("register", &[(OPENID_MODE, "cancel")]), None)
            .await;
        assert_eq!(
            response.location,
            "https://review.example.com/#sign-in-failed,register,"
        );
        assert_eq!(response.session, SessionUpdate::SignOut);
        assert_eq!(response.last_id, LastIdUpdate::Keep);
    }

    #[tokio::test]
    async fn test_failed_link_keeps_session() {
        let (consumer, _storage, service) = service();
        consumer.script_verification(ALICE, Ok(VerificationResult::failed("Bad signature")));

        let response = service
            .handle_callback(&callback("link-identity", &[]), None)
            .await;
        assert_eq!(
            response.location,
            "https://review.example.com/#sign-in-failed,link-identity,Bad+signature"
        );
        assert_eq!(response.session, SessionUpdate::Keep);
    }

    #[tokio::test]
    async fn test_link_identity_keeps_session() {
        let (_consumer, storage, service) = service();
        storage
            .insert_account(&crate::account::Account::new(AccountId(7)))
            .await
            .unwrap();
        let caller = IdentifiedUser::new(AccountId(7), AccessPath::WebUi, &GroupConfig::default(), []);

        let response = service
            .handle_callback(
                &callback("link-identity", &[(P_TOKEN, "settings,web-identities")]),
                Some(&caller),
            )
            .await;
        assert_eq!(
            response.location,
            "https://review.example.com/#settings,web-identities"
        );
        assert_eq!(response.session, SessionUpdate::Keep);
        assert!(
            storage
                .find_external_id(&ExternalIdKey::new(AccountId(7), ALICE))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_consistency_error_is_generic_failure() {
        let (_consumer, storage, service) = service();
        for id in [1, 2] {
            storage
                .insert_external_id_unchecked(&AccountExternalId::new(ExternalIdKey::new(
                    AccountId(id),
                    ALICE,
                )))
                .await;
        }

        let response = service.handle_callback(&callback("sign-in", &[]), None).await;
        assert_eq!(
            response.location,
            "https://review.example.com/#sign-in-failed,sign-in,"
        );
        assert_eq!(response.session, SessionUpdate::SignOut);
    }

    #[tokio::test]
    async fn test_flush_caches() {
        let (_consumer, _storage, service) = service();
        assert_eq!(
            service.cache_names(),
            vec!["accounts", "accounts_byemail", "openid"]
        );

        service.discovery_cache().resolve(ALICE).await;
        assert_eq!(service.discovery_cache().len().await, 1);

        let err = service
            .flush_caches(CacheSelection::Named(vec![
                "openid".to_string(),
                "bogus".to_string(),
            ]))
            .await
            .unwrap_err();
        assert_eq!(err, UnknownCacheError("bogus".to_string()));
        assert_eq!(service.discovery_cache().len().await, 1);

        service
            .flush_caches(CacheSelection::Named(vec!["openid".to_string()]))
            .await
            .unwrap();
        assert!(service.discovery_cache().is_empty().await);

        service.flush_caches(CacheSelection::All).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_releases_caches() {
        let (_consumer, _storage, service) = service();
        service
            .discover(&DiscoveryRequest::new(ALICE).with_mode(SignInMode::Register))
            .await;
        assert!(!service.discovery_cache().is_empty().await);

        service.shutdown().await;
        assert!(service.discovery_cache().is_empty().await);
        assert!(service.caches().by_id().is_empty().await);
    }
}
