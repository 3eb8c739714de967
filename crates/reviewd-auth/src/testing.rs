//! Test doubles for the external collaborators.
//!
//! [`ScriptedConsumer`] stands in for the OpenID protocol library and
//! [`PlainCookieSession`] for the hosting server's session management.
//! Neither performs any cryptography; they exist so that the flow can be
//! exercised end to end without a real identity provider.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum_extra::extract::CookieJar;
use cookie::Cookie;
use url::Url;

use crate::account::AccountId;
use crate::config::GroupConfig;
use crate::http::openid::{WebSession, removal_cookie};
use crate::openid::consumer::{
    AuthRequest, CallbackParams, ConsumerError, DiscoveredEndpoint, OpenIdConsumer,
    VerificationResult,
};
use crate::openid::{OPENID_IDENTITY, OPENID_MODE, OPENID_RETURN_TO};
use crate::user::{AccessPath, IdentifiedUser};

type Verification = Result<VerificationResult, ConsumerError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An [`OpenIdConsumer`] answering from scripted data.
///
/// Discovery returns the endpoints registered with
/// [`ScriptedConsumer::add_provider`] and nothing for other identifiers.
/// Verification pops the next scripted result for the callback's
/// `openid.identity`; with nothing scripted the identity is accepted as is.
#[derive(Default)]
pub struct ScriptedConsumer {
    endpoints: Mutex<HashMap<String, Result<Vec<DiscoveredEndpoint>, ConsumerError>>>,
    verifications: Mutex<HashMap<String, VecDeque<Verification>>>,
    discover_delay: Option<Duration>,
    discover_calls: AtomicUsize,
    association_fails: AtomicBool,
    last_return_to: Mutex<Option<String>>,
}

impl ScriptedConsumer {
    /// Creates a consumer that knows no providers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every discovery take `delay`.
    #[must_use]
    pub fn with_discover_delay(mut self, delay: Duration) -> Self {
        self.discover_delay = Some(delay);
        self
    }

    /// Registers `identifier` as served by the endpoint at `op_endpoint`.
    ///
    /// An unparsable endpoint makes discovery of `identifier` fail.
    pub fn add_provider(&self, identifier: &str, op_endpoint: &str) {
        let endpoints = parse_endpoint(op_endpoint)
            .map(|url| vec![DiscoveredEndpoint::new(url).with_claimed_identifier(identifier)]);
        lock(&self.endpoints).insert(identifier.to_string(), endpoints);
    }

    /// Registers `identifier` as a provider-select URL (no claimed
    /// identifier, the provider picks the identity).
    pub fn add_select_provider(&self, identifier: &str, op_endpoint: &str) {
        let endpoints = parse_endpoint(op_endpoint).map(|url| vec![DiscoveredEndpoint::new(url)]);
        lock(&self.endpoints).insert(identifier.to_string(), endpoints);
    }

    /// Makes discovery of `identifier` fail with `message`.
    pub fn fail_discovery(&self, identifier: &str, message: &str) {
        lock(&self.endpoints).insert(
            identifier.to_string(),
            Err(ConsumerError::Discovery(message.to_string())),
        );
    }

    /// Queues the result of the next verification of `identity`.
    pub fn script_verification(&self, identity: &str, result: Verification) {
        lock(&self.verifications)
            .entry(identity.to_string())
            .or_default()
            .push_back(result);
    }

    /// Makes association fail.
    pub fn set_association_failure(&self, fail: bool) {
        self.association_fails.store(fail, Ordering::SeqCst);
    }

    /// Number of discoveries performed.
    #[must_use]
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    /// The return URL passed to the last verification.
    #[must_use]
    pub fn last_return_to(&self) -> Option<String> {
        lock(&self.last_return_to).clone()
    }
}

fn parse_endpoint(op_endpoint: &str) -> Result<Url, ConsumerError> {
    Url::parse(op_endpoint)
        .map_err(|e| ConsumerError::Discovery(format!("invalid endpoint {op_endpoint}: {e}")))
}

#[async_trait]
impl OpenIdConsumer for ScriptedConsumer {
    async fn discover(&self, identifier: &str) -> Result<Vec<DiscoveredEndpoint>, ConsumerError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.discover_delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.endpoints)
            .get(identifier)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn associate(
        &self,
        endpoints: &[DiscoveredEndpoint],
    ) -> Result<DiscoveredEndpoint, ConsumerError> {
        if self.association_fails.load(Ordering::SeqCst) {
            return Err(ConsumerError::Association(
                "provider refused association".to_string(),
            ));
        }
        endpoints
            .first()
            .cloned()
            .ok_or_else(|| ConsumerError::Association("no endpoints".to_string()))
    }

    fn authenticate(
        &self,
        endpoint: &DiscoveredEndpoint,
        return_to: &str,
        realm: &str,
    ) -> Result<AuthRequest, ConsumerError> {
        let identity = endpoint.request_identity().to_string();
        let mut request = AuthRequest::new(endpoint.op_endpoint.clone(), identity.clone());
        let claimed_id = endpoint
            .claimed_identifier
            .clone()
            .unwrap_or_else(|| identity.clone());

        for (name, value) in [
            ("openid.ns", "http://specs.openid.net/auth/2.0".to_string()),
            (OPENID_MODE, "checkid_setup".to_string()),
            (OPENID_IDENTITY, identity),
            ("openid.claimed_id", claimed_id),
            (OPENID_RETURN_TO, return_to.to_string()),
            ("openid.realm", realm.to_string()),
        ] {
            request.parameters.insert(name.to_string(), value);
        }
        Ok(request)
    }

    async fn verify(
        &self,
        return_to: &str,
        params: &CallbackParams,
        _endpoint: &DiscoveredEndpoint,
    ) -> Result<VerificationResult, ConsumerError> {
        *lock(&self.last_return_to) = Some(return_to.to_string());

        let identity = params.get(OPENID_IDENTITY).unwrap_or_default();
        let scripted = lock(&self.verifications)
            .get_mut(identity)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(VerificationResult::verified(identity)))
    }
}

/// Session cookie written by [`PlainCookieSession`].
pub const SESSION_COOKIE: &str = "reviewd.session";

/// A [`WebSession`] that stores the account id in a plain cookie.
///
/// Anyone can forge this cookie; it is only suitable for tests.
#[derive(Debug, Clone)]
pub struct PlainCookieSession {
    groups: GroupConfig,
}

impl PlainCookieSession {
    /// Creates a session manager placing users in `groups`.
    #[must_use]
    pub fn new(groups: GroupConfig) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl WebSession for PlainCookieSession {
    async fn current_user(&self, jar: &CookieJar) -> Option<IdentifiedUser> {
        let id: i32 = jar.get(SESSION_COOKIE)?.value().parse().ok()?;
        Some(IdentifiedUser::new(
            AccountId(id),
            AccessPath::WebUi,
            &self.groups,
            [],
        ))
    }

    async fn sign_in(&self, jar: CookieJar, account_id: AccountId, remember: bool) -> CookieJar {
        let mut cookie = Cookie::build((SESSION_COOKIE, account_id.to_string()))
            .http_only(true)
            .path("/")
            .build();
        if remember {
            cookie.make_permanent();
        }
        jar.add(cookie)
    }

    async fn sign_out(&self, jar: CookieJar) -> CookieJar {
        jar.add(removal_cookie(SESSION_COOKIE))
    }
}
