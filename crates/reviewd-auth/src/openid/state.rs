//! Per-attempt state.
//!
//! An [`AttemptState`] is rebuilt for every protocol step from the discovery
//! cache and the parameters the browser carries; nothing about an attempt is
//! stored on the server between the request and the callback.

use std::fmt;

use url::form_urlencoded;

use super::consumer::{DiscoveredEndpoint, OpenIdConsumer};
use super::discovery::DiscoveryCache;
use super::mode::SignInMode;
use super::{P_MODE, P_REMEMBER, P_TOKEN, RETURN_URL};
use crate::error::{AuthError, AuthResult};

/// A URL with an ordered, replaceable query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnUrl {
    base: String,
    params: Vec<(String, String)>,
}

impl ReturnUrl {
    /// Creates a URL with no query parameters.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    /// Sets `name` to `value`, replacing an earlier value in place.
    pub fn put(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name.to_string(), value)),
        }
    }

    /// Returns the value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ReturnUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)?;
        if self.params.is_empty() {
            return Ok(());
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();
        write!(f, "?{query}")
    }
}

/// Everything needed to send or verify one sign-in attempt.
#[derive(Debug, Clone)]
pub struct AttemptState {
    /// The associated provider endpoint.
    pub endpoint: DiscoveredEndpoint,
    /// Where the provider sends the browser back.
    pub return_to: ReturnUrl,
    /// The server's context URL, used as the OpenID realm.
    pub context_url: String,
}

impl AttemptState {
    /// Rebuilds the state for `identifier` from the discovery cache.
    ///
    /// # Errors
    ///
    /// - `Discovery` if the cache has no endpoints for the identifier
    /// - `RequestBuild` if no endpoint can be associated with
    pub async fn init(
        discovery: &DiscoveryCache,
        consumer: &dyn OpenIdConsumer,
        context_url: &str,
        identifier: &str,
        mode: SignInMode,
        remember: bool,
        token: &str,
    ) -> AuthResult<Self> {
        let endpoints = discovery
            .resolve(identifier)
            .await
            .ok_or_else(|| AuthError::discovery(identifier, "no provider endpoints"))?;

        let endpoint = consumer
            .associate(&endpoints)
            .await
            .map_err(|e| AuthError::request_build(e.to_string()))?;

        let mut return_to = ReturnUrl::new(format!("{context_url}{RETURN_URL}"));
        return_to.put(P_MODE, mode.as_str());
        if !token.is_empty() {
            return_to.put(P_TOKEN, token);
        }
        if remember {
            return_to.put(P_REMEMBER, "1");
        }

        Ok(Self {
            endpoint,
            return_to,
            context_url: context_url.to_string(),
        })
    }
}
