//! Provider-bound authentication requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::consumer::{AttributeRequest, OpenIdConsumer, SELECT_ID};
use super::discovery::DiscoveryCache;
use super::mode::SignInMode;
use super::state::AttemptState;
use crate::error::AuthError;
use crate::storage::AccountStorage;

/// A browser's request to start signing in with an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// The identifier the user typed or picked.
    pub identifier: String,
    /// What the user is trying to do.
    #[serde(default)]
    pub mode: SignInMode,
    /// Remember the identifier in a cookie after sign-in.
    #[serde(default)]
    pub remember: bool,
    /// Opaque continuation token returned in the final redirect.
    #[serde(default)]
    pub token: String,
}

impl DiscoveryRequest {
    /// Creates a sign-in request with no continuation token.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            mode: SignInMode::SignIn,
            remember: false,
            token: String::new(),
        }
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SignInMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the remember flag.
    #[must_use]
    pub fn with_remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }

    /// Sets the continuation token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }
}

/// Result of starting a sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiscoveryResult {
    /// Send the browser to `destination` with `parameters`.
    Redirect {
        /// Provider endpoint.
        destination: String,
        /// Parameters to submit to the endpoint.
        parameters: BTreeMap<String, String>,
    },
    /// No request could be produced for the identifier.
    Failed,
}

impl DiscoveryResult {
    /// Returns `true` for [`DiscoveryResult::Redirect`].
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }
}

/// Builds authentication requests.
pub struct RequestBuilder {
    discovery: Arc<DiscoveryCache>,
    consumer: Arc<dyn OpenIdConsumer>,
    storage: Arc<dyn AccountStorage>,
    context_url: String,
}

impl RequestBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(
        discovery: Arc<DiscoveryCache>,
        consumer: Arc<dyn OpenIdConsumer>,
        storage: Arc<dyn AccountStorage>,
        context_url: impl Into<String>,
    ) -> Self {
        Self {
            discovery,
            consumer,
            storage,
            context_url: context_url.into(),
        }
    }

    /// Builds the provider request for `request`.
    pub async fn discover(&self, request: &DiscoveryRequest) -> DiscoveryResult {
        let state = match AttemptState::init(
            &self.discovery,
            self.consumer.as_ref(),
            &self.context_url,
            &request.identifier,
            request.mode,
            request.remember,
            &request.token,
        )
        .await
        {
            Ok(state) => state,
            Err(e) => {
                tracing::info!(
                    identifier = %request.identifier,
                    category = %e.category(),
                    error = %e,
                    "Cannot start OpenID sign-in"
                );
                return DiscoveryResult::Failed;
            }
        };

        let return_to = state.return_to.to_string();
        let mut auth_request =
            match self
                .consumer
                .authenticate(&state.endpoint, &return_to, &state.context_url)
            {
                Ok(auth_request) => auth_request,
                Err(e) => {
                    let err = AuthError::from(e);
                    tracing::warn!(
                        identifier = %request.identifier,
                        category = %err.category(),
                        error = %err,
                        "Cannot create OpenID authentication request"
                    );
                    return DiscoveryResult::Failed;
                }
            };

        if self.requests_registration(&auth_request.identity).await {
            auth_request.add_extension(AttributeRequest::sreg_profile());
            auth_request.add_extension(AttributeRequest::ax_profile());
        }

        DiscoveryResult::Redirect {
            destination: auth_request.destination.to_string(),
            parameters: auth_request.parameter_map(),
        }
    }

    /// Profile attributes are only worth asking for when the identity has no
    /// account yet.
    async fn requests_registration(&self, identity: &str) -> bool {
        if identity == SELECT_ID {
            return true;
        }
        match self.storage.external_ids_by_external(identity).await {
            Ok(rows) => rows.is_empty(),
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    error = %e,
                    "Cannot determine if identity is registered"
                );
                true
            }
        }
    }
}
