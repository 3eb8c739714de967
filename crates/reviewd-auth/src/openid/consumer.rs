//! Contract with the OpenID protocol library.
//!
//! Discovery, association, message signing and assertion verification are
//! delegated to an [`OpenIdConsumer`]. This module only defines the data
//! that crosses that boundary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Identifier asking the provider to let the user pick an identity.
pub const SELECT_ID: &str = "http://specs.openid.net/auth/2.0/identifier_select";

/// Simple Registration namespace.
pub const SREG_NS: &str = "http://openid.net/extensions/sreg/1.1";

/// Attribute Exchange namespace.
pub const AX_NS: &str = "http://openid.net/srv/ax/1.0";

/// Attribute Exchange type of the first name.
pub const SCHEMA_FIRSTNAME: &str = "http://schema.openid.net/namePerson/first";

/// Attribute Exchange type of the last name.
pub const SCHEMA_LASTNAME: &str = "http://schema.openid.net/namePerson/last";

/// Attribute Exchange type of the email address.
pub const SCHEMA_EMAIL: &str = "http://schema.openid.net/contact/email";

/// Errors reported by an [`OpenIdConsumer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumerError {
    /// The identifier could not be discovered.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// No association could be established with any endpoint.
    #[error("Association error: {0}")]
    Association(String),

    /// The authentication request could not be built.
    #[error("Message error: {0}")]
    Message(String),

    /// The provider could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The assertion could not be verified.
    #[error("Verification error: {0}")]
    Verification(String),
}

/// A provider endpoint found by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredEndpoint {
    /// Where authentication requests are sent.
    pub op_endpoint: Url,
    /// Identifier the user claims, absent for provider-select discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_identifier: Option<String>,
    /// Provider-local identifier, if it differs from the claimed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
    /// Protocol version advertised by the endpoint.
    pub version: String,
}

impl DiscoveredEndpoint {
    /// Creates an OpenID 2.0 endpoint.
    #[must_use]
    pub fn new(op_endpoint: Url) -> Self {
        Self {
            op_endpoint,
            claimed_identifier: None,
            delegate: None,
            version: "2.0".to_string(),
        }
    }

    /// Sets the claimed identifier.
    #[must_use]
    pub fn with_claimed_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.claimed_identifier = Some(identifier.into());
        self
    }

    /// The identity to put in an authentication request: the delegate,
    /// else the claimed identifier, else [`SELECT_ID`].
    #[must_use]
    pub fn request_identity(&self) -> &str {
        self.delegate
            .as_deref()
            .or(self.claimed_identifier.as_deref())
            .unwrap_or(SELECT_ID)
    }
}

/// A profile attribute request attached to an authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRequest {
    /// Simple Registration fetch of the named fields.
    SReg {
        /// Requested field names, e.g. `fullname`.
        required: Vec<String>,
    },
    /// Attribute Exchange fetch of `(alias, type URI)` pairs.
    Ax {
        /// Requested attributes.
        required: Vec<(String, String)>,
    },
}

impl AttributeRequest {
    /// The full name and email Simple Registration request.
    #[must_use]
    pub fn sreg_profile() -> Self {
        Self::SReg {
            required: vec!["fullname".to_string(), "email".to_string()],
        }
    }

    /// The first name, last name and email Attribute Exchange request.
    #[must_use]
    pub fn ax_profile() -> Self {
        Self::Ax {
            required: vec![
                ("FirstName".to_string(), SCHEMA_FIRSTNAME.to_string()),
                ("LastName".to_string(), SCHEMA_LASTNAME.to_string()),
                ("Email".to_string(), SCHEMA_EMAIL.to_string()),
            ],
        }
    }

    fn write_parameters(&self, out: &mut BTreeMap<String, String>) {
        match self {
            Self::SReg { required } => {
                out.insert("openid.ns.sreg".to_string(), SREG_NS.to_string());
                out.insert("openid.sreg.required".to_string(), required.join(","));
            }
            Self::Ax { required } => {
                out.insert("openid.ns.ax".to_string(), AX_NS.to_string());
                out.insert("openid.ax.mode".to_string(), "fetch_request".to_string());
                for (alias, type_uri) in required {
                    out.insert(format!("openid.ax.type.{alias}"), type_uri.clone());
                }
                let aliases: Vec<&str> = required.iter().map(|(a, _)| a.as_str()).collect();
                out.insert("openid.ax.required".to_string(), aliases.join(","));
            }
        }
    }
}

/// An authentication request ready to be sent through the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Provider endpoint the browser is sent to.
    pub destination: Url,
    /// The identity asked about; [`SELECT_ID`] lets the provider choose.
    pub identity: String,
    /// Protocol parameters produced by the consumer.
    pub parameters: BTreeMap<String, String>,
    /// Attribute requests added by the relying party.
    pub extensions: Vec<AttributeRequest>,
}

impl AuthRequest {
    /// Creates a request with no extensions.
    #[must_use]
    pub fn new(destination: Url, identity: impl Into<String>) -> Self {
        Self {
            destination,
            identity: identity.into(),
            parameters: BTreeMap::new(),
            extensions: Vec::new(),
        }
    }

    /// Attaches an attribute request.
    pub fn add_extension(&mut self, extension: AttributeRequest) {
        self.extensions.push(extension);
    }

    /// Returns `true` if any profile attributes are requested.
    #[must_use]
    pub fn requests_attributes(&self) -> bool {
        !self.extensions.is_empty()
    }

    /// All parameters to send, protocol and extension ones merged.
    #[must_use]
    pub fn parameter_map(&self) -> BTreeMap<String, String> {
        let mut out = self.parameters.clone();
        for extension in &self.extensions {
            extension.write_parameters(&mut out);
        }
        out
    }
}

/// Parameters of a provider callback, as received on the return URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackParams(BTreeMap<String, String>);

impl CallbackParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Sets `name` to `value`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// The underlying map.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Profile attributes extracted from an assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileAttributes {
    /// Display name.
    pub full_name: Option<String>,
    /// Email address.
    pub email: Option<String>,
}

/// What the verifier concluded about a callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    /// The verified identifier, absent if verification did not succeed.
    pub verified_id: Option<String>,
    /// Reason given when verification failed.
    pub status_msg: Option<String>,
    /// Simple Registration response fields, if the extension was present.
    pub sreg: Option<BTreeMap<String, String>>,
    /// Attribute Exchange response values by alias, if present.
    pub ax: Option<BTreeMap<String, String>>,
}

impl VerificationResult {
    /// A successful verification of `identifier`.
    #[must_use]
    pub fn verified(identifier: impl Into<String>) -> Self {
        Self {
            verified_id: Some(identifier.into()),
            ..Self::default()
        }
    }

    /// A failed verification with `message`.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status_msg: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attaches Simple Registration fields.
    #[must_use]
    pub fn with_sreg<K: Into<String>, V: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.sreg = Some(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Attaches Attribute Exchange values.
    #[must_use]
    pub fn with_ax<K: Into<String>, V: Into<String>>(
        mut self,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.ax = Some(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Extracts the profile, preferring Simple Registration over
    /// Attribute Exchange.
    #[must_use]
    pub fn profile(&self) -> ProfileAttributes {
        if let Some(sreg) = &self.sreg {
            return ProfileAttributes {
                full_name: sreg.get("fullname").cloned(),
                email: sreg.get("email").cloned(),
            };
        }

        if let Some(ax) = &self.ax {
            let name: Vec<&str> = ["FirstName", "LastName"]
                .iter()
                .filter_map(|alias| ax.get(*alias))
                .map(String::as_str)
                .filter(|part| !part.is_empty())
                .collect();
            return ProfileAttributes {
                full_name: (!name.is_empty()).then(|| name.join(" ")),
                email: ax.get("Email").cloned(),
            };
        }

        ProfileAttributes::default()
    }
}

/// OpenID protocol operations.
#[async_trait]
pub trait OpenIdConsumer: Send + Sync {
    /// Discovers the provider endpoints for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails.
    async fn discover(&self, identifier: &str) -> Result<Vec<DiscoveredEndpoint>, ConsumerError>;

    /// Picks an endpoint and establishes (or reuses) an association with it.
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint is usable.
    async fn associate(
        &self,
        endpoints: &[DiscoveredEndpoint],
    ) -> Result<DiscoveredEndpoint, ConsumerError>;

    /// Builds the authentication request for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built.
    fn authenticate(
        &self,
        endpoint: &DiscoveredEndpoint,
        return_to: &str,
        realm: &str,
    ) -> Result<AuthRequest, ConsumerError>;

    /// Verifies the provider's assertion in `params`.
    ///
    /// `return_to` must be the URL the request was sent with, including any
    /// relying party nonce the provider appended.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures. A rejected assertion is an
    /// `Ok` result carrying a status message.
    async fn verify(
        &self,
        return_to: &str,
        params: &CallbackParams,
        endpoint: &DiscoveredEndpoint,
    ) -> Result<VerificationResult, ConsumerError>;
}
