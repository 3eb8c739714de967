//! Account and external identity records.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Prefix of the external identifiers Google issues for its OpenID endpoint.
pub const GOOGLE_OPENID_URL: &str = "https://www.google.com/accounts/o8/id";

/// Prefix of identities recorded under the legacy Google account scheme.
pub const LEGACY_GOOGLE_PREFIX: &str = "Google Account ";

/// Internal account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user account on the review server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account id.
    pub id: AccountId,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Address used for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_email: Option<String>,

    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub registered_on: OffsetDateTime,
}

impl Account {
    /// Creates a new account registered now.
    #[must_use]
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            full_name: None,
            preferred_email: None,
            registered_on: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the full name.
    #[must_use]
    pub fn with_full_name(mut self, full_name: Option<String>) -> Self {
        self.full_name = full_name;
        self
    }

    /// Sets the preferred email.
    #[must_use]
    pub fn with_preferred_email(mut self, email: Option<String>) -> Self {
        self.preferred_email = email;
        self
    }
}

/// Primary key of an [`AccountExternalId`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalIdKey {
    /// Account the identity belongs to.
    pub account_id: AccountId,

    /// The external identifier, e.g. an OpenID claimed identifier.
    pub external_id: String,
}

impl ExternalIdKey {
    /// Creates a key.
    #[must_use]
    pub fn new(account_id: AccountId, external_id: impl Into<String>) -> Self {
        Self {
            account_id,
            external_id: external_id.into(),
        }
    }
}

/// Binding between an account and one external identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountExternalId {
    /// Primary key.
    pub key: ExternalIdKey,

    /// Email address last reported for this identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,

    /// When the identity was last used to sign in.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_used_on: Option<OffsetDateTime>,
}

impl AccountExternalId {
    /// Creates a binding with no email and no usage recorded.
    #[must_use]
    pub fn new(key: ExternalIdKey) -> Self {
        Self {
            key,
            email_address: None,
            last_used_on: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email_address = email;
        self
    }

    /// The owning account.
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.key.account_id
    }

    /// The external identifier.
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.key.external_id
    }

    /// Records a use of this identity now.
    pub fn touch(&mut self) {
        self.last_used_on = Some(OffsetDateTime::now_utc());
    }

    /// Replaces the stored email if `email` is present and different.
    ///
    /// Returns the previous email when a change was made.
    pub fn update_email(&mut self, email: Option<&str>) -> Option<Option<String>> {
        let email = email?;
        if self.email_address.as_deref() == Some(email) {
            return None;
        }
        Some(self.email_address.replace(email.to_string()))
    }
}

/// Returns `true` if `identifier` was issued by Google's OpenID endpoint.
#[must_use]
pub fn is_google_identifier(identifier: &str) -> bool {
    identifier
        .strip_prefix(GOOGLE_OPENID_URL)
        .is_some_and(|rest| rest.starts_with('?'))
}

/// Legacy external identifier recorded for a Google account email.
#[must_use]
pub fn legacy_google_identifier(email: &str) -> String {
    format!("{LEGACY_GOOGLE_PREFIX}{email}")
}
