//! Sign-in modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the user is trying to do with the identity being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignInMode {
    /// Sign in to the account owning the identity.
    #[default]
    SignIn,
    /// Same as sign-in; the user came through the registration page.
    Register,
    /// Attach the identity to the signed-in user's account.
    LinkIdentity,
}

impl SignInMode {
    /// The wire name carried in the return URL.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignIn => "sign-in",
            Self::Register => "register",
            Self::LinkIdentity => "link-identity",
        }
    }

    /// Parses `value`, falling back to [`SignInMode::SignIn`] when it is
    /// missing or unknown.
    #[must_use]
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    /// Returns `true` for modes that establish a browser session.
    #[must_use]
    pub fn is_sign_in(&self) -> bool {
        matches!(self, Self::SignIn | Self::Register)
    }
}

impl fmt::Display for SignInMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown sign-in mode: {0}")]
pub struct UnknownModeError(pub String);

impl FromStr for SignInMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign-in" => Ok(Self::SignIn),
            "register" => Ok(Self::Register),
            "link-identity" => Ok(Self::LinkIdentity),
            other => Err(UnknownModeError(other.to_string())),
        }
    }
}
