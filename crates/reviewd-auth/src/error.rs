//! Sign-in and account resolution error types.
//!
//! This module defines the error taxonomy shared by the OpenID flow and the
//! identity resolver. Every variant is eventually turned into a browser
//! redirect by the callback dispatcher; none of them escape to the transport.

use std::fmt;

use crate::config::ConfigError;
use crate::openid::consumer::ConsumerError;
use crate::storage::StorageError;

/// Errors that can occur while signing a user in through an external
/// identity provider.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The identifier could not be resolved to any provider endpoint.
    #[error("Discovery failed for {identifier}: {message}")]
    Discovery {
        /// The identifier supplied by the user.
        identifier: String,
        /// Description of the failure.
        message: String,
    },

    /// The discovered endpoint data could not be turned into a request.
    #[error("Request build failed: {message}")]
    RequestBuild {
        /// Description of the failure.
        message: String,
    },

    /// The provider assertion was rejected.
    #[error("Verification failed: {message}")]
    Verification {
        /// Verifier supplied reason.
        message: String,
    },

    /// A uniqueness invariant of the account store was found violated.
    #[error("Consistency error: {message}")]
    Consistency {
        /// Description of the violated invariant.
        message: String,
    },

    /// A read or write against the account store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The operation requires a signed-in caller.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The external identifier is already bound to a different account.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting binding.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Discovery` error.
    #[must_use]
    pub fn discovery(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Creates a new `RequestBuild` error.
    #[must_use]
    pub fn request_build(message: impl Into<String>) -> Self {
        Self::RequestBuild {
            message: message.into(),
        }
    }

    /// Creates a new `Verification` error.
    #[must_use]
    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification {
            message: message.into(),
        }
    }

    /// Creates a new `Consistency` error.
    #[must_use]
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that indicate corrupted data rather than a
    /// transient or user-caused condition.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Discovery { .. } | Self::RequestBuild { .. } => ErrorCategory::Discovery,
            Self::Verification { .. } => ErrorCategory::Verification,
            Self::Consistency { .. } => ErrorCategory::Consistency,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Unauthorized { .. } | Self::Conflict { .. } => ErrorCategory::Authentication,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<ConsumerError> for AuthError {
    fn from(err: ConsumerError) -> Self {
        match err {
            ConsumerError::Discovery(message) => Self::Discovery {
                identifier: String::new(),
                message,
            },
            ConsumerError::Association(message) | ConsumerError::Message(message) => {
                Self::RequestBuild { message }
            }
            other => Self::verification(other.to_string()),
        }
    }
}

/// Broad grouping of [`AuthError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Endpoint discovery or request construction.
    Discovery,
    /// Assertion verification.
    Verification,
    /// Store invariant violations.
    Consistency,
    /// Storage or other infrastructure failures.
    Infrastructure,
    /// Caller identity problems.
    Authentication,
    /// Invalid configuration.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discovery => "discovery",
            Self::Verification => "verification",
            Self::Consistency => "consistency",
            Self::Infrastructure => "infrastructure",
            Self::Authentication => "authentication",
            Self::Configuration => "configuration",
        };
        write!(f, "{s}")
    }
}

/// Result type for sign-in operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::discovery("https://idp.example/alice", "no endpoints");
        assert_eq!(
            err.to_string(),
            "Discovery failed for https://idp.example/alice: no endpoints"
        );

        let err = AuthError::consistency("More than one account matches: x");
        assert_eq!(
            err.to_string(),
            "Consistency error: More than one account matches: x"
        );

        let err = AuthError::verification("Nonce verification failed.");
        assert_eq!(
            err.to_string(),
            "Verification failed: Nonce verification failed."
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthError::consistency("x").is_fatal());
        assert!(!AuthError::storage("x").is_fatal());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::request_build("x").category(),
            ErrorCategory::Discovery
        );
        assert_eq!(
            AuthError::storage("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AuthError::unauthorized("x").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(ErrorCategory::Consistency.to_string(), "consistency");
    }

    #[test]
    fn test_from_storage_error() {
        let err: AuthError = StorageError::Unavailable("down".to_string()).into();
        assert!(matches!(err, AuthError::Storage { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_from_config_error() {
        let err: AuthError = ConfigError::Missing("canonical_web_url".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_from_consumer_error() {
        let err: AuthError = ConsumerError::Association("bad endpoint".to_string()).into();
        assert!(matches!(err, AuthError::RequestBuild { .. }));

        let err: AuthError = ConsumerError::Network("timed out".to_string()).into();
        assert!(matches!(err, AuthError::Verification { .. }));
    }
}
