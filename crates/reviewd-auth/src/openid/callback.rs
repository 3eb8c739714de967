//! Final browser redirect after a sign-in attempt.
//!
//! The outcome travels to the web UI in the URL fragment of
//! `<canonical-web-url>#<fragment>`:
//!
//! ```text
//! success:  ["newly-registered,"] token
//! failure:  "sign-in-failed," mode "," url-encoded-detail
//! ```

use url::form_urlencoded;

use super::mode::SignInMode;

/// Token used when the attempt carried none.
pub const DEFAULT_TOKEN: &str = "mine";

/// Fragment prefix marking a freshly created account.
pub const NEWLY_REGISTERED: &str = "newly-registered,";

/// Fragment prefix marking a failed attempt.
pub const SIGN_IN_FAILED: &str = "sign-in-failed,";

/// Fragment for a successful attempt.
///
/// An empty token, or one that is itself a failure fragment, is replaced by
/// [`DEFAULT_TOKEN`] so the user never lands back on a failure page.
#[must_use]
pub fn success_fragment(token: &str, is_new: bool) -> String {
    let token = if token.is_empty() || token.starts_with(SIGN_IN_FAILED) {
        DEFAULT_TOKEN
    } else {
        token
    };
    if is_new {
        format!("{NEWLY_REGISTERED}{token}")
    } else {
        token.to_string()
    }
}

/// Fragment for a failed or canceled attempt.
#[must_use]
pub fn failure_fragment(mode: SignInMode, detail: &str) -> String {
    let detail: String = form_urlencoded::byte_serialize(detail.as_bytes()).collect();
    format!("{SIGN_IN_FAILED}{mode},{detail}")
}

/// Builds redirect locations under the canonical web URL.
#[derive(Debug, Clone)]
pub struct CallbackDispatcher {
    canonical_url: String,
}

impl CallbackDispatcher {
    /// Creates a dispatcher for `canonical_url`, which must end with `/`.
    #[must_use]
    pub fn new(canonical_url: impl Into<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
        }
    }

    /// Location after a successful resolution.
    #[must_use]
    pub fn success(&self, token: &str, is_new: bool) -> String {
        self.location(&success_fragment(token, is_new))
    }

    /// Location after a failure; `detail` is empty for cancellations.
    #[must_use]
    pub fn failure(&self, mode: SignInMode, detail: &str) -> String {
        self.location(&failure_fragment(mode, detail))
    }

    fn location(&self, fragment: &str) -> String {
        format!("{}#{}", self.canonical_url, fragment)
    }
}
