//! Provider callback handling.
//!
//! Turns the parameters the provider sends back through the browser into an
//! [`AttemptOutcome`]. Every path ends in a terminal phase; errors are
//! folded into `Failed` or `Canceled` here and never reach the transport.

use std::sync::Arc;

use super::consumer::{CallbackParams, OpenIdConsumer};
use super::discovery::DiscoveryCache;
use super::mode::SignInMode;
use super::state::AttemptState;
use super::{
    OPENID_IDENTITY, OPENID_MODE, OPENID_RETURN_TO, OPENID_RP_NONCE, OPENID_RP_SIG, P_MODE,
    P_REMEMBER, P_TOKEN,
};
use crate::account::VerifiedIdentity;
use crate::error::AuthError;

/// Status message the verifier reports for a rejected replay nonce.
pub const NONCE_VERIFICATION_FAILED: &str = "Nonce verification failed.";

/// Phases of a sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// Nothing done yet.
    Init,
    /// The identifier resolved to an associated endpoint.
    Discovered,
    /// The browser was sent to the provider.
    Requested,
    /// The provider answered and the assertion is being checked.
    Verifying,
    /// The assertion was verified.
    Succeeded,
    /// The provider or verifier rejected the attempt.
    Failed,
    /// The attempt was abandoned.
    Canceled,
}

impl AttemptPhase {
    /// Returns `true` for phases that end an attempt.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Returns `true` if the attempt may move from `self` to `next`.
    #[must_use]
    pub fn can_advance_to(&self, next: Self) -> bool {
        use AttemptPhase::{Canceled, Discovered, Failed, Init, Requested, Succeeded, Verifying};
        matches!(
            (*self, next),
            (Init, Discovered)
                | (Discovered, Requested)
                | (Requested, Verifying)
                | (Verifying, Succeeded | Failed)
                | (Init | Discovered | Requested | Verifying, Canceled)
        )
    }
}

/// Tracks the phase of one attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    mode: SignInMode,
    phase: AttemptPhase,
}

impl Attempt {
    /// Starts tracking a callback. The request already went out, so the
    /// attempt begins in `Requested`.
    #[must_use]
    pub fn returned(mode: SignInMode) -> Self {
        Self {
            mode,
            phase: AttemptPhase::Requested,
        }
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    /// Moves to `next`, logging transitions the state machine does not allow.
    pub fn advance(&mut self, next: AttemptPhase) {
        if !self.phase.can_advance_to(next) {
            tracing::warn!(
                mode = %self.mode,
                from = ?self.phase,
                to = ?next,
                "Unexpected sign-in phase transition"
            );
        }
        tracing::trace!(mode = %self.mode, from = ?self.phase, to = ?next, "Sign-in phase");
        self.phase = next;
    }
}

/// Browser-carried context of an attempt, echoed back on the return URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackContext {
    /// Requested mode; defaults to sign-in.
    pub mode: SignInMode,
    /// Continuation token, possibly empty.
    pub token: String,
    /// Whether the user asked to be remembered.
    pub remember: bool,
}

impl CallbackContext {
    /// Reads the context from callback parameters.
    #[must_use]
    pub fn from_params(params: &CallbackParams) -> Self {
        Self {
            mode: SignInMode::parse_or_default(params.get(P_MODE)),
            token: params.get(P_TOKEN).unwrap_or_default().to_string(),
            remember: params.get(P_REMEMBER) == Some("1"),
        }
    }
}

/// Terminal result of a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The provider asserted `identity` and the verifier accepted it.
    Succeeded {
        /// Attempt context.
        context: CallbackContext,
        /// The verified identity with its profile attributes.
        identity: VerifiedIdentity,
    },
    /// The attempt was rejected with a reason.
    Failed {
        /// Attempt context.
        context: CallbackContext,
        /// Reason shown to the user.
        detail: String,
    },
    /// The attempt was abandoned without a reason.
    Canceled {
        /// Attempt context.
        context: CallbackContext,
    },
}

impl AttemptOutcome {
    /// The terminal phase this outcome represents.
    #[must_use]
    pub fn phase(&self) -> AttemptPhase {
        match self {
            Self::Succeeded { .. } => AttemptPhase::Succeeded,
            Self::Failed { .. } => AttemptPhase::Failed,
            Self::Canceled { .. } => AttemptPhase::Canceled,
        }
    }

    /// The attempt context.
    #[must_use]
    pub fn context(&self) -> &CallbackContext {
        match self {
            Self::Succeeded { context, .. }
            | Self::Failed { context, .. }
            | Self::Canceled { context } => context,
        }
    }
}

/// Verifies provider callbacks.
pub struct ResponseHandler {
    discovery: Arc<DiscoveryCache>,
    consumer: Arc<dyn OpenIdConsumer>,
    context_url: String,
}

impl ResponseHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(
        discovery: Arc<DiscoveryCache>,
        consumer: Arc<dyn OpenIdConsumer>,
        context_url: impl Into<String>,
    ) -> Self {
        Self {
            discovery,
            consumer,
            context_url: context_url.into(),
        }
    }

    /// Drives the callback to a terminal outcome.
    pub async fn handle(&self, params: &CallbackParams) -> AttemptOutcome {
        let context = CallbackContext::from_params(params);
        let mut attempt = Attempt::returned(context.mode);

        if params.get(OPENID_MODE) == Some("cancel") {
            tracing::debug!(mode = %context.mode, "Provider reported sign-in canceled");
            attempt.advance(AttemptPhase::Canceled);
            return AttemptOutcome::Canceled { context };
        }

        let Some(identity) = params.get(OPENID_IDENTITY) else {
            tracing::debug!(mode = %context.mode, "Callback carries no identity");
            attempt.advance(AttemptPhase::Canceled);
            return AttemptOutcome::Canceled { context };
        };

        let mut state = match AttemptState::init(
            &self.discovery,
            self.consumer.as_ref(),
            &self.context_url,
            identity,
            context.mode,
            context.remember,
            &context.token,
        )
        .await
        {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    error = %e,
                    "Cannot rebuild sign-in state for callback"
                );
                attempt.advance(AttemptPhase::Canceled);
                return AttemptOutcome::Canceled { context };
            }
        };

        if params
            .get(OPENID_RETURN_TO)
            .is_some_and(|r| r.contains(&format!("{OPENID_RP_NONCE}=")))
        {
            state
                .return_to
                .put(OPENID_RP_NONCE, params.get(OPENID_RP_NONCE).unwrap_or_default());
            state
                .return_to
                .put(OPENID_RP_SIG, params.get(OPENID_RP_SIG).unwrap_or_default());
        }

        attempt.advance(AttemptPhase::Verifying);
        let result = match self
            .consumer
            .verify(&state.return_to.to_string(), params, &state.endpoint)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let err = AuthError::from(e);
                tracing::error!(
                    identity = %identity,
                    category = %err.category(),
                    error = %err,
                    "OpenID verification error"
                );
                attempt.advance(AttemptPhase::Failed);
                return AttemptOutcome::Failed {
                    context,
                    detail: err.to_string(),
                };
            }
        };

        if let Some(verified_id) = result.verified_id.as_deref() {
            let profile = result.profile();
            attempt.advance(AttemptPhase::Succeeded);
            return AttemptOutcome::Succeeded {
                context,
                identity: VerifiedIdentity::new(verified_id)
                    .with_full_name(profile.full_name)
                    .with_email(profile.email),
            };
        }

        match result.status_msg {
            Some(msg) => {
                if msg == NONCE_VERIFICATION_FAILED {
                    tracing::error!(
                        "OpenID failure: {}  Likely caused by clock skew on this server, install/configure NTP.",
                        msg
                    );
                } else {
                    tracing::error!("OpenID failure: {}", msg);
                }
                attempt.advance(AttemptPhase::Failed);
                AttemptOutcome::Failed {
                    context,
                    detail: msg,
                }
            }
            None => {
                attempt.advance(AttemptPhase::Canceled);
                AttemptOutcome::Canceled { context }
            }
        }
    }
}
