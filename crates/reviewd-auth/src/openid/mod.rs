//! OpenID relying party flow.
//!
//! # Flow
//!
//! ```text
//! POST /openid/discover {identifier, mode, remember, token}
//!     └─► DiscoveryCache::resolve ─► associate ─► authenticate
//!         ├─► no endpoints / association failure → DiscoveryResult::Failed
//!         └─► DiscoveryResult::Redirect → browser goes to the provider
//!
//! GET|POST /OpenID?reviewd.mode=..&openid.*=..
//!     ├─► openid.mode=cancel / no identity / cache miss → Canceled
//!     └─► verify
//!         ├─► verified id → Succeeded → IdentityResolver
//!         ├─► status message → Failed
//!         └─► nothing → Canceled
//! ```
//!
//! No attempt state is kept between the two requests: the provider echoes
//! the identity and the return URL parameters back, and the discovered
//! endpoint is recovered from the discovery cache.

pub mod callback;
pub mod consumer;
pub mod discovery;
pub mod mode;
pub mod request;
pub mod response;
pub mod state;

pub use callback::CallbackDispatcher;
pub use consumer::{
    AttributeRequest, AuthRequest, CallbackParams, ConsumerError, DiscoveredEndpoint,
    OpenIdConsumer, ProfileAttributes, SELECT_ID, VerificationResult,
};
pub use discovery::{DiscoveryCache, DiscoveryCacheConfig};
pub use mode::SignInMode;
pub use request::{DiscoveryRequest, DiscoveryResult, RequestBuilder};
pub use response::{Attempt, AttemptOutcome, AttemptPhase, CallbackContext, ResponseHandler};
pub use state::{AttemptState, ReturnUrl};

/// Return URL parameter carrying the [`SignInMode`].
pub const P_MODE: &str = "reviewd.mode";

/// Return URL parameter carrying the continuation token.
pub const P_TOKEN: &str = "reviewd.token";

/// Return URL parameter set to `1` when the user asked to be remembered.
pub const P_REMEMBER: &str = "reviewd.remember";

/// Path of the provider return URL, relative to the context URL.
pub const RETURN_URL: &str = "OpenID";

/// Provider parameter holding the asserted identity.
pub const OPENID_IDENTITY: &str = "openid.identity";

/// Provider parameter holding the protocol mode.
pub const OPENID_MODE: &str = "openid.mode";

/// Provider parameter echoing the return URL.
pub const OPENID_RETURN_TO: &str = "openid.return_to";

/// Relying party nonce some providers append to the return URL.
pub const OPENID_RP_NONCE: &str = "openid.rpnonce";

/// Signature over [`OPENID_RP_NONCE`].
pub const OPENID_RP_SIG: &str = "openid.rpsig";
