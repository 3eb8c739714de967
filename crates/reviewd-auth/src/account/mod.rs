//! Internal accounts and their external identities.
//!
//! - [`model`] - account and external identity records
//! - [`cache`] - derived by-id and by-email caches and their eviction rules
//! - [`resolver`] - maps a verified external identity onto an account

pub mod cache;
pub mod model;
pub mod resolver;

pub use cache::{AccountByEmailCache, AccountCache, AccountCaches, AccountState};
pub use model::{
    Account, AccountExternalId, AccountId, ExternalIdKey, GOOGLE_OPENID_URL, LEGACY_GOOGLE_PREFIX,
    is_google_identifier, legacy_google_identifier,
};
pub use resolver::{IdentityResolver, Resolution, VerifiedIdentity};
