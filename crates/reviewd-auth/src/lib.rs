//! # reviewd-auth
//!
//! External identity sign-in for the Reviewd code review server.
//!
//! This crate provides:
//! - OpenID discovery with a shared, time-limited result cache
//! - Authentication request construction and provider callback handling
//! - Resolution of verified identities to local accounts (sign-in,
//!   registration, identity linking and legacy Google identifier upgrade)
//! - Account caches keyed by id and by email address
//! - Axum handlers for the discovery and return endpoints
//!
//! ## Modules
//!
//! - [`config`] - Sign-in configuration and loader
//! - [`openid`] - The OpenID flow: discovery, requests, callbacks
//! - [`account`] - Account model, caches and identity resolution
//! - [`storage`] - Storage trait for accounts and external ids
//! - [`service`] - [`OpenIdService`], which wires the flow together
//! - [`http`] - Axum HTTP handlers
//! - [`user`] - Request principals
//! - [`observability`] - Tracing setup
//! - `testing` - In-process stand-ins for the provider and sessions
//!   (`testing` feature)

pub mod account;
pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod openid;
pub mod service;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod user;

pub use account::{
    Account, AccountExternalId, AccountId, ExternalIdKey, IdentityResolver, Resolution,
    VerifiedIdentity,
};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, AuthResult, ErrorCategory};
pub use http::{OpenIdState, WebSession, openid_router};
pub use openid::{CallbackParams, DiscoveryRequest, DiscoveryResult, OpenIdConsumer, SignInMode};
pub use service::{
    CacheSelection, CallbackResponse, LastIdUpdate, OpenIdService, SessionUpdate,
    UnknownCacheError,
};
pub use storage::{AccountStorage, InMemoryAccountStorage, StorageError, StorageResult};
pub use user::{AccessPath, AnonymousUser, CurrentUser, IdentifiedUser};
