//! HTTP handlers for the OpenID sign-in endpoints.
//!
//! # Available Handlers
//!
//! - [`openid::discover_handler`] - starts a sign-in (`POST /openid/discover`)
//! - [`openid::login_get`] / [`openid::login_post`] - provider return URL
//!   (`GET|POST /OpenID`)

pub mod openid;

pub use openid::{
    LAST_ID_COOKIE, OpenIdState, WebSession, discover_handler, login_get, login_post,
    openid_router, removal_cookie,
};
