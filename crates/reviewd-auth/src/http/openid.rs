//! OpenID endpoints.
//!
//! # Flow
//!
//! ```text
//! POST /openid/discover {identifier, mode, remember, token}
//!     └─► JSON DiscoveryResult (the web UI submits the redirect form)
//!
//! GET|POST /OpenID?...
//!     └─► 303 to <canonical-web-url>#<fragment>
//!         ├─► session signed in / out through WebSession
//!         └─► reviewd.last_openid cookie set or removed
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};

use crate::account::AccountId;
use crate::openid::consumer::CallbackParams;
use crate::openid::request::{DiscoveryRequest, DiscoveryResult};
use crate::service::{LastIdUpdate, OpenIdService, SessionUpdate};
use crate::user::IdentifiedUser;

/// Cookie remembering the last identifier used to sign in.
pub const LAST_ID_COOKIE: &str = "reviewd.last_openid";

/// Browser session management provided by the hosting server.
#[async_trait]
pub trait WebSession: Send + Sync {
    /// The user signed in on this browser, if any.
    async fn current_user(&self, jar: &CookieJar) -> Option<IdentifiedUser>;

    /// Establishes a session for `account_id` and returns the updated jar.
    async fn sign_in(&self, jar: CookieJar, account_id: AccountId, remember: bool) -> CookieJar;

    /// Ends the session and returns the updated jar.
    async fn sign_out(&self, jar: CookieJar) -> CookieJar;
}

/// State for the OpenID handlers.
#[derive(Clone)]
pub struct OpenIdState {
    /// The sign-in service.
    pub service: Arc<OpenIdService>,
    /// Session management.
    pub sessions: Arc<dyn WebSession>,
}

/// Builds the router serving the OpenID endpoints.
pub fn openid_router(state: OpenIdState) -> Router {
    Router::new()
        .route("/openid/discover", post(discover_handler))
        .route("/OpenID", get(login_get).post(login_post))
        .with_state(state)
}

/// POST /openid/discover handler.
pub async fn discover_handler(
    State(state): State<OpenIdState>,
    Json(request): Json<DiscoveryRequest>,
) -> Json<DiscoveryResult> {
    Json(state.service.discover(&request).await)
}

/// GET /OpenID handler.
///
/// An unreadable query is treated as a callback without parameters, which
/// ends in the canceled redirect.
pub async fn login_get(
    State(state): State<OpenIdState>,
    jar: CookieJar,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable OpenID callback query");
            CallbackParams::new()
        }
    };
    complete_login(&state, jar, &params).await
}

/// POST /OpenID handler; some providers return with a form post.
pub async fn login_post(
    State(state): State<OpenIdState>,
    jar: CookieJar,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Response {
    let params = match form {
        Ok(Form(params)) => params,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable OpenID callback form");
            CallbackParams::new()
        }
    };
    complete_login(&state, jar, &params).await
}

async fn complete_login(state: &OpenIdState, jar: CookieJar, params: &CallbackParams) -> Response {
    let caller = state.sessions.current_user(&jar).await;
    let response = state.service.handle_callback(params, caller.as_ref()).await;

    let jar = match response.session {
        SessionUpdate::SignIn {
            account_id,
            remember,
        } => state.sessions.sign_in(jar, account_id, remember).await,
        SessionUpdate::SignOut => state.sessions.sign_out(jar).await,
        SessionUpdate::Keep => jar,
    };

    let jar = match response.last_id {
        LastIdUpdate::Set(identifier) => jar.add(last_id_cookie(&state.service, identifier)),
        LastIdUpdate::Clear => jar.add(removal_cookie(LAST_ID_COOKIE)),
        LastIdUpdate::Keep => jar,
    };

    (
        jar,
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "Fri, 01 Jan 1990 00:00:00 GMT"),
        ],
        Redirect::to(&response.location),
    )
        .into_response()
}

/// Create a cookie telling the browser to drop `name` at path `/`.
///
/// Unlike `CookieJar::remove`, this is emitted even when the request did
/// not carry the cookie.
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").build();
    cookie.make_removal();
    cookie
}

/// Create the last-identifier cookie.
fn last_id_cookie(service: &OpenIdService, identifier: String) -> Cookie<'static> {
    let openid = &service.config().openid;
    let max_age = time::Duration::seconds(
        i64::try_from(openid.last_id_cookie_max_age.as_secs()).unwrap_or(i64::MAX),
    );

    Cookie::build((LAST_ID_COOKIE, identifier))
        .http_only(true)
        .secure(openid.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}
