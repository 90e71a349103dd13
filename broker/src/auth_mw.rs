//! HTTP-boundary auth extractor: Basic header or signed cookie, throttled by
//! `Auth`'s blocklist policy (spec §4.1). Wraps the resulting
//! `auth::AuthedUser` so handlers can read the identity and, via `Authed`,
//! echo back a refreshed session cookie.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::state::AppState;

pub struct RequireAuth(pub auth::AuthedUser);

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = crate::error::ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip().to_string())
            .unwrap_or_default();

        let basic = basic_auth(parts);
        let cookie = session_cookie(parts);

        let authed = state
            .auth
            .verify_user(
                basic.as_ref().map(|(u, p)| (u.as_str(), p.as_str())),
                cookie.as_deref(),
                &remote_addr,
            )
            .await?;

        Ok(RequireAuth(authed))
    }
}

fn basic_auth(parts: &Parts) -> Option<(String, String)> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Extracts the `auth=<token>` cookie (spec §6: `Cookie: auth=...`).
fn session_cookie(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "auth").then(|| value.to_string())
    })
}

/// Carries a handler's body plus the (possibly refreshed) session cookie to
/// attach as `Set-Cookie` on the way out.
pub struct Authed<T> {
    pub cookie: Option<String>,
    pub body: T,
}

impl<T> Authed<T> {
    pub fn new(authed: &auth::AuthedUser, body: T) -> Self {
        Self { cookie: authed.authentication_cookie.clone(), body }
    }
}

impl<T: IntoResponse> IntoResponse for Authed<T> {
    fn into_response(self) -> Response {
        let mut response = self.body.into_response();
        if let Some(cookie) = self.cookie {
            if let Ok(value) = axum::http::HeaderValue::from_str(&format!("auth={cookie}; Path=/; HttpOnly")) {
                response.headers_mut().insert(axum::http::header::SET_COOKIE, value);
            }
        }
        response
    }
}
