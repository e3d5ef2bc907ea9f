//! Per-request context and the extractors built on it
//!
//! The session middleware resolves the caller once and stores a
//! [`RequestContext`] in the request extensions. Handlers take it (or one of
//! the guard extractors) as a parameter instead of reading ambient state.

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts},
    http::{Extensions, HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::models::User;

/// Longest user agent kept in the audit ledger
const MAX_USER_AGENT_LENGTH: usize = 500;

#[derive(Debug, Clone)]
pub struct RequestContext {
    /// `None` for anonymous callers
    pub user: Option<User>,
    pub client_ip: String,
    pub user_agent: Option<String>,
    /// Browser session id, when the caller presented a valid one
    pub sid: Option<String>,
}

impl RequestContext {
    pub fn anonymous(
        headers: &HeaderMap,
        extensions: &Extensions,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            user: None,
            client_ip: client_ip(headers, extensions, trust_forwarded_for),
            user_agent: user_agent(headers),
            sid: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Peer address, else "unknown"
///
/// With `trust_forwarded_for` the first `X-Forwarded-For` entry wins; only
/// enable it behind a proxy that overwrites the header.
pub fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded_for)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LENGTH).collect())
}

/// 302 to the login page
pub fn redirect_to_login() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/login")]).into_response()
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| {
                RequestContext::anonymous(&parts.headers, &parts.extensions, false)
            }))
    }
}

/// A signed-in caller; anonymous callers are sent to the login page
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|context| context.user.clone())
            .map(AuthenticatedUser)
            .ok_or_else(redirect_to_login)
    }
}

/// A signed-in admin; other signed-in users get 403
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Admin access required", "kind": "forbidden" })),
            )
                .into_response());
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_wins_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 10.0.0.1"),
        );
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));

        assert_eq!(client_ip(&headers, &extensions, true), "1.2.3.4");
        assert_eq!(client_ip(&HeaderMap::new(), &extensions, true), "127.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new(), true), "unknown");
    }

    #[test]
    fn forwarded_for_ignored_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 9000))));

        assert_eq!(client_ip(&headers, &extensions, false), "10.0.0.7");
        assert_eq!(client_ip(&headers, &Extensions::new(), false), "unknown");
    }

    #[test]
    fn user_agent_is_truncated() {
        let mut headers = HeaderMap::new();
        let long = "x".repeat(800);
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&long).unwrap());

        assert_eq!(user_agent(&headers).unwrap().len(), MAX_USER_AGENT_LENGTH);
    }
}
