//! Session validation and API-key middleware

use axum::{
    Json,
    extract::{Request, State},
    http::{Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::context::{RequestContext, redirect_to_login};
use crate::error::AuthError;
use crate::service::SessionCheck;
use crate::state::AuthState;

/// Paths served without touching the session machinery
pub const BYPASS_PATHS: &[&str] = &["/health", "/test"];

/// What the middleware decided about the caller
enum Resolution {
    Anonymous,
    /// Stored state was stale; forget it and continue anonymously
    Forget,
    /// The session was presented from a different address
    Compromised,
    Authenticated(RequestContext),
}

/// Resolve the caller before any handler runs
///
/// Infrastructure failures degrade to an anonymous request. The only outcome
/// visible to the user is an IP mismatch, which redirects to the login page.
pub async fn session_middleware(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let mut context =
        RequestContext::anonymous(req.headers(), req.extensions(), state.trust_forwarded_for());

    if req.method() == Method::HEAD || BYPASS_PATHS.contains(&req.uri().path()) {
        req.extensions_mut().insert(context);
        return next.run(req).await;
    }

    let sid = jar.get(state.cookie_name()).map(|c| c.value().to_string());

    let resolution = match sid {
        Some(sid) => resolve(&state, sid, &context).await,
        None => Resolution::Anonymous,
    };

    match resolution {
        Resolution::Anonymous => {
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Resolution::Forget => {
            req.extensions_mut().insert(context);
            let response = next.run(req).await;
            (jar.remove(removal_cookie(&state)), response).into_response()
        }
        Resolution::Compromised => {
            (jar.remove(removal_cookie(&state)), redirect_to_login()).into_response()
        }
        Resolution::Authenticated(resolved) => {
            context = resolved;
            req.extensions_mut().insert(context);
            next.run(req).await
        }
    }
}

async fn resolve(state: &AuthState, sid: String, context: &RequestContext) -> Resolution {
    let client_session = match state.client_sessions.load(&sid).await {
        Ok(Some(client_session)) => client_session,
        Ok(None) => return Resolution::Forget,
        Err(e) => {
            warn!("Client session store unavailable, continuing anonymously: {:#}", e);
            return Resolution::Anonymous;
        }
    };

    let check = state
        .service
        .check_session(
            client_session.user_id,
            client_session.session_token.as_deref(),
            &context.client_ip,
            Utc::now(),
        )
        .await;

    match check {
        Ok(SessionCheck::Anonymous) => Resolution::Anonymous,
        Ok(SessionCheck::Authenticated(user)) => Resolution::Authenticated(RequestContext {
            user: Some(user),
            sid: Some(sid),
            ..context.clone()
        }),
        Ok(SessionCheck::Cleared(reason)) => {
            info!("Dropping stale browser session ({:?})", reason);
            forget(state, &sid).await;
            Resolution::Forget
        }
        Ok(SessionCheck::IpMismatch) => {
            forget(state, &sid).await;
            Resolution::Compromised
        }
        Err(e) => {
            warn!("Session validation failed, continuing anonymously: {}", e);
            Resolution::Anonymous
        }
    }
}

async fn forget(state: &AuthState, sid: &str) {
    if let Err(e) = state.client_sessions.remove(sid).await {
        warn!("Failed to remove client session: {:#}", e);
    }
}

fn removal_cookie(state: &AuthState) -> Cookie<'static> {
    Cookie::build(state.cookie_name().to_string())
        .path("/")
        .build()
}

/// Bearer API-key authentication for `/api/*`
///
/// On success the key's owner becomes the request's user.
pub async fn api_key_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let key = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string);

    let Some(key) = key else {
        return unauthorized("API key required");
    };

    match state.service.authenticate_api_key(&key, Utc::now()).await {
        Ok(user) => {
            let context = RequestContext {
                user: Some(user),
                ..RequestContext::anonymous(
                    req.headers(),
                    req.extensions(),
                    state.trust_forwarded_for(),
                )
            };
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(AuthError::Unauthorized) => unauthorized("Invalid or expired API key"),
        Err(e) => e.into_response(),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message, "kind": "unauthorized" })),
    )
        .into_response()
}
