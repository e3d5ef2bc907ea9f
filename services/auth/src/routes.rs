//! Authentication service routes

use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::{
    WithRejection,
    cookie::{Cookie, CookieJar, SameSite},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::context::{AdminUser, AuthenticatedUser, RequestContext};
use crate::error::{AuthError, AuthResult};
use crate::service::{LoginMethod, LoginOutcome, LoginRequest};
use crate::session_store::{ClientSession, new_sid};
use crate::state::AuthState;
use crate::validation::safe_redirect_target;

// Malformed input answers with the usual JSON error body
type FormBody<T> = WithRejection<Form<T>, AuthError>;
type JsonBody<T> = WithRejection<Json<T>, AuthError>;
type QueryParams<T> = WithRejection<Query<T>, AuthError>;

/// `?next=` on the login endpoints
#[derive(Debug, Default, Deserialize)]
pub struct NextParam {
    pub next: Option<String>,
}

/// Staff login form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub totp_token: Option<String>,
}

/// Student login form
#[derive(Debug, Deserialize)]
pub struct StudentLoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub totp_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterStudentForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorAction {
    Enable,
    Verify,
    Disable,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorForm {
    pub action: TwoFactorAction,
    pub code: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub expires_in_days: Option<i64>,
}

/// The key itself is only ever returned here
#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Create the router for the authentication endpoints
pub fn create_router(state: AuthState) -> Router {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/student/login", post(student_login))
        .route("/register_student", post(register_student))
        .route("/logout", get(logout).post(logout))
        .route("/2fa/setup", post(setup_two_factor))
        .route("/admin/security", get(security_overview))
        .route("/admin/api-keys", post(create_api_key))
        .with_state(state)
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Failed logins re-render the form: 200 with the error in the body
fn login_failure(error: AuthError) -> Response {
    let message = match &error {
        AuthError::Internal(_) => "Login is temporarily unavailable".to_string(),
        other => other.to_string(),
    };
    (
        StatusCode::OK,
        Json(json!({ "error": message, "kind": error.kind() })),
    )
        .into_response()
}

fn session_cookie(state: &AuthState, sid: String) -> Cookie<'static> {
    Cookie::build((state.cookie_name().to_string(), sid))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.service.config().cookie_secure)
        .build()
}

/// Bind a fresh browser session to a committed login and redirect
async fn complete_login(
    state: &AuthState,
    jar: CookieJar,
    outcome: LoginOutcome,
    next: Option<&str>,
) -> AuthResult<Response> {
    // never reuse a pre-login sid
    if let Some(old_sid) = jar.get(state.cookie_name()).map(|c| c.value().to_string()) {
        state.client_sessions.remove(&old_sid).await?;
    }

    let sid = new_sid();
    let client_session =
        ClientSession::authenticated(outcome.user.id, outcome.session.session_token);
    state
        .client_sessions
        .save(&sid, &client_session, state.client_session_ttl_seconds())
        .await?;

    let target = safe_redirect_target(next).unwrap_or("/");
    Ok((jar.add(session_cookie(state, sid)), redirect(target)).into_response())
}

/// Target of the login redirects: describes the two login forms
async fn login_page(
    WithRejection(Query(params), _): QueryParams<NextParam>,
    context: RequestContext,
) -> Response {
    if context.is_authenticated() {
        return redirect("/");
    }
    Json(json!({
        "forms": [
            {
                "action": "/login",
                "fields": ["username", "password", "totp_token"],
            },
            {
                "action": "/student/login",
                "fields": ["email", "password", "totp_token"],
            },
        ],
        "next": safe_redirect_target(params.next.as_deref()),
    }))
    .into_response()
}

async fn login(
    State(state): State<AuthState>,
    WithRejection(Query(params), _): QueryParams<NextParam>,
    context: RequestContext,
    jar: CookieJar,
    WithRejection(Form(form), _): FormBody<LoginForm>,
) -> Response {
    if context.is_authenticated() {
        return redirect("/");
    }

    let request = LoginRequest {
        identifier: &form.username,
        password: &form.password,
        totp_code: form.totp_token.as_deref(),
        client_ip: &context.client_ip,
        user_agent: context.user_agent.as_deref(),
    };

    let result = match state.service.login(LoginMethod::Username, request).await {
        Ok(outcome) => complete_login(&state, jar, outcome, params.next.as_deref()).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(login_failure)
}

async fn student_login(
    State(state): State<AuthState>,
    WithRejection(Query(params), _): QueryParams<NextParam>,
    context: RequestContext,
    jar: CookieJar,
    WithRejection(Form(form), _): FormBody<StudentLoginForm>,
) -> Response {
    if context.is_authenticated() {
        return redirect("/");
    }

    let request = LoginRequest {
        identifier: &form.email,
        password: &form.password,
        totp_code: form.totp_token.as_deref(),
        client_ip: &context.client_ip,
        user_agent: context.user_agent.as_deref(),
    };

    let result = match state.service.login(LoginMethod::Email, request).await {
        Ok(outcome) => complete_login(&state, jar, outcome, params.next.as_deref()).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(login_failure)
}

async fn register_student(
    State(state): State<AuthState>,
    context: RequestContext,
    jar: CookieJar,
    WithRejection(Form(form), _): FormBody<RegisterStudentForm>,
) -> Response {
    if context.is_authenticated() {
        return redirect("/");
    }

    let result = match state
        .service
        .register_student(
            &form.email,
            &form.password,
            &form.password_confirm,
            &context.client_ip,
            context.user_agent.as_deref(),
        )
        .await
    {
        Ok(outcome) => complete_login(&state, jar, outcome, None).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(login_failure)
}

/// Revoke the server session, drop the browser session and expire the cookie
async fn logout(State(state): State<AuthState>, jar: CookieJar) -> Response {
    if let Some(sid) = jar.get(state.cookie_name()).map(|c| c.value().to_string()) {
        match state.client_sessions.load(&sid).await {
            Ok(Some(client_session)) => {
                if let Err(e) = state
                    .service
                    .logout(client_session.session_token.as_deref())
                    .await
                {
                    warn!("Failed to revoke session on logout: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Client session store unavailable on logout: {:#}", e),
        }
        if let Err(e) = state.client_sessions.remove(&sid).await {
            warn!("Failed to remove client session on logout: {:#}", e);
        }
    }

    let removal = Cookie::build(state.cookie_name().to_string())
        .path("/")
        .build();
    (jar.remove(removal), redirect("/")).into_response()
}

async fn setup_two_factor(
    State(state): State<AuthState>,
    AuthenticatedUser(user): AuthenticatedUser,
    context: RequestContext,
    WithRejection(Form(form), _): FormBody<TwoFactorForm>,
) -> AuthResult<Response> {
    let sid = context.sid.ok_or(AuthError::Unauthorized)?;
    let ttl = state.client_session_ttl_seconds();

    match form.action {
        TwoFactorAction::Enable => {
            let enrollment = state.service.begin_two_factor(&user)?;
            let mut client_session = state
                .client_sessions
                .load(&sid)
                .await?
                .ok_or(AuthError::Unauthorized)?;
            client_session.pending_totp_secret = Some(enrollment.secret.clone());
            state.client_sessions.save(&sid, &client_session, ttl).await?;

            Ok(Json(json!({
                "secret": enrollment.secret,
                "provisioning_url": enrollment.provisioning_url,
            }))
            .into_response())
        }
        TwoFactorAction::Verify => {
            let mut client_session = state
                .client_sessions
                .load(&sid)
                .await?
                .ok_or(AuthError::Unauthorized)?;
            let code = form.code.unwrap_or_default();
            state
                .service
                .confirm_two_factor(&user, client_session.pending_totp_secret.as_deref(), &code)
                .await?;
            client_session.pending_totp_secret = None;
            state.client_sessions.save(&sid, &client_session, ttl).await?;

            Ok(Json(json!({ "two_fa_enabled": true })).into_response())
        }
        TwoFactorAction::Disable => {
            let password = form.password.unwrap_or_default();
            state.service.disable_two_factor(&user, &password).await?;
            Ok(Json(json!({ "two_fa_enabled": false })).into_response())
        }
    }
}

async fn security_overview(
    State(state): State<AuthState>,
    AdminUser(_admin): AdminUser,
) -> AuthResult<impl IntoResponse> {
    let overview = state.service.security_overview(Utc::now()).await?;
    Ok(Json(overview))
}

async fn create_api_key(
    State(state): State<AuthState>,
    AdminUser(admin): AdminUser,
    WithRejection(Json(payload), _): JsonBody<CreateApiKeyRequest>,
) -> AuthResult<impl IntoResponse> {
    let key = state
        .service
        .create_api_key(&admin, &payload.name, payload.expires_in_days)
        .await?;

    let response = CreateApiKeyResponse {
        id: key.id,
        key: key.key,
        name: key.name,
        expires_at: key.expires_at,
    };
    Ok((StatusCode::CREATED, Json(response)))
}
