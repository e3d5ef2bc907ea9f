//! Authentication service
//!
//! Credential checks, rate limiting, the optional second factor, session
//! issuance and validation, API keys and the admin security overview.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::models::{
    ActiveSession, ApiKey, LoginAttempt, NewApiKey, NewLoginAttempt, NewSession, NewUser, Role,
    SuspiciousIp, User,
};
use crate::password::{
    hash_password, new_api_key, new_session_token, random_token, verify_dummy_password,
    verify_password,
};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::repositories::AuthRepositories;
use crate::totp::{self, Enrollment};
use crate::validation;

/// Which column the login identifier is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    /// `/login`, used by staff
    Username,
    /// `/student/login`
    Email,
}

/// One login attempt as submitted
#[derive(Debug, Clone)]
pub struct LoginRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
    pub totp_code: Option<&'a str>,
    pub client_ip: &'a str,
    pub user_agent: Option<&'a str>,
}

/// A committed login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: ActiveSession,
}

/// Result of checking a browser's stored credentials against the registry
#[derive(Debug, Clone)]
pub enum SessionCheck {
    /// Nothing stored for this browser
    Anonymous,
    /// Something was stored but is no longer valid; drop it quietly
    Cleared(ClearReason),
    /// The session was opened from another address; it has been revoked
    IpMismatch,
    Authenticated(User),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    UserMissing,
    MissingToken,
    UnknownSession,
    Expired,
}

/// Read-side summary for the admin security page
#[derive(Debug, Clone, Serialize)]
pub struct SecurityOverview {
    pub failed_attempts: Vec<LoginAttempt>,
    pub suspicious_ips: Vec<SuspiciousIp>,
    pub active_sessions: Vec<ActiveSession>,
}

/// Window used by the security overview
const OVERVIEW_WINDOW_HOURS: i64 = 24;
const OVERVIEW_ATTEMPT_LIMIT: i64 = 50;
const SUSPICIOUS_IP_THRESHOLD: i64 = 5;

#[derive(Clone)]
pub struct AuthService {
    repos: AuthRepositories,
    config: AuthConfig,
    rate_limiter: RateLimiter,
}

impl AuthService {
    pub fn new(repos: AuthRepositories, config: AuthConfig) -> Self {
        let rate_limiter = RateLimiter::new(RateLimiterConfig::from(&config), repos.attempts.clone());
        Self {
            repos,
            config,
            rate_limiter,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn repositories(&self) -> &AuthRepositories {
        &self.repos
    }

    /// Authenticate a user and open a server-side session
    pub async fn login(
        &self,
        method: LoginMethod,
        request: LoginRequest<'_>,
    ) -> AuthResult<LoginOutcome> {
        let identifier = request.identifier.trim();
        if identifier.is_empty() || request.password.is_empty() {
            return Err(AuthError::Validation(match method {
                LoginMethod::Username => "Username and password are required".to_string(),
                LoginMethod::Email => "Email and password are required".to_string(),
            }));
        }

        let now = Utc::now();
        if !self.rate_limiter.is_allowed(request.client_ip, now).await? {
            info!(
                "Rejected login for {} from {}: rate limited",
                identifier, request.client_ip
            );
            return Err(AuthError::RateLimited);
        }

        let user = match method {
            LoginMethod::Username => self.repos.users.find_by_username(identifier).await?,
            LoginMethod::Email => self.repos.users.find_by_email(identifier).await?,
        };

        let user = match user {
            Some(user) if verify_password(request.password, &user.password_hash) => Some(user),
            Some(_) => None,
            None => {
                verify_dummy_password(request.password);
                None
            }
        };
        let Some(user) = user else {
            self.repos
                .attempts
                .record(&NewLoginAttempt::failed(
                    identifier,
                    request.client_ip,
                    request.user_agent,
                ))
                .await?;
            warn!("Failed login for {} from {}", identifier, request.client_ip);
            return Err(AuthError::InvalidCredentials);
        };

        if let Some(secret) = user.active_totp_secret() {
            let code = request
                .totp_code
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .ok_or(AuthError::SecondFactorRequired)?;
            if !totp::verify_code(secret, &self.config.totp_issuer, &user.username, code) {
                warn!(
                    "Invalid second factor for {} from {}",
                    identifier, request.client_ip
                );
                return Err(AuthError::InvalidSecondFactor);
            }
        }

        let outcome = self
            .open_session(user, identifier, request.client_ip, request.user_agent, now)
            .await?;
        info!("Successful login for {} from {}", identifier, request.client_ip);
        Ok(outcome)
    }

    async fn open_session(
        &self,
        user: User,
        typed_identifier: &str,
        client_ip: &str,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> AuthResult<LoginOutcome> {
        let new_session = NewSession {
            user_id: user.id,
            session_token: new_session_token(),
            ip_address: client_ip.to_string(),
            user_agent: user_agent.map(str::to_string),
            created_at: now,
            expires_at: now + self.config.session_ttl(),
        };
        let mut attempt =
            NewLoginAttempt::succeeded(user.id, typed_identifier, client_ip, user_agent);
        attempt.attempted_at = now;

        let session = self
            .repos
            .sessions
            .create_for_login(&new_session, &attempt)
            .await?;

        let user = User {
            last_login_ip: Some(client_ip.to_string()),
            last_login_time: Some(now),
            ..user
        };
        Ok(LoginOutcome { user, session })
    }

    /// Create a student account and sign it in
    pub async fn register_student(
        &self,
        email: &str,
        password: &str,
        password_confirm: &str,
        client_ip: &str,
        user_agent: Option<&str>,
    ) -> AuthResult<LoginOutcome> {
        let email = email.trim();
        validation::validate_email(email).map_err(AuthError::Validation)?;
        validation::validate_new_password(password, password_confirm)
            .map_err(AuthError::Validation)?;

        if self.repos.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::Conflict("Email is already registered".to_string()));
        }

        let local_part = email.split('@').next().unwrap_or(email);
        let username = format!(
            "{}_{}",
            local_part,
            random_token(8).to_lowercase()
        );
        let new_user = NewUser {
            username,
            email: Some(email.to_string()),
            password_hash: hash_password(password)?,
            role: Role::Student,
        };

        let user = self.repos.users.create(&new_user).await.map_err(|e| {
            if common::error::is_unique_violation_any(&e) {
                AuthError::Conflict("Email is already registered".to_string())
            } else {
                AuthError::from(e)
            }
        })?;
        info!("Registered student {} ({})", user.username, email);

        self.open_session(user, email, client_ip, user_agent, Utc::now())
            .await
    }

    /// Create the configured admin account if it does not exist yet
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> AuthResult<Option<User>> {
        validation::validate_username(username).map_err(AuthError::Validation)?;
        validation::validate_new_password(password, password).map_err(AuthError::Validation)?;

        if self.repos.users.find_by_username(username).await?.is_some() {
            return Ok(None);
        }

        let user = self
            .repos
            .users
            .create(&NewUser {
                username: username.to_string(),
                email: None,
                password_hash: hash_password(password)?,
                role: Role::Admin,
            })
            .await?;
        info!("Bootstrapped admin account {}", user.username);
        Ok(Some(user))
    }

    /// Revoke the server-side session behind a browser
    pub async fn logout(&self, session_token: Option<&str>) -> AuthResult<()> {
        let Some(token) = session_token else {
            return Ok(());
        };
        if self.repos.sessions.deactivate_by_token(token).await? {
            info!("Session revoked on logout");
        }
        Ok(())
    }

    /// Decide what a stored (user id, token) pair is worth for this request
    pub async fn check_session(
        &self,
        user_id: Option<Uuid>,
        session_token: Option<&str>,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<SessionCheck> {
        let Some(user_id) = user_id else {
            return Ok(SessionCheck::Anonymous);
        };

        let Some(user) = self.repos.users.find_by_id(user_id).await? else {
            return Ok(SessionCheck::Cleared(ClearReason::UserMissing));
        };

        let Some(token) = session_token else {
            return Ok(SessionCheck::Cleared(ClearReason::MissingToken));
        };

        let Some(session) = self.repos.sessions.find_active(user_id, token).await? else {
            return Ok(SessionCheck::Cleared(ClearReason::UnknownSession));
        };

        if session.is_expired(now) {
            self.repos.sessions.deactivate(session.id).await?;
            return Ok(SessionCheck::Cleared(ClearReason::Expired));
        }

        if session.ip_address != client_ip {
            warn!(
                "Session for {} opened from {} presented from {}; revoking",
                user.username, session.ip_address, client_ip
            );
            self.repos.sessions.deactivate(session.id).await?;
            return Ok(SessionCheck::IpMismatch);
        }

        self.repos.sessions.touch(session.id, now).await?;
        Ok(SessionCheck::Authenticated(user))
    }

    /// Start 2FA setup; the caller keeps the secret until it is confirmed
    pub fn begin_two_factor(&self, user: &User) -> AuthResult<Enrollment> {
        if user.two_fa_enabled {
            return Err(AuthError::Conflict(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }
        Ok(totp::begin_enrollment(&self.config.totp_issuer, &user.username)?)
    }

    /// Store the pending secret once the user proves they can produce codes
    pub async fn confirm_two_factor(
        &self,
        user: &User,
        pending_secret: Option<&str>,
        code: &str,
    ) -> AuthResult<()> {
        let secret = pending_secret.ok_or_else(|| {
            AuthError::Validation("Start two-factor setup before verifying a code".to_string())
        })?;
        if !totp::verify_code(secret, &self.config.totp_issuer, &user.username, code) {
            return Err(AuthError::InvalidSecondFactor);
        }

        self.repos
            .users
            .set_two_factor(user.id, Some(secret), true)
            .await?;
        info!("Two-factor authentication enabled for {}", user.username);
        Ok(())
    }

    pub async fn disable_two_factor(&self, user: &User, password: &str) -> AuthResult<()> {
        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        self.repos.users.set_two_factor(user.id, None, false).await?;
        info!("Two-factor authentication disabled for {}", user.username);
        Ok(())
    }

    /// Issue a bearer key for programmatic clients; the key is only shown once
    pub async fn create_api_key(
        &self,
        owner: &User,
        name: &str,
        expires_in_days: Option<i64>,
    ) -> AuthResult<ApiKey> {
        let name = name.trim();
        if name.is_empty() || name.len() > 100 {
            return Err(AuthError::Validation(
                "Key name must be between 1 and 100 characters".to_string(),
            ));
        }
        if expires_in_days.is_some_and(|days| days < 1) {
            return Err(AuthError::Validation(
                "Expiry must be at least one day".to_string(),
            ));
        }

        let key = self
            .repos
            .api_keys
            .create(&NewApiKey {
                key: new_api_key(),
                name: name.to_string(),
                user_id: owner.id,
                expires_at: expires_in_days.map(|days| Utc::now() + Duration::days(days)),
            })
            .await?;
        info!("API key '{}' issued to {}", key.name, owner.username);
        Ok(key)
    }

    /// Resolve a bearer key to its owner and record the use
    pub async fn authenticate_api_key(&self, key: &str, now: DateTime<Utc>) -> AuthResult<User> {
        let key = self
            .repos
            .api_keys
            .find_by_key(key)
            .await?
            .filter(|k| k.is_usable(now))
            .ok_or(AuthError::Unauthorized)?;

        let owner = self
            .repos
            .users
            .find_by_id(key.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        self.repos.api_keys.mark_used(key.id, now).await?;
        Ok(owner)
    }

    pub async fn security_overview(&self, now: DateTime<Utc>) -> AuthResult<SecurityOverview> {
        let since = now - Duration::hours(OVERVIEW_WINDOW_HOURS);
        Ok(SecurityOverview {
            failed_attempts: self
                .repos
                .attempts
                .recent_failures(since, OVERVIEW_ATTEMPT_LIMIT)
                .await?,
            suspicious_ips: self
                .repos
                .attempts
                .suspicious_ips(since, SUSPICIOUS_IP_THRESHOLD)
                .await?,
            active_sessions: self.repos.sessions.list_valid(now).await?,
        })
    }

    /// Delete expired session rows
    pub async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let removed = self.repos.sessions.delete_expired(now).await?;
        if removed > 0 {
            info!("Removed {} expired sessions", removed);
        }
        Ok(removed)
    }

    /// Mark every session inactive; run once at startup
    pub async fn reconcile_sessions(&self) -> AuthResult<u64> {
        let count = self.repos.sessions.deactivate_all().await?;
        info!("Startup reconciliation deactivated {} sessions", count);
        Ok(count)
    }
}
