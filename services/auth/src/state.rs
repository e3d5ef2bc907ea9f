//! Shared state for the authentication layer

use std::sync::Arc;

use crate::service::AuthService;
use crate::session_store::ClientSessionStore;

/// Handed to the auth routes and middleware
#[derive(Clone)]
pub struct AuthState {
    pub service: AuthService,
    pub client_sessions: Arc<dyn ClientSessionStore>,
}

impl AuthState {
    pub fn new(service: AuthService, client_sessions: Arc<dyn ClientSessionStore>) -> Self {
        Self {
            service,
            client_sessions,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.service.config().cookie_name
    }

    pub fn trust_forwarded_for(&self) -> bool {
        self.service.config().trust_forwarded_for
    }

    /// TTL for client session entries; matches the server-side session lifetime
    pub fn client_session_ttl_seconds(&self) -> u64 {
        u64::try_from(self.service.config().session_ttl().num_seconds()).unwrap_or(0)
    }
}
