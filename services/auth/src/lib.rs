//! Authentication layer for the campus stationery store
//!
//! Credential store, login-attempt ledger, session registry, the
//! authentication service with rate limiting and TOTP, the session
//! validation middleware and bearer API keys.

pub mod config;
pub mod context;
pub mod error;
pub mod middleware;
pub mod models;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod service;
pub mod session_store;
pub mod state;
pub mod totp;
pub mod validation;

pub use config::AuthConfig;
pub use context::{AdminUser, AuthenticatedUser, RequestContext};
pub use error::{AuthError, AuthResult};
pub use repositories::AuthRepositories;
pub use service::AuthService;
pub use state::AuthState;
