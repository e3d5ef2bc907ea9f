//! Authentication service models

pub mod api_key;
pub mod login_attempt;
pub mod session;
pub mod user;

// Re-export for convenience
pub use api_key::{ApiKey, NewApiKey};
pub use login_attempt::{LoginAttempt, NewLoginAttempt, SuspiciousIp};
pub use session::{ActiveSession, NewSession};
pub use user::{NewUser, Role, User};
