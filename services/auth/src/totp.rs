//! Time-based one-time codes (SHA-1, 6 digits, 30 s step, one step of skew)

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

/// A secret waiting for its first code before it is stored on the account
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub secret: String,
    pub provisioning_url: String,
}

fn build(secret_base32: &str, issuer: &str, account: &str) -> Result<TOTP> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| anyhow!("Invalid TOTP secret: {e:?}"))?;
    from_bytes(secret_bytes, issuer, account)
}

fn from_bytes(secret_bytes: Vec<u8>, issuer: &str, account: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| anyhow!("TOTP init error: {e}"))
}

/// Generate a fresh base32 secret and its `otpauth://` URL
pub fn begin_enrollment(issuer: &str, account: &str) -> Result<Enrollment> {
    let secret_bytes = Secret::generate_secret()
        .to_bytes()
        .map_err(|e| anyhow!("Secret gen error: {e:?}"))?;
    let totp = from_bytes(secret_bytes, issuer, account)?;
    Ok(Enrollment {
        secret: totp.get_secret_base32(),
        provisioning_url: totp.get_url(),
    })
}

/// Check a code against the current window. Bad secrets and clock errors fail closed.
pub fn verify_code(secret_base32: &str, issuer: &str, account: &str, code: &str) -> bool {
    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    build(secret_base32, issuer, account)
        .map(|totp| totp.check_current(code).unwrap_or(false))
        .unwrap_or(false)
}

/// Current code for a secret; used by tests and tooling
pub fn current_code(secret_base32: &str, issuer: &str, account: &str) -> Result<String> {
    let totp = build(secret_base32, issuer, account)?;
    totp.generate_current()
        .map_err(|e| anyhow!("System clock error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "Campus Stationery";

    #[test]
    fn enrollment_produces_usable_secret() {
        let enrollment = begin_enrollment(ISSUER, "alice").unwrap();
        assert!(enrollment.provisioning_url.starts_with("otpauth://totp/"));

        let code = current_code(&enrollment.secret, ISSUER, "alice").unwrap();
        assert!(verify_code(&enrollment.secret, ISSUER, "alice", &code));
    }

    #[test]
    fn rejects_malformed_codes() {
        let enrollment = begin_enrollment(ISSUER, "bob").unwrap();
        assert!(!verify_code(&enrollment.secret, ISSUER, "bob", ""));
        assert!(!verify_code(&enrollment.secret, ISSUER, "bob", "12a456"));
        assert!(!verify_code("not base32!", ISSUER, "bob", "123456"));
    }
}
