//! TOTP (Time-based One-Time Password) module for MFA
//!
//! Provides TOTP generation, verification, and QR code generation
//! compatible with Google Authenticator, Authy, and other TOTP apps.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};

/// TOTP code length (standard is 6 digits)
pub const TOTP_DIGITS: usize = 6;

/// Time step in seconds (standard is 30 seconds)
pub const TOTP_STEP: u64 = 30;

/// Issuer name shown in authenticator apps
pub const TOTP_ISSUER: &str = "Repforge";

#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    #[error("Invalid TOTP secret")]
    InvalidSecret,
    #[error("Failed to create TOTP instance")]
    Creation,
    #[error("Failed to generate QR code")]
    QrGeneration,
}

/// Generate a new TOTP secret (base32 encoded, 160 bits)
pub fn generate_secret() -> String {
    let secret = Secret::generate_secret();
    secret.to_encoded().to_string()
}

/// Create a TOTP instance for verification
pub fn create_totp(secret: &str, username: &str) -> Result<TOTP, TotpError> {
    let secret_bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|_| TotpError::InvalidSecret)?;

    TOTP::new(
        Algorithm::SHA1, // SHA1 is standard for TOTP compatibility
        TOTP_DIGITS,
        1, // skew: allow 1 step before/after for clock drift
        TOTP_STEP,
        secret_bytes,
        Some(TOTP_ISSUER.to_string()),
        username.to_string(),
    )
    .map_err(|_| TotpError::Creation)
}

/// Verify a TOTP code against a secret using constant-time comparison
///
/// Timing attacks could allow an attacker to determine how many digits
/// match, reducing the brute-force search space.
pub fn verify_code(secret: &str, code: &str, username: &str) -> Result<bool, TotpError> {
    let totp = create_totp(secret, username)?;

    // Validate code format (must be 6 digits)
    if code.len() != TOTP_DIGITS {
        return Ok(false);
    }
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }

    let current_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| TotpError::Creation)?
        .as_secs();

    // skew=1 means we check time-30s, time, time+30s
    let time_steps = [
        current_time.saturating_sub(TOTP_STEP),
        current_time,
        current_time.saturating_add(TOTP_STEP),
    ];

    let code_bytes = code.as_bytes();

    for time_step in time_steps {
        let expected_code = totp.generate(time_step);
        let expected_bytes = expected_code.as_bytes();
        if code_bytes.len() == expected_bytes.len() && code_bytes.ct_eq(expected_bytes).into() {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Generate the current TOTP code (for tests and enrollment previews)
pub fn generate_current_code(secret: &str, username: &str) -> Result<String, TotpError> {
    let totp = create_totp(secret, username)?;
    totp.generate_current().map_err(|_| TotpError::Creation)
}

/// Generate QR code as base64 PNG data URL
pub fn generate_qr_code(secret: &str, username: &str) -> Result<String, TotpError> {
    let totp = create_totp(secret, username)?;
    let uri = totp.get_url();

    let qr = qrcode::QrCode::new(uri.as_bytes()).map_err(|_| TotpError::QrGeneration)?;
    let qr_image = qr.render::<image::Luma<u8>>().build();

    let dynamic_image = image::DynamicImage::ImageLuma8(qr_image);
    let mut png_data = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut png_data);
    dynamic_image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|_| TotpError::QrGeneration)?;

    Ok(format!(
        "data:image/png;base64,{}",
        BASE64.encode(&png_data)
    ))
}

/// Get the otpauth URI for manual entry
pub fn get_otpauth_uri(secret: &str, username: &str) -> Result<String, TotpError> {
    let totp = create_totp(secret, username)?;
    Ok(totp.get_url())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_is_base32() {
        let secret = generate_secret();
        assert!(!secret.is_empty());
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        // 160 bits -> 32 base32 chars
        assert_eq!(secret.len(), 32);
    }

    #[test]
    fn test_secrets_are_unique() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn test_verify_current_code() {
        let secret = generate_secret();
        let code = generate_current_code(&secret, "alice").unwrap();
        assert!(verify_code(&secret, &code, "alice").unwrap());
    }

    #[test]
    fn test_verify_rejects_wrong_code() {
        let secret = generate_secret();
        let code = generate_current_code(&secret, "alice").unwrap();
        // Flip the last digit
        let wrong: String = code
            .chars()
            .take(5)
            .chain(std::iter::once(if code.ends_with('0') { '1' } else { '0' }))
            .collect();
        assert!(!verify_code(&secret, &wrong, "alice").unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let secret = generate_secret();
        assert!(!verify_code(&secret, "12345", "alice").unwrap());
        assert!(!verify_code(&secret, "1234567", "alice").unwrap());
        assert!(!verify_code(&secret, "12345a", "alice").unwrap());
        assert!(!verify_code(&secret, "", "alice").unwrap());
    }

    #[test]
    fn test_verify_accepts_adjacent_window() {
        let secret = generate_secret();
        let totp = create_totp(&secret, "alice").unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        // Previous and next step are inside the skew window
        assert!(verify_code(&secret, &totp.generate(now - TOTP_STEP), "alice").unwrap());
        assert!(verify_code(&secret, &totp.generate(now + TOTP_STEP), "alice").unwrap());
    }

    #[test]
    fn test_verify_rejects_outside_window() {
        let secret = generate_secret();
        let totp = create_totp(&secret, "alice").unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        // Two steps away is beyond the skew window; guard against the rare
        // collision where a distant window emits the same 6 digits
        let far_code = totp.generate(now - 10 * TOTP_STEP);
        if far_code != totp.generate(now)
            && far_code != totp.generate(now - TOTP_STEP)
            && far_code != totp.generate(now + TOTP_STEP)
        {
            assert!(!verify_code(&secret, &far_code, "alice").unwrap());
        }
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(matches!(
            create_totp("not base32 !!!", "alice"),
            Err(TotpError::InvalidSecret)
        ));
    }

    #[test]
    fn test_otpauth_uri_contains_issuer_and_account() {
        let secret = generate_secret();
        let uri = get_otpauth_uri(&secret, "alice").unwrap();
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("Repforge"));
        assert!(uri.contains("alice"));
    }

    #[test]
    fn test_qr_code_is_png_data_url() {
        let secret = generate_secret();
        let qr = generate_qr_code(&secret, "alice").unwrap();
        assert!(qr.starts_with("data:image/png;base64,"));
    }
}
