//! Input validation for user-supplied configuration
//!
//! Everything here runs before any remote resource is touched, so a bad
//! value never leaves a half-created rule or a stray tunnel behind.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::SIGNING_SECRET_LENGTH;
use crate::error::{ListenError, Result};

/// Regex for validating signing secrets (32 ASCII alphanumeric characters)
static SIGNING_SECRET_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^[A-Za-z0-9]{{{}}}$", SIGNING_SECRET_LENGTH)).unwrap());

/// Regex for validating local service URLs
static SERVICE_URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/]+(/\S*)?$").unwrap());

/// Validate a webhook signing secret
///
/// # Examples
///
/// ```
/// use b2listen_common::validation::validate_signing_secret;
///
/// assert!(validate_signing_secret("abcdefghijklmnopqrstuvwxyz012345").is_ok());
/// assert!(validate_signing_secret("too-short").is_err());
/// ```
pub fn validate_signing_secret(secret: &str) -> Result<()> {
    if !SIGNING_SECRET_REGEX.is_match(secret) {
        return Err(ListenError::InvalidSigningSecret);
    }
    Ok(())
}

/// Validate the URL of the local service the tunnel forwards to
pub fn validate_service_url(url: &str) -> Result<()> {
    if !SERVICE_URL_REGEX.is_match(url) {
        return Err(ListenError::InvalidConfig(format!(
            "Local service URL must look like http://host:port, got \"{}\"",
            url.chars().take(100).collect::<String>()
        )));
    }
    Ok(())
}
