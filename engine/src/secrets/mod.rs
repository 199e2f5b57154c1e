//! Secret handling
//!
//! The inference backend needs an API key. It is read from the environment
//! (`GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`) and wrapped in
//! [`SecretString`] so it can never leak through `Debug`/`Display` output.

mod string;

pub use string::SecretString;

/// Errors raised while resolving secrets from the environment.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("none of the environment variables {0:?} are set")]
    Missing(&'static [&'static str]),
}

/// Environment variables consulted for the inference API key, in order.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Resolve the inference API key from the environment.
///
/// Empty values are treated as unset.
pub fn api_key_from_env() -> Result<SecretString, SecretError> {
    for var in API_KEY_VARS {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Ok(SecretString::new(value));
            }
        }
    }
    Err(SecretError::Missing(API_KEY_VARS))
}
