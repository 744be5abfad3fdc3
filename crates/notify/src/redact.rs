//! Token redaction for surfaced error text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedactError {
    #[error("secret value is not valid UTF-8")]
    InvalidUtf8,
}

/// Masks configured secret values out of arbitrary text before it reaches
/// logs, events or metrics labels.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    const MASK: &'static str = "*****";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret string to be masked.
    pub fn add(&mut self, secret: impl Into<String>) {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
    }

    /// Register a secret from raw bytes. Secrets that are not valid UTF-8
    /// are rejected rather than silently skipped, since they could not be
    /// reliably masked out of textual output.
    pub fn add_bytes(&mut self, secret: &[u8]) -> Result<(), RedactError> {
        let secret = std::str::from_utf8(secret).map_err(|_| RedactError::InvalidUtf8)?;
        self.add(secret);
        Ok(())
    }

    /// Replace every occurrence of any registered secret with a mask.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            out = out.replace(secret.as_str(), Self::MASK);
        }
        out
    }
}
