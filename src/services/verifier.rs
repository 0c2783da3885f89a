use log::debug;
use thiserror::Error;

use crate::models::Destination;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verifier is not configured: {0}")]
    NotConfigured(String),

    #[error("verification request failed: {0}")]
    Request(String),
}

/// Decides whether a submitted code is the one that was issued.
#[rocket::async_trait]
pub trait CodeVerifier: Send + Sync {
    async fn verify(&self, destination: &Destination, code: &str) -> Result<bool, VerifierError>;
}

/// Accepts exactly one well-known code, whatever the destination.
pub struct FixedCodeVerifier {
    expected: String,
}

impl FixedCodeVerifier {
    pub fn new(expected: impl Into<String>) -> Self {
        FixedCodeVerifier {
            expected: expected.into(),
        }
    }
}

#[rocket::async_trait]
impl CodeVerifier for FixedCodeVerifier {
    async fn verify(&self, destination: &Destination, code: &str) -> Result<bool, VerifierError> {
        debug!("Checking fixed code for {}", destination.mobile);
        Ok(code == self.expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_verifier_matches_only_expected_code() {
        let verifier = FixedCodeVerifier::new("000000");
        let destination = Destination::new("9876543210", "+91");

        assert!(verifier.verify(&destination, "000000").await.unwrap());
        assert!(!verifier.verify(&destination, "111111").await.unwrap());
    }
}
