use thiserror::Error;

use super::types::PaymentProvider;

#[derive(Error, Debug)]
pub enum NormalizeError {
    /// Fail-closed misconfiguration: the provider has no secret
    /// configured, so nothing can be verified. Never accept unsigned.
    #[error("No webhook secret configured for {0}")]
    MissingSecret(PaymentProvider),

    #[error("Signature verification failed for {provider}: {reason}")]
    SignatureInvalid {
        provider: PaymentProvider,
        reason: String,
    },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Well-signed event the core does not care about (e.g. a Stripe
    /// customer.updated). Acknowledged with 200, never processed.
    #[error("Ignored event type: {0}")]
    IgnoredEvent(String),
}

impl NormalizeError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            NormalizeError::MissingSecret(_) | NormalizeError::SignatureInvalid { .. }
        )
    }
}
