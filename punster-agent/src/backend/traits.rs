//! Core traits for the pun creation and evaluation services.
//!
//! The network core depends only on these traits; concrete backends
//! (HTTP, mock) live beside them.

use async_trait::async_trait;

use crate::types::{Channel, DeliveryReport, Misbehavior, Pun};

/// Error types for Punster API operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PunsterError {
    /// Transport failure or non-success response
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Rate limited by the service
    #[error("Rate limited by the Punster API")]
    RateLimited,

    /// Service is not reachable or not configured
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// The response arrived but did not match the expected schema
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl PunsterError {
    /// Whether this is a decoding failure rather than a transport failure.
    pub fn is_malformed(&self) -> bool {
        matches!(self, PunsterError::Malformed(_))
    }
}

/// Creates a pun for a misbehavior.
#[async_trait]
pub trait PunCreationService: Send + Sync {
    /// Ask the service for a pun matching the misbehavior.
    async fn create_pun(&self, misbehavior: &Misbehavior) -> Result<Pun, PunsterError>;
}

/// Evaluates how a delivered pun was received.
#[async_trait]
pub trait PunEvaluationService: Send + Sync {
    /// Produce a delivery report for a pun delivered over a channel.
    async fn evaluate_pun(
        &self,
        pun: &Pun,
        misbehavior: &Misbehavior,
        channel: &Channel,
    ) -> Result<DeliveryReport, PunsterError>;
}
