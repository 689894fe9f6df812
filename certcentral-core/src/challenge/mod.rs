//! Challenge fulfillers: http-01 file placement and dns-01
//! TXT record placement via a pluggable [`crate::dns::DnsProvider`].
//!
//! Both fulfillers expose the same two-operation shape:
//! `provision` (idempotent under the same challenge identity) and
//! `cleanup` (best-effort, never on the success path).

pub mod dns01;
pub mod http01;

pub use dns01::Dns01Fulfiller;
pub use http01::Http01Fulfiller;

use async_trait::async_trait;

use crate::error::ChallengeProvisionError;

/// One challenge awaiting fulfillment, as handed to a fulfiller by the
/// ACME client.
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    /// The identifier (DNS name) this challenge proves control of.
    pub identifier: String,
    /// http-01 token, or the value already computed for dns-01.
    pub token: String,
    /// `token || '.' || base64url(JWK thumbprint)`.
    pub key_authorization: String,
}

/// Unifies the http-01 and dns-01 fulfillers behind one capability so the
/// ACME client's order-authorization loop does not need to know which
/// challenge type a certificate uses (a fulfiller's single capability:
/// `provision`/`cleanup`).
#[async_trait]
pub trait ChallengeFulfiller: Send + Sync {
    /// Idempotent under the same challenge identity.
    async fn provision(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError>;

    /// Best-effort; must never block the success path of an order.
    async fn cleanup(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError>;
}

#[async_trait]
impl ChallengeFulfiller for Http01Fulfiller {
    async fn provision(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError> {
        Http01Fulfiller::provision(self, challenge).await
    }

    async fn cleanup(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError> {
        Http01Fulfiller::cleanup(self, challenge).await
    }
}

#[async_trait]
impl ChallengeFulfiller for Dns01Fulfiller {
    async fn provision(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError> {
        let deadline = tokio::time::Instant::now() + self.propagation_timeout;
        Dns01Fulfiller::provision(self, challenge, deadline).await
    }

    async fn cleanup(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError> {
        Dns01Fulfiller::cleanup(self, challenge).await
    }
}
