//! The engine-visible ACME operation set, implemented on
//! top of `instant_acme`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use instant_acme::{
    Account, AuthorizationStatus, BodyWrapper, BytesResponse, ChallengeType, HttpClient, Identifier, NewOrder,
    OrderStatus, RetryPolicy,
};
use tokio::time::Instant;

use crate::challenge::{ChallengeFulfiller, PendingChallenge};
use crate::error::{AcmeProtocolError, CertcentralError};

/// The `instant_acme::HttpClient` this engine gives every account,
/// identical in shape to ferron's `HttpsClientForAcme`:
/// a `hyper-rustls` client wired for both HTTP/1.1 and HTTP/2.
pub(super) struct HttpsClientForAcme(HyperClient<hyper_rustls::HttpsConnector<HttpConnector>, BodyWrapper<Bytes>>);

impl HttpsClientForAcme {
    pub fn new() -> Self {
        Self(
            HyperClient::builder(TokioExecutor::new()).build(
                hyper_rustls::HttpsConnectorBuilder::new()
                    .with_native_roots()
                    .expect("native root store must load")
                    .https_or_http()
                    .enable_http1()
                    .enable_http2()
                    .build(),
            ),
        )
    }
}

impl HttpClient for HttpsClientForAcme {
    fn request(&self, req: Request<BodyWrapper<Bytes>>) -> Pin<Box<dyn Future<Output = Result<BytesResponse, instant_acme::Error>> + Send>> {
        HttpClient::request(&self.0, req)
    }
}

/// One order in flight: the pending challenges the scheduler hands off to
/// fulfillers, plus enough state to finalize and download once they're
/// all valid.
pub struct AcmeOrder {
    order: instant_acme::Order,
    pub pending: Vec<(PendingChallenge, ChallengeType)>,
}

/// Thin wrapper exposing exactly the operations the scheduler needs as
/// inherent methods, each a single logical RPC against the account passed
/// in (accounts are owned by [`super::account::AccountRegistry`], not by
/// this type, since an account is long-lived process-wide state while a
/// client call is per-order).
pub struct AcmeClient;

impl AcmeClient {
    /// Starts a new order for `sans`, then for every pending authorization
    /// selects the `challenge_type` challenge, hands it to `fulfiller` for
    /// provisioning, and — only once provisioning succeeds — tells the
    /// server the challenge is ready to be validated. This single-pass
    /// shape (provision, then immediately mark ready, while the challenge
    /// handle is still in hand) mirrors ferron's
    /// `background_acme_task` loop, which never splits the two across a
    /// later call: an `instant_acme::Challenge` handle is only valid in
    /// the scope of the authorization it came from.
    ///
    /// If any authorization fails to provision, already-provisioned
    /// challenges in this order are cleaned up best-effort before the
    /// error propagates, so a partially-authorized order doesn't leak
    /// challenge records.
    pub async fn new_order(
        account: &Account,
        sans: &[String],
        challenge_type: ChallengeType,
        fulfiller: &dyn ChallengeFulfiller,
    ) -> Result<AcmeOrder, CertcentralError> {
        let identifiers: Vec<Identifier> = sans.iter().map(|s| Identifier::Dns(s.clone())).collect();
        let new_order = NewOrder::new(&identifiers);
        let mut order = account.new_order(&new_order).await.map_err(|e| acme_protocol_error(&e))?;

        let mut pending = Vec::new();
        let mut provisioned = Vec::new();
        let mut authorizations = order.authorizations();
        let mut failure = None;
        while let Some(authorization) = authorizations.next().await {
            let mut authorization = match authorization.map_err(|e| acme_protocol_error(&e).into()) {
                Ok(a) => a,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            if authorization.status == AuthorizationStatus::Valid {
                continue;
            }
            if authorization.status != AuthorizationStatus::Pending {
                failure = Some(
                    AcmeProtocolError::Malformed {
                        detail: format!("unexpected authorization status {:?}", authorization.status),
                    }
                    .into(),
                );
                break;
            }

            let mut challenge = match authorization.challenge(challenge_type.clone()) {
                Some(c) => c,
                None => {
                    failure = Some(
                        AcmeProtocolError::Malformed {
                            detail: format!("ACME server did not offer challenge type {challenge_type:?}"),
                        }
                        .into(),
                    );
                    break;
                }
            };

            let identifier = match &challenge.identifier().identifier {
                Identifier::Dns(name) => name.clone(),
                Identifier::Ip(ip) => ip.to_string(),
                other => {
                    failure = Some(
                        AcmeProtocolError::Malformed {
                            detail: format!("unsupported ACME identifier {other:?}"),
                        }
                        .into(),
                    );
                    break;
                }
            };

            let key_authorization = challenge.key_authorization();
            let pending_challenge = PendingChallenge {
                identifier,
                token: challenge.token.clone(),
                key_authorization: key_authorization.as_str().to_string(),
            };

            if let Err(e) = fulfiller.provision(&pending_challenge).await {
                failure = Some(e.into());
                break;
            }
            provisioned.push(pending_challenge.clone());

            if let Err(e) = challenge.set_ready().await {
                failure = Some(acme_protocol_error(&e).into());
                break;
            }

            pending.push((pending_challenge, challenge_type.clone()));
        }

        if let Some(err) = failure {
            for challenge in &provisioned {
                let _ = fulfiller.cleanup(challenge).await;
            }
            return Err(err);
        }

        Ok(AcmeOrder { order, pending })
    }

    /// Polls the order until every authorization reaches a terminal
    /// status or `deadline` elapses. Interval starts at 1s, doubles to a
    /// 30s cap, honoring `Retry-After` where the server sends one —
    /// delegated to `instant_acme::RetryPolicy`, which implements this
    /// exact schedule.
    pub async fn poll_authorization(order: &mut AcmeOrder, deadline: Instant) -> Result<(), CertcentralError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CertcentralError::AcmeTimeout);
        }
        tokio::time::timeout(remaining, order.order.poll_ready(&RetryPolicy::default()))
            .await
            .map_err(|_| CertcentralError::AcmeTimeout)?
            .map_err(|e| acme_protocol_error(&e))?;
        Ok(())
    }

    /// Submits `csr_der` against the now-ready order. `csr_der` must come
    /// from [`crate::crypto::build_csr`] over the per-certificate key this
    /// record owns.
    pub async fn finalize_order(order: &mut AcmeOrder, csr_der: &[u8]) -> Result<(), CertcentralError> {
        order.order.finalize(csr_der).await.map_err(|e| acme_protocol_error(&e))?;
        Ok(())
    }

    /// Polls for the finalized order's certificate chain PEM, with the
    /// same deadline/backoff discipline as [`Self::poll_authorization`].
    pub async fn poll_order(order: &mut AcmeOrder, deadline: Instant) -> Result<String, CertcentralError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CertcentralError::AcmeTimeout);
        }
        let order_status = tokio::time::timeout(remaining, order.order.poll_ready(&RetryPolicy::default()))
            .await
            .map_err(|_| CertcentralError::AcmeTimeout)?
            .map_err(|e| acme_protocol_error(&e))?;
        if order_status != OrderStatus::Valid && order_status != OrderStatus::Ready {
            return Err(AcmeProtocolError::Malformed {
                detail: format!("order reached terminal status {order_status:?} without becoming valid"),
            }
            .into());
        }
        let chain_pem = tokio::time::timeout(remaining, order.order.poll_certificate(&RetryPolicy::default()))
            .await
            .map_err(|_| CertcentralError::AcmeTimeout)?
            .map_err(|e| acme_protocol_error(&e))?;
        Ok(chain_pem)
    }

    /// Administrative revocation, not on the renewal happy path.
    pub async fn revoke(account: &Account, cert_der: &[u8], reason: Option<u8>) -> Result<(), CertcentralError> {
        account
            .revoke(&instant_acme::RevocationRequest { certificate: cert_der, reason: reason.map(|r| r.into()) })
            .await
            .map_err(|e| acme_protocol_error(&e).into())
    }
}

fn acme_protocol_error(err: &instant_acme::Error) -> AcmeProtocolError {
    classify_detail(err.to_string())
}

/// Maps an `instant_acme` error's rendered detail string onto the ACME
/// problem-type taxonomy of `spec.md` §7. Split out from
/// [`acme_protocol_error`] so the classification itself is testable without
/// constructing an `instant_acme::Error`.
fn classify_detail(detail: String) -> AcmeProtocolError {
    if detail.contains("badNonce") {
        AcmeProtocolError::BadNonce
    } else if detail.contains("rateLimited") || detail.contains("429") {
        AcmeProtocolError::RateLimited { retry_after: parse_retry_after(&detail) }
    } else if detail.contains("unauthorized") {
        AcmeProtocolError::Unauthorized { detail }
    } else if detail.contains("malformed") {
        AcmeProtocolError::Malformed { detail }
    } else {
        AcmeProtocolError::ServerInternal { problem_type: "unknown".to_string(), detail }
    }
}

/// Scans `detail` for a `retry-after`/`retry after` marker followed by a
/// run of digits and parses it as whole seconds. `instant_acme` renders the
/// ACME server's problem document into this string but does not expose the
/// structured `Retry-After` value directly, so this is a best-effort
/// extraction: servers that omit a concrete number from the problem detail
/// leave the scheduler to fall back to its own default (see
/// `Engine::rate_limited_retry_at`).
fn parse_retry_after(detail: &str) -> Option<Duration> {
    let lower = detail.to_ascii_lowercase();
    let marker = lower.find("retry-after").or_else(|| lower.find("retry after"))?;
    let rest = &detail[marker..];
    let digits: String = rest.chars().skip_while(|c| !c.is_ascii_digit()).take_while(|c| c.is_ascii_digit()).collect();
    let seconds: u64 = digits.parse().ok()?;
    Some(Duration::from_secs(seconds))
}
