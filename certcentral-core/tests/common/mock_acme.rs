//! A `wiremock`-backed stand-in for an RFC 8555 ACME server, covering the
//! single happy-path order this crate's scheduler drives: one identifier,
//! one http-01 challenge, one authorization, one finalize. Modeled on the
//! `DirectoryResponder`/stateful-`Respond` pattern used for ACME mocking in
//! `examples/other_examples/3c3828eb_aicers-bootroot__src-acme-client.rs.rs`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// How the mock's `newOrder` endpoint behaves, selected per scenario.
#[derive(Clone, Copy)]
pub enum NewOrderBehavior {
    Succeed,
    FailOnceWithBadNonce,
    FailWithRateLimit,
}

pub struct MockAcme {
    pub server: MockServer,
    pub directory_url: String,
    pub new_order_attempts: Arc<AtomicUsize>,
}

/// Mounts a full directory → account → order → authorization → challenge
/// → finalize → certificate-download flow for `domain`, serving
/// `cert_chain_pem` once the order reaches `valid`.
pub async fn start(domain: &str, behavior: NewOrderBehavior, cert_chain_pem: String) -> MockAcme {
    let server = MockServer::start().await;
    let base = server.uri();

    let directory = serde_json::json!({
        "newNonce": format!("{base}/new-nonce"),
        "newAccount": format!("{base}/new-account"),
        "newOrder": format!("{base}/new-order"),
        "revokeCert": format!("{base}/revoke-cert"),
    });
    Mock::given(method("GET"))
        .and(path("/directory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&directory))
        .mount(&server)
        .await;

    for verb in ["GET", "HEAD"] {
        Mock::given(method(verb))
            .and(path("/new-nonce"))
            .respond_with(ResponseTemplate::new(200).insert_header("replay-nonce", "nonce-0"))
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/new-account"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("location", format!("{base}/account/1"))
                .insert_header("replay-nonce", "nonce-1")
                .set_body_json(serde_json::json!({"status": "valid"})),
        )
        .mount(&server)
        .await;

    let new_order_attempts = Arc::new(AtomicUsize::new(0));
    Mock::given(method("POST"))
        .and(path("/new-order"))
        .respond_with(NewOrderResponder {
            base: base.clone(),
            domain: domain.to_string(),
            behavior,
            attempts: new_order_attempts.clone(),
        })
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/authz/1"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("replay-nonce", "nonce-3").set_body_json(serde_json::json!({
                "status": "pending",
                "identifier": {"type": "dns", "value": domain},
                "challenges": [{
                    "type": "http-01",
                    "url": format!("{base}/chall/1"),
                    "token": "test-token-1",
                    "status": "pending",
                }],
            })),
        )
        .mount(&server)
        .await;

    let challenge_ready = Arc::new(AtomicBool::new(false));
    Mock::given(method("POST"))
        .and(path("/chall/1"))
        .respond_with(ChallengeResponder { base: base.clone(), ready: challenge_ready.clone() })
        .mount(&server)
        .await;

    let finalized = Arc::new(AtomicBool::new(false));
    Mock::given(method("POST"))
        .and(path("/order/1"))
        .respond_with(OrderPollResponder {
            base: base.clone(),
            domain: domain.to_string(),
            challenge_ready: challenge_ready.clone(),
            finalized: finalized.clone(),
        })
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/order/1/finalize"))
        .respond_with(FinalizeResponder {
            base: base.clone(),
            domain: domain.to_string(),
            challenge_ready: challenge_ready.clone(),
            finalized: finalized.clone(),
        })
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/cert/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pem-certificate-chain")
                .set_body_string(cert_chain_pem),
        )
        .mount(&server)
        .await;

    MockAcme { directory_url: format!("{base}/directory"), server, new_order_attempts }
}

fn order_body(base: &str, domain: &str, status: &str) -> serde_json::Value {
    let mut body = serde_json::json!({
        "status": status,
        "identifiers": [{"type": "dns", "value": domain}],
        "authorizations": [format!("{base}/authz/1")],
        "finalize": format!("{base}/order/1/finalize"),
    });
    if status == "valid" {
        body["certificate"] = serde_json::json!(format!("{base}/cert/1"));
    }
    body
}

struct NewOrderResponder {
    base: String,
    domain: String,
    behavior: NewOrderBehavior,
    attempts: Arc<AtomicUsize>,
}

impl Respond for NewOrderResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            NewOrderBehavior::FailOnceWithBadNonce if attempt == 0 => ResponseTemplate::new(400)
                .insert_header("replay-nonce", "nonce-retry")
                .insert_header("content-type", "application/problem+json")
                .set_body_json(serde_json::json!({
                    "type": "urn:ietf:params:acme:error:badNonce",
                    "detail": "JWS has an invalid anti-replay nonce",
                })),
            NewOrderBehavior::FailWithRateLimit => ResponseTemplate::new(429)
                .insert_header("replay-nonce", "nonce-rl")
                .insert_header("retry-after", "60")
                .insert_header("content-type", "application/problem+json")
                .set_body_json(serde_json::json!({
                    "type": "urn:ietf:params:acme:error:rateLimited",
                    "detail": "too many requests, please retry after 60 seconds",
                })),
            _ => ResponseTemplate::new(201)
                .insert_header("location", format!("{}/order/1", self.base))
                .insert_header("replay-nonce", "nonce-2")
                .set_body_json(order_body(&self.base, &self.domain, "pending")),
        }
    }
}

struct ChallengeResponder {
    base: String,
    ready: Arc<AtomicBool>,
}

impl Respond for ChallengeResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        self.ready.store(true, Ordering::SeqCst);
        ResponseTemplate::new(200).insert_header("replay-nonce", "nonce-4").set_body_json(serde_json::json!({
            "type": "http-01",
            "url": format!("{}/chall/1", self.base),
            "token": "test-token-1",
            "status": "processing",
        }))
    }
}

struct OrderPollResponder {
    base: String,
    domain: String,
    challenge_ready: Arc<AtomicBool>,
    finalized: Arc<AtomicBool>,
}

impl Respond for OrderPollResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        let status = if self.finalized.load(Ordering::SeqCst) {
            "valid"
        } else if self.challenge_ready.load(Ordering::SeqCst) {
            "ready"
        } else {
            "pending"
        };
        ResponseTemplate::new(200)
            .insert_header("replay-nonce", "nonce-5")
            .set_body_json(order_body(&self.base, &self.domain, status))
    }
}

struct FinalizeResponder {
    base: String,
    domain: String,
    challenge_ready: Arc<AtomicBool>,
    finalized: Arc<AtomicBool>,
}

impl Respond for FinalizeResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        self.finalized.store(true, Ordering::SeqCst);
        let status = if self.challenge_ready.load(Ordering::SeqCst) { "valid" } else { "pending" };
        ResponseTemplate::new(200)
            .insert_header("replay-nonce", "nonce-6")
            .set_body_json(order_body(&self.base, &self.domain, status))
    }
}
