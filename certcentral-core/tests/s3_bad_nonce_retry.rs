//! S3 — badNonce then success (spec.md §8).
//!
//! The mock ACME server rejects the first `newOrder` POST with
//! `urn:ietf:params:acme:error:badNonce`. `instant_acme` retries
//! transparently with a fresh nonce; the record still reaches `Live`, and
//! the server only ever sees the original logical order (no
//! scheduler-level retry was needed on top of the client's own retry).

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use certcentral_core::scheduler::CertState;
use certcentral_core::Engine;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn bad_nonce_is_retried_transparently() {
    let tmp = tempfile::tempdir().unwrap();
    let domain = "retry.example.org";
    let chain_pem = common::fake_chain_pem(domain);
    let mock = common::mock_acme::start(domain, common::mock_acme::NewOrderBehavior::FailOnceWithBadNonce, chain_pem).await;

    let config = common::http01_config(tmp.path(), "retry", domain, &mock.directory_url);
    let engine = Arc::new(Engine::new(config).await.expect("engine bootstraps"));

    let cancellation = CancellationToken::new();
    let run_handle = tokio::spawn(Engine::run(engine.clone(), cancellation.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let snapshot = engine.record_snapshot("retry").await.expect("record exists");
        if snapshot.state == CertState::Live && snapshot.meta.as_ref().map(|m| !m.self_signed).unwrap_or(false) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "certificate never recovered from the badNonce rejection");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    cancellation.cancel();
    let _ = run_handle.await;

    // instant_acme retries the single logical order internally; the
    // scheduler's own failure counter never fires.
    let live = engine.record_snapshot("retry").await.unwrap();
    assert_eq!(live.consecutive_failures, 0);
    assert!(mock.new_order_attempts.load(Ordering::SeqCst) >= 2, "mock should have seen the rejected attempt plus the retry");
}
