//! S5 — publish crash (spec.md §8).
//!
//! A crash between `publish`'s two renames leaves `new/<name>` fully
//! staged and consistent while `live/<name>` is absent. On the next
//! `Engine::new`, bootstrap must detect and complete that publish before
//! the record is ever scheduled, so a restart never re-orders a
//! certificate it already finished issuing.

mod common;

use certcentral_core::scheduler::CertState;
use certcentral_core::store::CertMeta;
use certcentral_core::Engine;
use chrono::{Duration as ChronoDuration, Utc};

#[tokio::test]
async fn incomplete_publish_is_completed_on_bootstrap() {
    let tmp = tempfile::tempdir().unwrap();
    let domain = "crash.example.org";
    let (key_pem, cert_pem, fingerprint, serial) = common::self_signed_material(domain);

    let store_base = tmp.path().join("store");
    let new_dir = store_base.join("new").join("crash");
    tokio::fs::create_dir_all(&new_dir).await.unwrap();

    let meta = CertMeta {
        not_before: Utc::now() - ChronoDuration::days(1),
        not_after: Utc::now() + ChronoDuration::days(89),
        serial: serial.clone(),
        fingerprint,
        san: vec![domain.to_string()],
        self_signed: false,
    };
    tokio::fs::write(new_dir.join("privkey.pem"), &key_pem).await.unwrap();
    tokio::fs::write(new_dir.join("cert.pem"), &cert_pem).await.unwrap();
    tokio::fs::write(new_dir.join("chain.pem"), "").await.unwrap();
    tokio::fs::write(new_dir.join("fullchain.pem"), &cert_pem).await.unwrap();
    tokio::fs::write(new_dir.join("meta.json"), serde_json::to_string_pretty(&meta).unwrap()).await.unwrap();

    // `live/crash` deliberately does not exist: this is the exact window
    // `CertStore::publish` can crash in between its two renames.
    assert!(!tokio::fs::try_exists(store_base.join("live").join("crash")).await.unwrap());

    let config = common::http01_config(tmp.path(), "crash", domain, "https://example.invalid/directory");
    let engine = Engine::new(config).await.expect("engine bootstraps and recovers the crashed publish");

    assert!(tokio::fs::try_exists(store_base.join("live").join("crash")).await.unwrap());
    assert!(!tokio::fs::try_exists(&new_dir).await.unwrap());

    let record = engine.record_snapshot("crash").await.expect("record exists");
    assert_eq!(record.state, CertState::Live);
    assert_eq!(record.meta.expect("recovered record carries its meta").serial, serial);
}
