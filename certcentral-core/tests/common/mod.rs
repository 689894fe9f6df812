//! Shared scaffolding for the scenario tests in `certcentral-core/tests/`.
//! Not a test binary itself — `tests/common/` is the standard Cargo
//! convention for code shared across integration test targets.

pub mod fake_dns;
pub mod mock_acme;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use certcentral_core::config::{
    AccountConfig, CertificateConfig, ChallengeKind, ChallengesConfig, Config, Dns01Config, DnsProviderConfig, Http01Config, SchedulerConfig,
    StoreConfig,
};
use certcentral_core::crypto::KeyKind;
use certcentral_core::dns::DnsProvider;
use certcentral_core::error::ChallengeProvisionError;

/// A certificate config scheduled against a single http-01 account.
pub fn http01_config(state_dir: &Path, name: &str, san: &str, directory_url: &str) -> Config {
    let mut accounts = HashMap::new();
    accounts.insert(
        "test-ca".to_string(),
        AccountConfig {
            directory: directory_url.to_string(),
            contact: vec!["mailto:ops@example.org".to_string()],
            key_path: state_dir.join("account.json"),
            staging: true,
        },
    );

    let mut certificates = HashMap::new();
    certificates.insert(
        name.to_string(),
        CertificateConfig {
            san: vec![san.to_string()],
            key_type: KeyKind::EcdsaP256,
            challenge: ChallengeKind::Http01,
            account: "test-ca".to_string(),
        },
    );

    Config {
        accounts,
        challenges: ChallengesConfig {
            http01: Some(Http01Config { challenges_dir: state_dir.join("challenges"), self_check_urls: vec![] }),
            dns01: None,
        },
        certificates,
        scheduler: fast_scheduler_config(),
        store: StoreConfig { base_path: state_dir.join("store"), archive_keep: 5 },
    }
}

/// A scheduler config tuned for tests: few workers, short backoff, so a
/// queued certificate is actually picked up within a test's timeout budget
/// rather than `SchedulerConfig::default`'s production-sized intervals.
pub fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        workers: 1,
        renewal_ratio: 2.0 / 3.0,
        backoff_base: std::time::Duration::from_millis(50),
        backoff_cap: std::time::Duration::from_secs(5),
        concurrent_orders: 1,
    }
}

/// Builds a two-certificate (SAN) dns-01 config whose providers are never
/// actually constructed by `Engine::new` (dns-01 provider construction only
/// understands the real driver kinds); used only by the dns-01 test, which
/// drives `Dns01Fulfiller` directly against [`FakeDnsProvider`] instead of
/// through a live `Engine`.
pub fn dns_provider_config(zones: Vec<String>) -> DnsProviderConfig {
    DnsProviderConfig {
        driver: certcentral_core::config::DnsDriverKind::Cloudflare,
        credentials: Default::default(),
        zones,
    }
}

/// Generates a self-signed leaf certificate followed by a self-signed
/// "intermediate" so the ACME mock's certificate download exercises the
/// same fullchain split the real server's response would.
pub fn fake_chain_pem(san: &str) -> String {
    use rcgen::{CertificateParams, KeyPair};
    let leaf_key = KeyPair::generate().expect("generate leaf key");
    let leaf_params = CertificateParams::new(vec![san.to_string()]).expect("leaf params");
    let leaf = leaf_params.self_signed(&leaf_key).expect("self-sign leaf");

    let intermediate_key = KeyPair::generate().expect("generate intermediate key");
    let intermediate_params = CertificateParams::new(Vec::<String>::new()).expect("intermediate params");
    let intermediate = intermediate_params.self_signed(&intermediate_key).expect("self-sign intermediate");

    format!("{}{}", leaf.pem(), intermediate.pem())
}

/// Builds a minimal self-signed certificate/key pair and the store-format
/// fingerprint/serial pair that must accompany it, mirroring how
/// `store::tests::self_signed_test_cert` computes the same values (that
/// helper is private to its module, so integration tests need their own
/// copy of the formula, not a re-export).
pub fn self_signed_material(san: &str) -> (String, String, String, String) {
    use rcgen::{CertificateParams, KeyPair};
    use sha2::{Digest, Sha256};
    use x509_parser::prelude::{FromDer, X509Certificate};

    let key_pair = KeyPair::generate().expect("generate key");
    let params = CertificateParams::new(vec![san.to_string()]).expect("cert params");
    let cert = params.self_signed(&key_pair).expect("self-sign");
    let key_pem = key_pair.serialize_pem();
    let cert_pem = cert.pem();

    let fingerprint = hex::encode(Sha256::digest(key_pair.public_key_der()));

    let cert_der = rustls_pemfile::certs(&mut std::io::Cursor::new(cert_pem.as_bytes())).next().unwrap().unwrap();
    let (_, x509) = X509Certificate::from_der(&cert_der).unwrap();
    let serial = x509.raw_serial_as_string();

    (key_pem, cert_pem, fingerprint, serial)
}

/// An in-memory [`DnsProvider`] double: `add_txt`/`remove_txt` mutate a
/// shared [`fake_dns::FakeDnsRecords`] map, and `list_ns` always points at
/// the one embedded stub server backing every [`FakeDnsProvider`] in a
/// test, so the real `Dns01Fulfiller::provision` propagation-poll has
/// something real to query.
pub struct FakeDnsProvider {
    pub records: fake_dns::FakeDnsRecords,
    pub nameserver: String,
}

#[async_trait]
impl DnsProvider for FakeDnsProvider {
    async fn add_txt(&self, _zone: &str, rrname: &str, value: &str, _ttl: u32) -> Result<(), ChallengeProvisionError> {
        self.records.lock().unwrap().insert(rrname.trim_end_matches('.').to_ascii_lowercase(), value.to_string());
        Ok(())
    }

    async fn remove_txt(&self, _zone: &str, rrname: &str, _value: &str) -> Result<(), ChallengeProvisionError> {
        self.records.lock().unwrap().remove(&rrname.trim_end_matches('.').to_ascii_lowercase());
        Ok(())
    }

    async fn list_ns(&self, _zone: &str) -> Result<Vec<String>, ChallengeProvisionError> {
        Ok(vec![self.nameserver.clone()])
    }
}
