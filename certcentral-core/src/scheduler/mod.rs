//! Per-certificate lifecycle state machine and worker pool.
//!
//! Ferron's `setup::acme::background_acme_task` runs a
//! single `tokio::time::interval` loop that walks every configured
//! certificate once a tick and issues whatever is due. This module keeps
//! that same cancellation-token-driven shape but replaces the flat sweep
//! with a real priority queue ordered by next-attempt deadline, and bounds
//! concurrent in-flight ACME orders with a semaphore rather than processing
//! certificates one at a time.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio::sync::{Mutex, Notify, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acme::{AccountRegistry, AcmeClient};
use crate::challenge::{ChallengeFulfiller, Dns01Fulfiller, Http01Fulfiller};
use crate::config::{ChallengeKind, Config};
use crate::crypto::{self, GeneratedKey};
use crate::dns;
use crate::error::CertcentralError;
use crate::store::{CertMaterial, CertMeta, CertStore};

/// Where a certificate record sits in its lifecycle.
///
/// `Initial` and `SelfSigned` only matter before the very first successful
/// issuance; once a record reaches `Live` it alternates between `Live` and
/// the ordering states on every renewal. `Failed` is not terminal — the
/// next scheduled attempt moves the record back to `Ordering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertState {
    Initial,
    SelfSigned,
    Ordering,
    Authorizing,
    Finalizing,
    Downloading,
    Live,
    Failed,
    Expired,
}

/// In-memory bookkeeping for one configured certificate. Rebuilt from
/// configuration and the store at every startup; nothing here is persisted
/// independently of the store itself: a restart loses no progress
/// because there is no separate scheduler journal to lose.
#[derive(Debug, Clone)]
pub struct CertRecord {
    pub name: String,
    pub state: CertState,
    pub consecutive_failures: u32,
    pub last_transition: DateTime<Utc>,
    pub next_attempt: DateTime<Utc>,
    pub meta: Option<CertMeta>,
}

impl CertRecord {
    fn transition(&mut self, state: CertState) {
        self.state = state;
        self.last_transition = Utc::now();
    }
}

/// An entry in the priority queue: the earliest-deadline certificate sorts
/// first. `Ord` is derived over `(deadline, name)` so ties break
/// deterministically rather than on `HashMap` iteration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    deadline: DateTime<Utc>,
    name: String,
}

/// Drives every configured certificate through [`CertState`], bounded by
/// `scheduler.concurrent_orders` concurrent ACME orders.
///
/// `config` and `records` are behind [`RwLock`] rather than owned outright
/// so [`Engine::reconcile`] can add or remove certificate records at
/// runtime (a SIGHUP reload) without tearing down workers that may be
/// mid-order on an unrelated record: a reader only ever holds the lock for
/// the span of a single map lookup or clone, never across an `.await` on
/// network I/O.
pub struct Engine {
    config: RwLock<Config>,
    store: CertStore,
    accounts: AccountRegistry,
    http01: Option<Http01Fulfiller>,
    dns01: Option<Dns01Fulfiller>,
    records: RwLock<HashMap<String, Arc<Mutex<CertRecord>>>>,
    semaphore: Arc<Semaphore>,
    queue: Mutex<BinaryHeap<Reverse<QueueEntry>>>,
    wake: Notify,
}

const ORDER_DEADLINE: std::time::Duration = std::time::Duration::from_secs(10 * 60);
const EXPIRY_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);
/// Fallback wait when a `RateLimited` problem document carries no
/// parseable `Retry-After` value.
const DEFAULT_RATE_LIMIT_RETRY: std::time::Duration = std::time::Duration::from_secs(60);

impl Engine {
    /// Builds the engine and its fulfillers from `config`, then seeds the
    /// priority queue by reading whatever is currently `live/` in the
    /// store: certificates with no live material get an immediate
    /// attempt, certificates with live material get scheduled at their
    /// renewal ratio threshold (or immediately, if that threshold has
    /// already passed while the daemon was down).
    pub async fn new(config: Config) -> Result<Self, CertcentralError> {
        let store = CertStore::new(config.store.base_path.clone(), config.store.archive_keep);

        let http01 = config
            .challenges
            .http01
            .as_ref()
            .map(|c| Http01Fulfiller::new(c.challenges_dir.clone(), c.self_check_urls.clone()));

        let dns01 = match &config.challenges.dns01 {
            Some(dns01_config) => {
                let mut providers = HashMap::new();
                for (provider_id, provider_config) in &dns01_config.providers {
                    let provider = dns::build_provider(provider_id, provider_config)?;
                    providers.insert(provider_id.clone(), (provider, provider_config.zones.clone()));
                }
                Some(Dns01Fulfiller::new(providers))
            }
            None => None,
        };

        let concurrent_orders = config.scheduler.concurrent_orders.max(1);

        let engine = Engine {
            config: RwLock::new(config),
            store,
            accounts: AccountRegistry::new(),
            http01,
            dns01,
            records: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(concurrent_orders)),
            queue: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
        };

        engine.bootstrap().await
    }

    async fn bootstrap(self) -> Result<Self, CertcentralError> {
        let names: Vec<String> = self.config.read().await.certificates.keys().cloned().collect();
        let renewal_ratio = self.config.read().await.scheduler.renewal_ratio;
        let mut queue = BinaryHeap::new();
        let mut records = self.records.write().await;

        for name in names {
            // A crash between the store's two renames (scenario S5) is
            // recovered before the record is ever scheduled, so a
            // half-published generation never gets read as live.
            let _ = self.store.recover_incomplete_publish(&name).await;

            let (state, meta, next_attempt) = match self.store.read(&name).await {
                Ok(material) if !material.meta.self_signed => {
                    let next = renewal_time(&material.meta, renewal_ratio);
                    (CertState::Live, Some(material.meta), next)
                }
                Ok(material) => {
                    // Only the bootstrap self-signed placeholder is live;
                    // a real issuance is still due immediately.
                    (CertState::SelfSigned, Some(material.meta), Utc::now())
                }
                Err(_) => (CertState::Initial, None, Utc::now()),
            };

            queue.push(Reverse(QueueEntry { deadline: next_attempt, name: name.clone() }));
            records.insert(
                name.clone(),
                Arc::new(Mutex::new(CertRecord {
                    name,
                    state,
                    consecutive_failures: 0,
                    last_transition: Utc::now(),
                    next_attempt,
                    meta,
                })),
            );
        }
        drop(records);

        *self.queue.lock().await = queue;
        Ok(self)
    }

    /// Re-reads `new_config` after a reload and reconciles the set of
    /// tracked certificate records against it: certificates newly present
    /// in configuration get a record and an immediate queue entry,
    /// certificates removed from configuration are dropped from tracking
    /// (their last-published material in the store is left untouched —
    /// this engine never deletes store state on its own), and certificates
    /// present in both keep their existing record and in-flight state
    /// untouched. No in-flight order is ever restarted or cancelled by a
    /// reload.
    pub async fn reconcile(&self, new_config: Config) {
        let new_names: std::collections::HashSet<String> = new_config.certificates.keys().cloned().collect();
        let mut reissue_forced = Vec::new();

        {
            let mut records = self.records.write().await;
            records.retain(|name, _| new_names.contains(name));

            for name in &new_names {
                match records.get(name) {
                    None => {
                        records.insert(
                            name.clone(),
                            Arc::new(Mutex::new(CertRecord {
                                name: name.clone(),
                                state: CertState::Initial,
                                consecutive_failures: 0,
                                last_transition: Utc::now(),
                                next_attempt: Utc::now(),
                                meta: None,
                            })),
                        );
                        self.requeue(name.clone(), Utc::now()).await;
                    }
                    Some(existing) => {
                        // A SAN set that changed underneath a live record is
                        // a new certificate identity, not a like-for-like
                        // renewal (spec.md's `LIVE` + changed-config case):
                        // force an immediate reissue instead of waiting out
                        // the renewal-ratio deadline.
                        let cert_config = new_config.certificates.get(name).expect("name came from new_config.certificates.keys()");
                        let mut record = existing.lock().await;
                        if record.state == CertState::Live {
                            if let Some(meta) = record.meta.clone() {
                                if wants_reissue(cert_config, &meta) {
                                    record.transition(CertState::Ordering);
                                    record.next_attempt = Utc::now();
                                    reissue_forced.push(name.clone());
                                }
                            }
                        }
                    }
                }
            }
        }

        for name in reissue_forced {
            info!(certificate = %name, "configured SAN set changed; scheduling immediate reissue");
            self.requeue(name, Utc::now()).await;
        }

        *self.config.write().await = new_config;
        info!(certificate_count = new_names.len(), "configuration reloaded and reconciled");
    }

    /// Runs until `cancellation` fires. Spawns `scheduler.workers` pollers
    /// that share the queue and semaphore, plus one daily sweep that moves
    /// any `Live` record whose certificate has actually expired (not just
    /// crossed the renewal ratio — an operator-visible distinction worth a
    /// dedicated state) into `Expired`.
    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        let worker_count = self.config.read().await.scheduler.workers.max(1);
        let mut handles = Vec::with_capacity(worker_count + 1);

        for worker_id in 0..worker_count {
            let engine = self.clone();
            let token = cancellation.clone();
            handles.push(tokio::spawn(async move { engine.worker_loop(worker_id, token).await }));
        }

        {
            let engine = self.clone();
            let token = cancellation.clone();
            handles.push(tokio::spawn(async move { engine.expiry_sweep_loop(token).await }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(&self, worker_id: usize, cancellation: CancellationToken) {
        loop {
            if cancellation.is_cancelled() {
                return;
            }

            let next_due = {
                let queue = self.queue.lock().await;
                queue.peek().map(|Reverse(entry)| entry.deadline)
            };

            let sleep_for = match next_due {
                Some(deadline) => (deadline - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO),
                None => std::time::Duration::from_secs(60),
            };

            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.wake.notified() => {}
            }

            let Some(name) = self.pop_ready().await else { continue };

            let Ok(permit) = self.semaphore.clone().acquire_owned().await else { return };
            info!(worker_id, certificate = %name, "processing certificate");
            self.process(&name).await;
            drop(permit);
        }
    }

    async fn pop_ready(&self) -> Option<String> {
        let mut queue = self.queue.lock().await;
        match queue.peek() {
            Some(Reverse(entry)) if entry.deadline <= Utc::now() => queue.pop().map(|Reverse(e)| e.name),
            _ => None,
        }
    }

    async fn requeue(&self, name: String, deadline: DateTime<Utc>) {
        self.queue.lock().await.push(Reverse(QueueEntry { deadline, name }));
        self.wake.notify_one();
    }

    async fn expiry_sweep_loop(&self, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = tokio::time::sleep(EXPIRY_SWEEP_INTERVAL) => {}
            }
            let records = self.records.read().await.clone();
            for (name, record) in &records {
                let mut record = record.lock().await;
                if record.state == CertState::Live {
                    if let Some(meta) = &record.meta {
                        if meta.not_after <= Utc::now() {
                            warn!(certificate = %name, "live certificate has expired without a successful renewal");
                            record.transition(CertState::Expired);
                        }
                    }
                }
            }
        }
    }

    /// Runs one certificate through the full ACME flow, from wherever its
    /// state currently is through to `Live` or `Failed`. The reference
    /// codebase does the equivalent of this entire sequence inline inside
    /// a single loop body; here it is a method so each state is visible to
    /// a reader and to `tracing` spans independently.
    async fn process(&self, name: &str) {
        let Some(cert_config) = self.config.read().await.certificates.get(name).cloned() else { return };
        let Some(account_config) = self.config.read().await.accounts.get(&cert_config.account).cloned() else { return };
        let Some(record) = self.records.read().await.get(name).cloned() else { return };

        {
            let mut record = record.lock().await;
            if record.state == CertState::Initial {
                record.transition(CertState::SelfSigned);
                drop(record);
                if let Err(e) = self.publish_self_signed(name, &cert_config).await {
                    warn!(certificate = %name, error = %e, "failed to publish bootstrap self-signed certificate");
                }
            }
        }

        {
            let mut record = record.lock().await;
            record.transition(CertState::Ordering);
        }

        match self.issue(name, &cert_config, &account_config).await {
            Ok(material) => {
                let renewal_ratio = self.config.read().await.scheduler.renewal_ratio;
                let renewal_at = renewal_time(&material.meta, renewal_ratio);
                if let Err(e) = self.store.publish(name, &material).await {
                    warn!(certificate = %name, error = %e, "issuance succeeded but publish failed");
                    self.fail(name, renewal_at).await;
                    return;
                }
                let mut record = record.lock().await;
                record.transition(CertState::Live);
                record.consecutive_failures = 0;
                record.meta = Some(material.meta);
                record.next_attempt = renewal_at;
                drop(record);
                self.requeue(name.to_string(), renewal_at).await;
                info!(certificate = %name, next_renewal = %renewal_at, "certificate issued and published");
            }
            Err(e) => {
                warn!(certificate = %name, error = %e, "issuance failed");
                let retry_at = match &e {
                    CertcentralError::AcmeProtocol(crate::error::AcmeProtocolError::RateLimited { retry_after }) => {
                        self.rate_limited_retry_at(name, *retry_after).await
                    }
                    _ => self.next_backoff(name).await,
                };
                self.fail(name, retry_at).await;
            }
        }
    }

    async fn fail(&self, name: &str, retry_at: DateTime<Utc>) {
        let Some(record) = self.records.read().await.get(name).cloned() else { return };
        let mut record = record.lock().await;
        record.transition(CertState::Failed);
        record.next_attempt = retry_at;
        drop(record);
        self.requeue(name.to_string(), retry_at).await;
    }

    async fn next_backoff(&self, name: &str) -> DateTime<Utc> {
        let Some(record) = self.records.read().await.get(name).cloned() else { return Utc::now() };
        let mut record = record.lock().await;
        record.consecutive_failures += 1;
        let exponent = record.consecutive_failures.min(16);
        let (base, cap) = {
            let config = self.config.read().await;
            (config.scheduler.backoff_base, config.scheduler.backoff_cap)
        };
        let unjittered = base.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX)).min(cap);
        let jitter_fraction = rand::rng().random_range(-0.2..=0.2);
        let jittered_secs = (unjittered.as_secs_f64() * (1.0 + jitter_fraction)).max(1.0);
        Utc::now() + ChronoDuration::milliseconds((jittered_secs * 1000.0) as i64)
    }

    /// Schedules the next attempt exactly `retry_after` out, honoring the
    /// server's `Retry-After` rather than the generic exponential policy
    /// (spec.md §7: "RateLimited ⇒ honored per Retry-After"). Falls back to
    /// [`DEFAULT_RATE_LIMIT_RETRY`] when the server's problem document
    /// didn't carry a parseable duration.
    async fn rate_limited_retry_at(&self, name: &str, retry_after: Option<std::time::Duration>) -> DateTime<Utc> {
        if let Some(record) = self.records.read().await.get(name).cloned() {
            record.lock().await.consecutive_failures += 1;
        }
        let wait = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_RETRY);
        Utc::now() + ChronoDuration::from_std(wait).unwrap_or_else(|_| ChronoDuration::seconds(DEFAULT_RATE_LIMIT_RETRY.as_secs() as i64))
    }

    /// Read-only snapshot of one certificate's current lifecycle state —
    /// the introspection point a control surface (health checks, an admin
    /// CLI) reads instead of reaching into the engine's internal maps
    /// directly.
    pub async fn record_snapshot(&self, name: &str) -> Option<CertRecord> {
        let record = self.records.read().await.get(name)?.clone();
        let record = record.lock().await;
        Some(record.clone())
    }

    /// Generates a throwaway self-signed certificate and publishes it
    /// immediately so anything reading from the store always finds
    /// *something* to serve while the real ACME order is in flight —
    /// the bootstrap behavior for a record that has never issued before.
    async fn publish_self_signed(&self, name: &str, cert_config: &crate::config::CertificateConfig) -> Result<(), CertcentralError> {
        let sans = cert_config.san.clone();
        let key_kind = cert_config.key_type;
        let key = tokio::task::spawn_blocking(move || crypto::generate_key(key_kind))
            .await
            .map_err(|e| CertcentralError::Crypto(crate::error::CryptoError::Internal(e.to_string())))??;

        let (cert_pem, not_before, not_after, serial) = self_signed_cert(&key, &sans)?;
        let meta = CertMeta {
            not_before,
            not_after,
            serial,
            fingerprint: crypto::public_key_fingerprint(&key),
            san: sans,
            self_signed: true,
        };
        let material = CertMaterial {
            private_key_pem: key.pem(),
            cert_pem,
            chain_pem: String::new(),
            meta,
        };
        self.store.publish(name, &material).await?;
        Ok(())
    }

    async fn issue(
        &self,
        name: &str,
        cert_config: &crate::config::CertificateConfig,
        account_config: &crate::config::AccountConfig,
    ) -> Result<CertMaterial, CertcentralError> {
        let account = self.accounts.get_or_register(&cert_config.account, account_config, None).await?;

        let fulfiller: &dyn ChallengeFulfiller = match cert_config.challenge {
            ChallengeKind::Http01 => self
                .http01
                .as_ref()
                .map(|f| f as &dyn ChallengeFulfiller)
                .ok_or_else(|| CertcentralError::Config(crate::error::ConfigError::UnknownDnsProvider {
                    name: name.to_string(),
                    provider: "<http-01 not configured>".to_string(),
                }))?,
            ChallengeKind::Dns01 => self
                .dns01
                .as_ref()
                .map(|f| f as &dyn ChallengeFulfiller)
                .ok_or_else(|| CertcentralError::Config(crate::error::ConfigError::UnknownDnsProvider {
                    name: name.to_string(),
                    provider: "<no dns-01 provider configured>".to_string(),
                }))?,
        };

        let challenge_type = match cert_config.challenge {
            ChallengeKind::Http01 => instant_acme::ChallengeType::Http01,
            ChallengeKind::Dns01 => instant_acme::ChallengeType::Dns01,
        };

        let sans = cert_config.san.clone();
        let key_kind = cert_config.key_type;
        let key = tokio::task::spawn_blocking(move || crypto::generate_key(key_kind))
            .await
            .map_err(|e| CertcentralError::Crypto(crate::error::CryptoError::Internal(e.to_string())))??;

        let mut order = AcmeClient::new_order(&account, &cert_config.san, challenge_type, fulfiller).await?;
        let record = self.records.read().await.get(name).cloned();

        if let Some(record) = &record {
            record.lock().await.transition(CertState::Authorizing);
        }
        let deadline = tokio::time::Instant::now() + ORDER_DEADLINE;
        AcmeClient::poll_authorization(&mut order, deadline).await?;

        if let Some(record) = &record {
            record.lock().await.transition(CertState::Finalizing);
        }
        let csr_der = crypto::build_csr(&key, &sans)?;
        AcmeClient::finalize_order(&mut order, &csr_der).await?;

        if let Some(record) = &record {
            record.lock().await.transition(CertState::Downloading);
        }
        let chain_pem = AcmeClient::poll_order(&mut order, deadline).await?;

        for (pending_challenge, _) in &order.pending {
            let _ = fulfiller.cleanup(pending_challenge).await;
        }

        let (cert_pem, rest_chain_pem) = split_leaf_and_chain(&chain_pem)?;
        let (not_before, not_after, serial) = cert_times_and_serial(&cert_pem)?;
        let fingerprint = crypto::public_key_fingerprint(&key);

        Ok(CertMaterial {
            private_key_pem: key.pem(),
            cert_pem,
            chain_pem: rest_chain_pem,
            meta: CertMeta { not_before, not_after, serial, fingerprint, san: sans, self_signed: false },
        })
    }
}

/// Computes the next renewal attempt as `not_before + (validity
/// period) * renewal_ratio`.
fn renewal_time(meta: &CertMeta, renewal_ratio: f64) -> DateTime<Utc> {
    let validity = meta.not_after - meta.not_before;
    let offset_ms = (validity.num_milliseconds() as f64 * renewal_ratio) as i64;
    meta.not_before + ChronoDuration::milliseconds(offset_ms)
}

/// Whether `cert_config`'s SAN list has diverged from what's currently
/// live, meaning the next issuance is a new certificate identity rather
/// than a like-for-like renewal.
pub fn wants_reissue(cert_config: &crate::config::CertificateConfig, live_meta: &CertMeta) -> bool {
    let mut configured = cert_config.san.clone();
    configured.sort();
    configured.dedup();
    let mut live = live_meta.san.clone();
    live.sort();
    live.dedup();
    configured != live
}

/// Splits a fullchain PEM response into its leaf certificate and the
/// remaining intermediates, matching the store's `cert.pem`/`chain.pem`
/// split.
fn split_leaf_and_chain(chain_pem: &str) -> Result<(String, String), CertcentralError> {
    const MARKER: &str = "-----END CERTIFICATE-----";
    let split_at = chain_pem.find(MARKER).ok_or_else(|| {
        CertcentralError::AcmeProtocol(crate::error::AcmeProtocolError::Malformed {
            detail: "ACME server returned an empty certificate chain".to_string(),
        })
    })?;
    let leaf_end = split_at + MARKER.len();
    let leaf = chain_pem[..leaf_end].trim_start().to_string();
    let rest = chain_pem[leaf_end..].trim_start().to_string();
    Ok((format!("{leaf}\n"), if rest.is_empty() { rest } else { format!("{rest}\n") }))
}

fn cert_times_and_serial(cert_pem: &str) -> Result<(DateTime<Utc>, DateTime<Utc>, String), CertcentralError> {
    use x509_parser::prelude::{FromDer, X509Certificate};

    let der = rustls_pemfile::certs(&mut std::io::Cursor::new(cert_pem.as_bytes()))
        .next()
        .ok_or_else(|| CertcentralError::AcmeProtocol(crate::error::AcmeProtocolError::Malformed {
            detail: "certificate PEM did not decode".to_string(),
        }))?
        .map_err(|e| CertcentralError::AcmeProtocol(crate::error::AcmeProtocolError::Malformed { detail: e.to_string() }))?;
    let (_, x509) = X509Certificate::from_der(&der)
        .map_err(|e| CertcentralError::AcmeProtocol(crate::error::AcmeProtocolError::Malformed { detail: e.to_string() }))?;

    let not_before = DateTime::from_timestamp(x509.validity().not_before.timestamp(), 0).unwrap_or_else(Utc::now);
    let not_after = DateTime::from_timestamp(x509.validity().not_after.timestamp(), 0).unwrap_or_else(Utc::now);
    Ok((not_before, not_after, x509.raw_serial_as_string()))
}

/// Builds a throwaway self-signed certificate over `key` for the bootstrap
/// placeholder, valid for 24 hours — long enough to
/// outlive the first real issuance attempt, short enough that forgetting
/// to replace it is loud.
fn self_signed_cert(key: &GeneratedKey, sans: &[String]) -> Result<(String, DateTime<Utc>, DateTime<Utc>, String), CertcentralError> {
    use rcgen::{CertificateParams, KeyPair};

    let pem = key.pem();
    let key_pair = KeyPair::from_pem(&pem).map_err(|e| crate::error::CryptoError::PemDecode(e.to_string()))?;
    let params = CertificateParams::new(sans.to_vec()).map_err(|e| crate::error::CryptoError::Internal(e.to_string()))?;
    let not_before = Utc::now();
    let not_after = not_before + ChronoDuration::hours(24);
    let cert = params.self_signed(&key_pair).map_err(|e| crate::error::CryptoError::Internal(e.to_string()))?;
    let (_, _, serial) = cert_times_and_serial(&cert.pem())?;
    Ok((cert.pem(), not_before, not_after, serial))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewal_time_lands_at_configured_ratio() {
        let meta = CertMeta {
            not_before: Utc::now(),
            not_after: Utc::now() + ChronoDuration::days(90),
            serial: "1".to_string(),
            fingerprint: "abc".to_string(),
            san: vec!["www.example.org".to_string()],
            self_signed: false,
        };
        let renew_at = renewal_time(&meta, 2.0 / 3.0);
        let expected = meta.not_before + ChronoDuration::days(60);
        assert!((renew_at - expected).num_seconds().abs() < 2);
    }

    #[test]
    fn wants_reissue_detects_san_changes() {
        let cert_config = crate::config::CertificateConfig {
            san: vec!["a.example.org".to_string(), "b.example.org".to_string()],
            key_type: crate::crypto::KeyKind::EcdsaP256,
            challenge: ChallengeKind::Http01,
            account: "letsencrypt".to_string(),
        };
        let same = CertMeta {
            not_before: Utc::now(),
            not_after: Utc::now() + ChronoDuration::days(90),
            serial: "1".to_string(),
            fingerprint: "abc".to_string(),
            san: vec!["b.example.org".to_string(), "a.example.org".to_string()],
            self_signed: false,
        };
        assert!(!wants_reissue(&cert_config, &same));

        let mut different = same.clone();
        different.san = vec!["a.example.org".to_string()];
        assert!(wants_reissue(&cert_config, &different));
    }

    #[test]
    fn split_leaf_and_chain_separates_first_certificate() {
        let chain = "-----BEGIN CERTIFICATE-----\nAAA\n-----END CERTIFICATE-----\n-----BEGIN CERTIFICATE-----\nBBB\n-----END CERTIFICATE-----\n";
        let (leaf, rest) = split_leaf_and_chain(chain).unwrap();
        assert!(leaf.contains("AAA"));
        assert!(rest.contains("BBB"));
        assert!(!rest.contains("AAA"));
    }
}
