//! dns-01 challenge fulfiller.
//!
//! Selects a provider by longest-suffix match of the identifier against
//! configured zones, places the TXT record, then polls the zone's
//! authoritative nameservers directly until all of them return the value
//! or a deadline elapses — replacing ferron's fixed 60s
//! sleep with a real propagation check.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::config::best_zone_match;
use crate::dns::{acme_challenge_owner, separate_subdomain_from_domain_name, DnsProvider};
use crate::error::ChallengeProvisionError;

use super::PendingChallenge;

const TXT_TTL_SECS: u32 = 120;
const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct Dns01Fulfiller {
    /// provider id -> (provider, configured zones)
    providers: HashMap<String, (Arc<dyn DnsProvider>, Vec<String>)>,
    /// How long [`super::ChallengeFulfiller::provision`] waits for
    /// propagation before giving up; the unified fulfiller interface has
    /// no per-call deadline parameter, so this is fixed at construction.
    pub(super) propagation_timeout: Duration,
}

const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(300);

impl Dns01Fulfiller {
    pub fn new(providers: HashMap<String, (Arc<dyn DnsProvider>, Vec<String>)>) -> Self {
        Self { providers, propagation_timeout: DEFAULT_PROPAGATION_TIMEOUT }
    }

    pub fn with_propagation_timeout(providers: HashMap<String, (Arc<dyn DnsProvider>, Vec<String>)>, propagation_timeout: Duration) -> Self {
        Self { providers, propagation_timeout }
    }

    /// Computes `_acme-challenge.<name>` TXT value =
    /// base64url(sha256(key-authorization)), matching RFC 8555 §8.4's
    /// `dns-01` value derivation.
    pub fn txt_value(key_authorization: &str) -> String {
        let digest = Sha256::digest(key_authorization.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    }

    fn select_provider(&self, identifier: &str) -> Result<(&str, &Arc<dyn DnsProvider>, &str), ChallengeProvisionError> {
        let mut best: Option<(&str, &str)> = None;
        for (id, (_, zones)) in &self.providers {
            if let Some(zone) = best_zone_match(identifier, zones) {
                if best.map(|(_, b)| zone.len() > b.len()).unwrap_or(true) {
                    best = Some((id, zone));
                }
            }
        }
        let (id, zone) = best.ok_or_else(|| ChallengeProvisionError::NoMatchingDnsProvider {
            identifier: identifier.to_string(),
        })?;
        Ok((id, &self.providers[id].0, zone))
    }

    /// Places the TXT record for `challenge.identifier` and waits for it to
    /// propagate to every authoritative nameserver of the matched zone, or
    /// until `deadline`.
    pub async fn provision(&self, challenge: &PendingChallenge, deadline: Instant) -> Result<(), ChallengeProvisionError> {
        let (provider_id, provider, zone) = self.select_provider(&challenge.identifier)?;
        let zone = zone.to_string();
        let (subdomain, domain_name) = separate_subdomain_from_domain_name(&challenge.identifier).await;
        debug_assert_eq!(domain_name, zone, "zone match and SOA-derived domain should agree");
        let rrname = acme_challenge_owner(&subdomain, &domain_name);
        let value = Self::txt_value(&challenge.key_authorization);

        provider.add_txt(&zone, &rrname, &value, TXT_TTL_SECS).await.map_err(|e| ChallengeProvisionError::DnsProviderRejected {
            provider: provider_id.to_string(),
            detail: e.to_string(),
        })?;

        wait_for_propagation(provider.as_ref(), &zone, &rrname, &value, deadline).await
    }

    /// Removes the TXT record. Best-effort per the fulfiller contract.
    pub async fn cleanup(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError> {
        let (_, provider, zone) = self.select_provider(&challenge.identifier)?;
        let zone = zone.to_string();
        let (subdomain, domain_name) = separate_subdomain_from_domain_name(&challenge.identifier).await;
        let rrname = acme_challenge_owner(&subdomain, &domain_name);
        let value = Self::txt_value(&challenge.key_authorization);
        provider.remove_txt(&zone, &rrname, &value).await
    }
}

/// Polls every authoritative nameserver of `zone` directly (bypassing the
/// recursive resolver's cache) until all of them answer `rrname` with
/// `expected_value`, or `deadline` is reached.
async fn wait_for_propagation(
    provider: &dyn DnsProvider,
    zone: &str,
    rrname: &str,
    expected_value: &str,
    deadline: Instant,
) -> Result<(), ChallengeProvisionError> {
    let nameservers = provider.list_ns(zone).await?;
    if nameservers.is_empty() {
        return Err(ChallengeProvisionError::DnsProviderRejected {
            provider: "dns01".to_string(),
            detail: format!("no authoritative nameservers found for zone {zone}"),
        });
    }

    loop {
        let mut all_propagated = true;
        for ns in &nameservers {
            if !ns_has_txt_value(ns, rrname, expected_value).await {
                all_propagated = false;
                break;
            }
        }
        if all_propagated {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ChallengeProvisionError::DnsPropagationTimeout {
                rrname: rrname.to_string(),
                nameservers: nameservers.clone(),
            });
        }
        tokio::time::sleep_until((Instant::now() + POLL_INTERVAL).min(deadline)).await;
    }
}

/// Resolves `nameserver` to a socket address to query over UDP. A bare
/// hostname or IP resolves against port 53, the standard DNS port; a
/// `host:port` form (as returned by a test double standing in for a real
/// authoritative server) is honored as-is.
async fn resolve_nameserver_addr(nameserver: &str) -> Option<std::net::SocketAddr> {
    if let Ok(addr) = nameserver.parse::<std::net::SocketAddr>() {
        return Some(addr);
    }
    tokio::net::lookup_host((nameserver.trim_end_matches('.'), 53)).await.ok()?.next()
}

async fn ns_has_txt_value(nameserver: &str, rrname: &str, expected_value: &str) -> bool {
    let Some(socket_addr) = resolve_nameserver_addr(nameserver).await else {
        return false;
    };

    let mut config = ResolverConfig::new();
    config.add_name_server(NameServerConfig::new(socket_addr, Protocol::Udp));
    let resolver = hickory_resolver::Resolver::builder_with_config(config, TokioConnectionProvider::default()).build();

    let Ok(lookup) = resolver.txt_lookup(format!("{rrname}.")).await else {
        return false;
    };
    lookup.iter().any(|txt| txt.to_string() == expected_value)
}
