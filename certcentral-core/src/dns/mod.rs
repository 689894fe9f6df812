//! Pluggable DNS-01 provider drivers.
//!
//! Drivers are selected by configuration, not runtime reflection: each one
//! is a small, self-contained implementation of the [`DnsProvider`]
//! capability set. This generalizes ferron's two-method
//! `ferron_common::dns::DnsProvider` trait by adding a third operation,
//! `list_ns`, which lets the dns-01 fulfiller poll authoritative
//! nameservers directly instead of sleeping a fixed interval.

pub mod cloudflare;
pub mod desec;
pub mod porkbun;
pub mod rfc2136;
pub mod route53;

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;

use crate::error::ChallengeProvisionError;

/// A DNS-01 provider: placing, removing, and discovering authority for TXT
/// records used to prove control of a zone.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Creates or updates a TXT record `rrname.zone` with `value`, TTL
    /// `ttl` seconds. `zone` is the registrable domain the record lives
    /// under; `rrname` is the full owner name (e.g.
    /// `_acme-challenge.www`).
    async fn add_txt(&self, zone: &str, rrname: &str, value: &str, ttl: u32) -> Result<(), ChallengeProvisionError>;

    /// Removes a previously added TXT record. Best-effort: callers treat
    /// failure as loggable, not fatal (the fulfiller
    /// contract).
    async fn remove_txt(&self, zone: &str, rrname: &str, value: &str) -> Result<(), ChallengeProvisionError>;

    /// Lists the authoritative nameservers for `zone`, used by the dns-01
    /// fulfiller to poll each one directly for propagation rather than
    /// guessing a fixed sleep.
    async fn list_ns(&self, zone: &str) -> Result<Vec<String>, ChallengeProvisionError> {
        default_list_ns(zone).await
    }
}

async fn default_list_ns(zone: &str) -> Result<Vec<String>, ChallengeProvisionError> {
    let resolver = hickory_resolver::Resolver::builder_tokio()
        .unwrap_or_else(|_| hickory_resolver::Resolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default()))
        .build();
    let lookup = resolver.ns_lookup(format!("{zone}.")).await.map_err(|e| ChallengeProvisionError::DnsProviderRejected {
        provider: "ns-lookup".to_string(),
        detail: e.to_string(),
    })?;
    Ok(lookup.iter().map(|ns| ns.to_string()).collect())
}

/// Splits `name` into (subdomain, registrable domain) by walking up the
/// label chain and asking for an SOA record at each level, stopping at the
/// first zone apex found. Ported from
/// `ferron_common::dns::separate_subdomain_from_domain_name`.
pub async fn separate_subdomain_from_domain_name(name: &str) -> (String, String) {
    let parts: Vec<&str> = name.strip_suffix('.').unwrap_or(name).split('.').collect();
    let resolver = hickory_resolver::Resolver::builder_tokio()
        .unwrap_or_else(|_| hickory_resolver::Resolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default()))
        .build();

    for idx in 0..parts.len() {
        if resolver.soa_lookup(format!("{}.", parts[idx..].join("."))).await.is_ok() {
            let subdomain = parts[..idx].join(".");
            let domain = parts[idx..].join(".");
            return (subdomain, domain);
        }
    }
    (String::new(), parts.join("."))
}

/// Builds the `_acme-challenge[.subdomain]` owner name for `identifier`
/// within `domain_name`.
pub fn acme_challenge_owner(subdomain: &str, domain_name: &str) -> String {
    if subdomain.is_empty() {
        format!("_acme-challenge.{domain_name}")
    } else {
        format!("_acme-challenge.{subdomain}.{domain_name}")
    }
}

use std::sync::Arc;

use crate::config::{DnsDriverKind, DnsProviderConfig};
use crate::error::ConfigError;

/// Builds a [`DnsProvider`] trait object from its configuration, dispatched
/// on `driver`. Each arm validates the credential subset it needs and
/// reports `ConfigError` (not a runtime error) for anything missing, since
/// driver construction only ever happens at config-load time.
pub fn build_provider(provider_id: &str, config: &DnsProviderConfig) -> Result<Arc<dyn DnsProvider>, ConfigError> {
    let creds = &config.credentials;
    let missing = |field: &str| ConfigError::UnknownDnsProvider {
        name: provider_id.to_string(),
        provider: format!("missing required credential field {field:?} for driver {:?}", config.driver),
    };

    match config.driver {
        DnsDriverKind::Cloudflare => {
            let api_key = creds.api_key.as_deref().ok_or_else(|| missing("api_key"))?;
            Ok(Arc::new(
                cloudflare::CloudflareDnsProvider::new(api_key, creds.email.as_deref())
                    .map_err(|e| ConfigError::UnknownDnsProvider { name: provider_id.to_string(), provider: e.to_string() })?,
            ))
        }
        DnsDriverKind::Rfc2136 => {
            let key_name = creds.tsig_key_name.as_deref().ok_or_else(|| missing("tsig_key_name"))?;
            let key_secret = creds.tsig_key_secret.as_deref().ok_or_else(|| missing("tsig_key_secret"))?;
            let addr = creds.server_addr.as_deref().ok_or_else(|| missing("server_addr"))?;
            let algorithm = match creds.tsig_algorithm.as_deref().unwrap_or("hmac-sha256") {
                "hmac-sha256" => dns_update::TsigAlgorithm::HmacSha256,
                "hmac-sha512" => dns_update::TsigAlgorithm::HmacSha512,
                other => return Err(ConfigError::UnknownDnsProvider { name: provider_id.to_string(), provider: format!("unsupported tsig_algorithm {other:?}") }),
            };
            let dns_address = dns_update::providers::rfc2136::DnsAddress::from(
                addr.parse::<std::net::SocketAddr>().map_err(|_| missing("server_addr (host:port)"))?,
            );
            let key_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, key_secret)
                .map_err(|_| missing("tsig_key_secret (base64)"))?;
            Ok(Arc::new(
                rfc2136::Rfc2136DnsProvider::new(dns_address, key_name, key_bytes, algorithm)
                    .map_err(|e| ConfigError::UnknownDnsProvider { name: provider_id.to_string(), provider: e.to_string() })?,
            ))
        }
        DnsDriverKind::Desec => {
            let token = creds.api_token.as_deref().ok_or_else(|| missing("api_token"))?;
            Ok(Arc::new(
                desec::DesecDnsProvider::new(token).map_err(|e| ConfigError::UnknownDnsProvider { name: provider_id.to_string(), provider: e.to_string() })?,
            ))
        }
        DnsDriverKind::Porkbun => {
            let api_key = creds.api_key.as_deref().ok_or_else(|| missing("api_key"))?;
            let secret = creds.api_secret.as_deref().ok_or_else(|| missing("api_secret"))?;
            Ok(Arc::new(porkbun::PorkbunDnsProvider::new(api_key, secret)))
        }
        DnsDriverKind::Route53 => Ok(Arc::new(
            route53::Route53DnsProvider::new(
                creds.region.as_deref(),
                creds.profile_name.as_deref(),
                creds.access_key_id.as_deref(),
                creds.secret_access_key.as_deref(),
                creds.hosted_zone_id.as_deref(),
            )
            .map_err(|e| ConfigError::UnknownDnsProvider { name: provider_id.to_string(), provider: e.to_string() })?,
        )),
    }
}
