use async_trait::async_trait;
use dns_update::{DnsUpdater, TsigAlgorithm};

use crate::error::ChallengeProvisionError;

use super::DnsProvider;

/// RFC 2136 dynamic DNS update with TSIG authentication, for self-hosted
/// authoritative nameservers (BIND, PowerDNS, Knot) that don't have their
/// own hosted API.
pub struct Rfc2136DnsProvider {
    client: DnsUpdater,
}

impl Rfc2136DnsProvider {
    pub fn new(addr: dns_update::providers::rfc2136::DnsAddress, key_name: &str, key: Vec<u8>, algorithm: TsigAlgorithm) -> Result<Self, ChallengeProvisionError> {
        let client = DnsUpdater::new_rfc2136_tsig(addr, key_name, key, algorithm).map_err(|e| provider_error(e.to_string()))?;
        Ok(Self { client })
    }
}

fn provider_error(detail: String) -> ChallengeProvisionError {
    ChallengeProvisionError::DnsProviderRejected {
        provider: "rfc2136".to_string(),
        detail,
    }
}

#[async_trait]
impl DnsProvider for Rfc2136DnsProvider {
    async fn add_txt(&self, zone: &str, rrname: &str, value: &str, ttl: u32) -> Result<(), ChallengeProvisionError> {
        self.client
            .create(rrname.to_string(), dns_update::DnsRecord::TXT { content: value.to_string() }, ttl, zone.to_string())
            .await
            .map_err(|e| provider_error(e.to_string()))
    }

    async fn remove_txt(&self, zone: &str, rrname: &str, _value: &str) -> Result<(), ChallengeProvisionError> {
        self.client
            .delete(rrname.to_string(), zone.to_string())
            .await
            .map_err(|e| provider_error(e.to_string()))
    }
}
