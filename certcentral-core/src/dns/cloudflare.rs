use async_trait::async_trait;
use dns_update::DnsUpdater;

use crate::error::ChallengeProvisionError;

use super::DnsProvider;

/// Cloudflare DNS provider, driving DNS record changes through
/// Cloudflare's API via the `dns-update` crate.
pub struct CloudflareDnsProvider {
    client: DnsUpdater,
}

impl CloudflareDnsProvider {
    pub fn new(api_key: &str, email: Option<&str>) -> Result<Self, ChallengeProvisionError> {
        let client = DnsUpdater::new_cloudflare(api_key, email, None).map_err(|e| provider_error(e.to_string()))?;
        Ok(Self { client })
    }
}

fn provider_error(detail: String) -> ChallengeProvisionError {
    ChallengeProvisionError::DnsProviderRejected {
        provider: "cloudflare".to_string(),
        detail,
    }
}

#[async_trait]
impl DnsProvider for CloudflareDnsProvider {
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
